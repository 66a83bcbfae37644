//! Validated settings for one invocation.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::notify::DEFAULT_NOTIFY_TIMEOUT;
use crate::retention::RetentionPolicy;

/// Directory used when none is given.
pub const DEFAULT_CORE_DIR: &str = "/var/core";

/// Everything an invocation needs, checked before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    pub core_dir: PathBuf,
    pub executable: String,
    pub retention: RetentionPolicy,
    /// Shell command that receives the alert on stdin.
    pub notify_command: Option<String>,
    pub notify_timeout: Duration,
    /// Idle deadline for each read from the core stream. `None` blocks
    /// until the producer closes the stream.
    pub stdin_timeout: Option<Duration>,
}

impl HandlerConfig {
    pub fn new(
        core_dir: impl Into<PathBuf>,
        executable: impl Into<String>,
        retention: RetentionPolicy,
    ) -> Result<Self, ConfigError> {
        let executable = executable.into();
        if executable.is_empty() {
            return Err(ConfigError::EmptyExecutable);
        }
        Ok(Self {
            core_dir: core_dir.into(),
            executable,
            retention,
            notify_command: None,
            notify_timeout: DEFAULT_NOTIFY_TIMEOUT,
            stdin_timeout: None,
        })
    }

    pub fn with_notify_command(mut self, command: Option<String>) -> Self {
        // An empty command line means no transport.
        self.notify_command = command.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub fn with_stdin_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stdin_timeout = timeout;
        self
    }
}
