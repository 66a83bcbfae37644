//! Error taxonomy for corekeeper.
//!
//! Only configuration errors and [`CaptureError`] stop an invocation.
//! [`RetentionError`] and [`NotifyError`] are logged and the invocation keeps
//! going.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Invalid configuration, detected before any side effect.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid max core count {0}: give a number greater than 0")]
    InvalidMaxCount(usize),

    #[error("invalid scan limit {0}: give a number greater than 0")]
    InvalidScanLimit(usize),

    #[error("executable name must not be empty")]
    EmptyExecutable,
}

/// Failure on the write path. The staging file, if any, is left on disk.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("unable to create staging file in {dir}: {source}")]
    CreateStaging {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error reading core image from input (partial dump kept at {partial}): {source}")]
    Read {
        partial: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error writing core image to {partial}: {source}")]
    Write {
        partial: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to publish {partial} as {target}: {source}")]
    Publish {
        partial: PathBuf,
        target: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no free core name after {attempts} attempts (partial dump kept at {partial})")]
    NameExhausted { partial: PathBuf, attempts: u32 },
}

impl CaptureError {
    /// Underlying OS error, when the failure came from one.
    pub fn io_error(&self) -> Option<&io::Error> {
        match self {
            Self::CreateStaging { source, .. }
            | Self::Read { source, .. }
            | Self::Write { source, .. }
            | Self::Publish { source, .. } => Some(source),
            Self::NameExhausted { .. } => None,
        }
    }

    /// Path of the partial dump left behind, if one exists.
    pub fn partial_path(&self) -> Option<&PathBuf> {
        match self {
            Self::CreateStaging { .. } => None,
            Self::Read { partial, .. }
            | Self::Write { partial, .. }
            | Self::Publish { partial, .. }
            | Self::NameExhausted { partial, .. } => Some(partial),
        }
    }
}

/// Fatal failure of a retention pass.
#[derive(Debug, thiserror::Error)]
pub enum RetentionError {
    #[error("unable to enumerate core directory {dir}: {source}")]
    Enumerate {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RetentionError {
    pub fn io_error(&self) -> &io::Error {
        match self {
            Self::Enumerate { source, .. } => source,
        }
    }
}

/// Failure of the notification transport. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("unable to run notify command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("unable to pass message to notify command: {0}")]
    Pipe(#[source] io::Error),

    #[error("error waiting for notify command: {0}")]
    Wait(#[source] io::Error),

    #[error("notify command exited with {0}")]
    Exit(ExitStatus),

    #[error("notify command did not finish within {secs}s")]
    TimedOut { secs: u64 },
}

/// The errno behind `err`, looking through custom payloads that wrap
/// another `io::Error`.
pub fn os_errno(err: &io::Error) -> Option<i32> {
    if let Some(code) = err.raw_os_error() {
        return Some(code);
    }
    let mut cause = err
        .get_ref()
        .map(|inner| inner as &(dyn std::error::Error + 'static));
    while let Some(current) = cause {
        if let Some(code) = current.downcast_ref::<io::Error>().and_then(os_errno) {
            return Some(code);
        }
        cause = current.source();
    }
    None
}

/// Process exit code for an OS error: its errno when in `1..=255`, else `1`.
pub fn exit_code_for(err: &io::Error) -> u8 {
    os_errno(err)
        .and_then(|code| u8::try_from(code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}
