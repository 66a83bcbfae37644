//! corekeeper - userspace core-file handler for Linux
//!
//! Installed as the kernel's core pattern pipe; the core image arrives on
//! standard input:
//!
//! ```text
//! echo "|/usr/sbin/corekeeper -e %e -d /var/core -m 10 \
//!     -s '/usr/sbin/sendmail -t sysadmin@example.com'" > /proc/sys/kernel/core_pattern
//! ```
//!
//! Standard output is never written. Diagnostics go to syslog.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::Level;

use corekeeper_core::{
    exit_code_for, init_tracing, CrashHandler, HandlerConfig, InvocationOutcome, RetentionPolicy,
    SystemClock, DEFAULT_CORE_DIR,
};

const AFTER_HELP: &str = "\
Example:
  echo \"|/usr/sbin/corekeeper -e %e -d /var/core -m 10 \\
      -s '/usr/sbin/sendmail -t sysadmin@example.com'\" > /proc/sys/kernel/core_pattern";

#[derive(Parser, Debug)]
#[command(name = "corekeeper")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Userspace core-file handler for Linux", long_about = None)]
#[command(after_help = AFTER_HELP)]
struct Cli {
    /// Directory to write core files into
    #[arg(short = 'd', long, env = "COREKEEPER_DIR", default_value = DEFAULT_CORE_DIR)]
    core_dir: PathBuf,

    /// Name of the executable that is core dumping
    #[arg(short = 'e', long)]
    executable: String,

    /// Maximum number of core files to allow before deleting older core files
    #[arg(
        short = 'm',
        long,
        env = "COREKEEPER_MAX_CORES",
        default_value_t = 10,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    max_cores: u32,

    /// Send an alert by piping a mail message into this shell command
    /// (e.g. '/usr/sbin/sendmail -t sysadmin@example.com')
    #[arg(short = 's', long)]
    notify_command: Option<String>,

    /// Maximum core files examined per retention pass
    #[arg(
        long,
        env = "COREKEEPER_SCAN_LIMIT",
        default_value_t = 4096,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    scan_limit: u32,

    /// Seconds to wait for the notify command before killing it
    #[arg(long, default_value_t = 60)]
    notify_timeout: u64,

    /// Fail the capture if the core stream stalls for this many seconds
    /// (default: wait for the kernel to close the stream)
    #[arg(long)]
    stdin_timeout: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Also copy log lines to stderr
    #[arg(long)]
    log_stderr: bool,
}

impl Cli {
    fn handler_config(&self) -> Result<HandlerConfig> {
        let retention = RetentionPolicy::new(self.max_cores as usize)?
            .with_scan_limit(self.scan_limit as usize)?;
        let config = HandlerConfig::new(&self.core_dir, &self.executable, retention)?
            .with_notify_command(self.notify_command.clone())
            .with_notify_timeout(Duration::from_secs(self.notify_timeout))
            .with_stdin_timeout(self.stdin_timeout.map(Duration::from_secs));
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Parse and validate before touching the log or the filesystem.
    let cli = Cli::parse();
    let config = match cli.handler_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("corekeeper: {err:#}. Try -h for help.");
            return ExitCode::from(1);
        }
    };

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level, cli.log_stderr);

    match run(config).await {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(err) => ExitCode::from(exit_code(&err)),
    }
}

async fn run(config: HandlerConfig) -> Result<InvocationOutcome> {
    let handler = CrashHandler::new(config, SystemClock);
    let outcome = handler
        .run(tokio::io::stdin())
        .await
        .with_context(|| format!("failed to capture core into {}", handler.config().core_dir.display()))?;
    Ok(outcome)
}

/// Exit status for a fatal error: the errno of the first OS error in the
/// chain, else 1.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<std::io::Error>())
        .map(exit_code_for)
        .unwrap_or(1)
}
