//! corekeeper core library
//!
//! Userspace handling for the kernel's `core_pattern` pipe: stream the core
//! image into a uniquely named file, keep the core directory within a
//! count-based retention policy, and optionally alert an operator.

pub mod clock;
pub mod config;
pub mod error;
pub mod handler;
pub mod naming;
pub mod notify;
pub mod obs;
pub mod retention;
pub mod telemetry;
pub mod writer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{HandlerConfig, DEFAULT_CORE_DIR};
pub use error::{
    exit_code_for, os_errno, CaptureError, ConfigError, NotifyError, RetentionError,
};
pub use handler::{CrashHandler, InvocationOutcome};
pub use naming::{is_core_name, CoreName, OrderKey, CORE_PREFIX, PARTIAL_PREFIX};
pub use notify::{dispatch, CommandNotifier, CrashAlert, Notifier, DEFAULT_NOTIFY_TIMEOUT};
pub use obs::{
    emit_dump_failed, emit_dump_written, emit_invocation_finished, emit_notify_failed,
    emit_retention_failed, emit_retention_pass, invocation_span,
};
pub use retention::fs::FsCoreDir;
pub use retention::{
    enforce, CoreDir, DeletionFailure, RetentionPolicy, RetentionReport, DEFAULT_MAX_CORES,
    DEFAULT_SCAN_LIMIT,
};
pub use telemetry::{init_tracing, LogSink};
pub use writer::{CapturedDump, DumpWriter};

/// corekeeper version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
