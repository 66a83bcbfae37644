//! Structured observability hooks for a corekeeper invocation.
//!
//! This module provides:
//! - An invocation-scoped tracing span via [`invocation_span`]
//! - Emission functions for each step: capture, retention, notification
//!
//! Events carry an `event = "..."` field so log pipelines can filter on them.

use std::path::Path;

use tracing::{error, info, warn, Span};

use crate::error::{os_errno, CaptureError, NotifyError, RetentionError};
use crate::retention::RetentionReport;
use crate::writer::CapturedDump;

/// Span tagged with the crashing executable. Attach it to the invocation
/// future with `tracing::Instrument` so it stays correct across awaits.
pub fn invocation_span(executable: &str) -> Span {
    tracing::info_span!("corekeeper", executable = %executable)
}

/// Emit event: dump captured and published.
pub fn emit_dump_written(dump: &CapturedDump) {
    info!(
        event = "dump.written",
        path = %dump.path.display(),
        bytes = dump.bytes,
    );
}

/// Emit event: the write path failed; the invocation stops here.
pub fn emit_dump_failed(err: &CaptureError) {
    let errno = err.io_error().and_then(os_errno);
    match err.partial_path() {
        Some(partial) => error!(
            event = "dump.failed",
            errno = ?errno,
            partial = %partial.display(),
            error = %err,
        ),
        None => error!(event = "dump.failed", errno = ?errno, error = %err),
    }
}

/// Emit events: summary of a retention pass plus one warning per failed
/// deletion.
pub fn emit_retention_pass(dir: &Path, report: &RetentionReport) {
    for failure in &report.failures {
        warn!(
            event = "retention.delete_failed",
            name = %failure.name,
            errno = ?os_errno(&failure.source),
            error = %failure.source,
        );
    }

    info!(
        event = "retention.pass",
        dir = %dir.display(),
        matched = report.matched,
        deleted = report.deleted_count(),
        vanished = report.vanished.len(),
        failed = report.failures.len(),
        deferred = report.deferred,
    );
}

/// Emit event: the retention pass could not enumerate the directory.
pub fn emit_retention_failed(err: &RetentionError) {
    error!(
        event = "retention.failed",
        errno = ?os_errno(err.io_error()),
        error = %err,
    );
}

/// Emit event: notification transport failed (never fatal).
pub fn emit_notify_failed(err: &NotifyError) {
    error!(event = "notify.failed", error = %err);
}

/// Emit event: invocation done.
pub fn emit_invocation_finished(dump: &CapturedDump, deleted: usize) {
    info!(
        event = "invocation.finished",
        deleted = deleted,
        "wrote core {}. Deleted {} extra core{}",
        dump.path.display(),
        deleted,
        if deleted == 1 { "" } else { "s" },
    );
}
