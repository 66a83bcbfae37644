//! Centralised tracing initialisation for corekeeper.
//!
//! Diagnostics go to the system log (facility `user`), never to standard
//! output. Each formatted event becomes one syslog message whose severity
//! follows the event's level. When the syslog socket cannot be reached the
//! subscriber falls back to stderr.
//!
//! Safe to call more than once: subsequent calls are silently ignored
//! (the global subscriber can only be set once per process).

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use syslog::{Facility, Formatter3164, Logger, LoggerBackend};
use tracing::{Level, Metadata};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriter, MakeWriterExt};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Process name reported to syslog.
pub const SYSLOG_IDENT: &str = "corekeeper";

/// Where log lines ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    Syslog,
    Stderr,
}

/// Syslog severity for a tracing level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Debug,
}

impl Severity {
    pub fn for_level(level: &Level) -> Self {
        match *level {
            Level::ERROR => Self::Error,
            Level::WARN => Self::Warning,
            Level::INFO => Self::Info,
            // Trace goes to debug as well.
            _ => Self::Debug,
        }
    }
}

/// Receives one complete log line at a time.
pub trait LineSink: Send + 'static {
    fn send(&mut self, severity: Severity, line: &str);
}

impl LineSink for Logger<LoggerBackend, Formatter3164> {
    fn send(&mut self, severity: Severity, line: &str) {
        let sent = match severity {
            Severity::Error => self.err(line),
            Severity::Warning => self.warning(line),
            Severity::Info => self.info(line),
            Severity::Debug => self.debug(line),
        };
        // Nowhere left to report a failing log socket.
        drop(sent);
    }
}

/// `MakeWriter` that turns each formatted event into one syslog message.
pub struct SyslogMakeWriter<S> {
    sink: Arc<Mutex<S>>,
}

impl<S> Clone for SyslogMakeWriter<S> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<S: LineSink> SyslogMakeWriter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }

    fn line(&self, severity: Severity) -> SyslogLine<'_, S> {
        SyslogLine {
            sink: &self.sink,
            severity,
            buf: Vec::new(),
        }
    }
}

impl<'a, S: LineSink> MakeWriter<'a> for SyslogMakeWriter<S> {
    type Writer = SyslogLine<'a, S>;

    fn make_writer(&'a self) -> Self::Writer {
        self.line(Severity::Info)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        self.line(Severity::for_level(meta.level()))
    }
}

/// Buffers one formatted event and hands it to the sink on drop.
pub struct SyslogLine<'a, S: LineSink> {
    sink: &'a Mutex<S>,
    severity: Severity,
    buf: Vec<u8>,
}

impl<S: LineSink> Write for SyslogLine<'_, S> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: LineSink> Drop for SyslogLine<'_, S> {
    fn drop(&mut self) {
        let text = String::from_utf8_lossy(&self.buf);
        let line = text.trim_end();
        if line.is_empty() {
            return;
        }
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        sink.send(self.severity, line);
    }
}

fn connect_syslog() -> Result<Logger<LoggerBackend, Formatter3164>, String> {
    let formatter = Formatter3164 {
        facility: Facility::LOG_USER,
        hostname: None,
        process: SYSLOG_IDENT.to_string(),
        pid: std::process::id(),
    };
    syslog::unix(formatter).map_err(|e| e.to_string())
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit JSON-formatted lines instead of plain text.
/// * `level`: default verbosity when `RUST_LOG` is not set.
/// * `mirror_stderr`: also copy every line to stderr.
///
/// Returns where the lines are going.
pub fn init_tracing(json: bool, level: Level, mirror_stderr: bool) -> LogSink {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let (writer, sink, syslog_error) = match connect_syslog() {
        Ok(logger) => {
            let syslog = SyslogMakeWriter::new(logger);
            let writer = if mirror_stderr {
                BoxMakeWriter::new(syslog.and(io::stderr))
            } else {
                BoxMakeWriter::new(syslog)
            };
            (writer, LogSink::Syslog, None)
        }
        Err(err) => (BoxMakeWriter::new(io::stderr), LogSink::Stderr, Some(err)),
    };

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .without_time()
                    .json()
                    .with_writer(writer),
            )
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .without_time()
                    .with_writer(writer),
            )
            .try_init()
            .ok();
    }

    if let Some(err) = syslog_error {
        tracing::warn!(error = %err, "syslog unavailable, logging to stderr");
    }
    sink
}
