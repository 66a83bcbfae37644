//! One crash, end to end: capture, retain, notify.
//!
//! A failed capture ends the invocation. Retention and notification failures
//! are logged and recorded in the outcome, and never stop each other.

use tokio::io::AsyncRead;
use tracing::Instrument;

use crate::clock::Clock;
use crate::config::HandlerConfig;
use crate::error::{exit_code_for, CaptureError, NotifyError, RetentionError};
use crate::notify::{dispatch, CommandNotifier, CrashAlert, Notifier};
use crate::obs;
use crate::retention::fs::FsCoreDir;
use crate::retention::{enforce, RetentionReport};
use crate::writer::{CapturedDump, DumpWriter};

/// What happened after the dump was captured.
#[derive(Debug)]
pub struct InvocationOutcome {
    pub dump: CapturedDump,
    pub retention: Result<RetentionReport, RetentionError>,
    pub notify: Result<(), NotifyError>,
}

impl InvocationOutcome {
    pub fn deleted_count(&self) -> usize {
        self.retention
            .as_ref()
            .map(RetentionReport::deleted_count)
            .unwrap_or(0)
    }

    /// `0` unless the retention pass could not enumerate the directory.
    /// Deletion and notification failures leave the status untouched.
    pub fn exit_code(&self) -> u8 {
        match &self.retention {
            Ok(_) => 0,
            Err(err) => exit_code_for(err.io_error()),
        }
    }
}

/// Runs invocations against one core directory.
pub struct CrashHandler<C> {
    config: HandlerConfig,
    writer: DumpWriter<C>,
    store: FsCoreDir,
    notifier: Option<Box<dyn Notifier>>,
}

impl<C: Clock> CrashHandler<C> {
    pub fn new(config: HandlerConfig, clock: C) -> Self {
        let writer = DumpWriter::new(&config.core_dir, clock).with_read_timeout(config.stdin_timeout);
        let store = FsCoreDir::new(&config.core_dir);
        let notifier = config.notify_command.as_ref().map(|command| {
            Box::new(CommandNotifier::new(command.clone()).with_timeout(config.notify_timeout))
                as Box<dyn Notifier>
        });
        Self {
            config,
            writer,
            store,
            notifier,
        }
    }

    /// Replace the transport built from the configuration.
    pub fn with_notifier(mut self, notifier: Option<Box<dyn Notifier>>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Handle one crash whose core image is read from `input`.
    pub async fn run<R>(&self, input: R) -> Result<InvocationOutcome, CaptureError>
    where
        R: AsyncRead + Unpin,
    {
        self.run_steps(input)
            .instrument(obs::invocation_span(&self.config.executable))
            .await
    }

    async fn run_steps<R>(&self, input: R) -> Result<InvocationOutcome, CaptureError>
    where
        R: AsyncRead + Unpin,
    {
        let dump = match self.writer.capture(&self.config.executable, input).await {
            Ok(dump) => dump,
            Err(err) => {
                obs::emit_dump_failed(&err);
                return Err(err);
            }
        };
        obs::emit_dump_written(&dump);

        let retention = enforce(&self.store, &self.config.retention);
        match &retention {
            Ok(report) => obs::emit_retention_pass(&self.config.core_dir, report),
            Err(err) => obs::emit_retention_failed(err),
        }

        let notify = self.notify(&dump).await;
        if let Err(err) = &notify {
            obs::emit_notify_failed(err);
        }

        let outcome = InvocationOutcome {
            dump,
            retention,
            notify,
        };
        obs::emit_invocation_finished(&outcome.dump, outcome.deleted_count());
        Ok(outcome)
    }

    /// Host names are only resolved when there is a transport to tell.
    async fn notify(&self, dump: &CapturedDump) -> Result<(), NotifyError> {
        let Some(notifier) = self.notifier.as_deref() else {
            return Ok(());
        };
        let alert = CrashAlert::new(
            &self.config.executable,
            &self.config.core_dir,
            dump.name.as_str(),
        );
        dispatch(&alert, Some(notifier)).await
    }
}
