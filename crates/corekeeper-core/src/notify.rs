//! Best-effort crash notification.
//!
//! The transport is a shell command line (typically
//! `sendmail -t ops@example.com`) that receives a mail-formatted message on
//! standard input. Failures are reported to the caller and never abort the
//! capture or retention steps.

use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::NotifyError;

/// Host name used when the local one cannot be determined.
pub const UNKNOWN_HOST: &str = "(unknown-host)";

/// Default deadline for the transport command.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(60);

/// What the operator is told about a crash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashAlert {
    pub executable: String,
    pub core_dir: PathBuf,
    pub core_name: String,
    /// Short host name, used in the subject.
    pub host: String,
    /// Canonical DNS name, used in the banner. Falls back to `host`.
    pub fqdn: String,
}

impl CrashAlert {
    /// Alert for a dump on this host. Resolves the canonical host name,
    /// which may block on the resolver.
    pub fn new(executable: &str, core_dir: &Path, core_name: &str) -> Self {
        let host = local_host_name();
        let fqdn = canonical_name(&host).unwrap_or_else(|| host.clone());
        Self {
            executable: executable.to_string(),
            core_dir: core_dir.to_path_buf(),
            core_name: core_name.to_string(),
            host,
            fqdn,
        }
    }

    /// Override both host names.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self.fqdn = self.host.clone();
        self
    }

    pub fn with_fqdn(mut self, fqdn: impl Into<String>) -> Self {
        self.fqdn = fqdn.into();
        self
    }

    pub fn subject(&self) -> String {
        format!("[core_dump] {} crashed on {}", self.executable, self.host)
    }

    /// Full message, headers included, with CRLF line endings.
    pub fn render(&self) -> String {
        format!(
            "Subject: {}\r\n\r\n\
             !!!!! Crash encountered on {} !!!!!!!!!\r\n\
             executable name: {}\r\n\
             core file name: {}\r\n",
            self.subject(),
            self.fqdn,
            self.executable,
            self.core_dir.join(&self.core_name).display(),
        )
    }
}

fn local_host_name() -> String {
    match hostname::get() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(err) => {
            tracing::error!(error = %err, "unable to read host name");
            UNKNOWN_HOST.to_string()
        }
    }
}

/// Canonical name of `host` as the resolver reports it (`AI_CANONNAME`).
fn canonical_name(host: &str) -> Option<String> {
    let c_host = CString::new(host).ok()?;
    // SAFETY: `hints` is a zeroed plain C struct, `c_host` outlives the call,
    // and `res` is only read when getaddrinfo succeeded and freed exactly once.
    unsafe {
        let mut hints: libc::addrinfo = std::mem::zeroed();
        hints.ai_family = libc::AF_UNSPEC;
        hints.ai_flags = libc::AI_CANONNAME;
        let mut res: *mut libc::addrinfo = std::ptr::null_mut();

        let rc = libc::getaddrinfo(c_host.as_ptr(), std::ptr::null(), &hints, &mut res);
        if rc != 0 {
            let reason = CStr::from_ptr(libc::gai_strerror(rc)).to_string_lossy();
            tracing::error!(host, code = rc, error = %reason, "unable to resolve host name");
            return None;
        }
        if res.is_null() {
            return None;
        }

        let canon = (*res).ai_canonname;
        let name = if canon.is_null() {
            None
        } else {
            Some(CStr::from_ptr(canon).to_string_lossy().into_owned())
        };
        libc::freeaddrinfo(res);
        name.filter(|n| !n.is_empty())
    }
}

/// Delivers a [`CrashAlert`].
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &CrashAlert) -> Result<(), NotifyError>;
}

/// Pipes the rendered alert into `/bin/sh -c <command>`.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: String,
    timeout: Duration,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: DEFAULT_NOTIFY_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl Notifier for CommandNotifier {
    async fn notify(&self, alert: &CrashAlert) -> Result<(), NotifyError> {
        let mut child = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| NotifyError::Spawn {
                command: self.command.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(alert.render().as_bytes())
                .await
                .map_err(NotifyError::Pipe)?;
            stdin.shutdown().await.map_err(NotifyError::Pipe)?;
        }

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .map_err(|_| NotifyError::TimedOut {
                secs: self.timeout.as_secs(),
            })?
            .map_err(NotifyError::Wait)?;

        if status.success() {
            Ok(())
        } else {
            Err(NotifyError::Exit(status))
        }
    }
}

/// Send `alert` through `notifier`. No notifier configured is a success.
pub async fn dispatch(
    alert: &CrashAlert,
    notifier: Option<&dyn Notifier>,
) -> Result<(), NotifyError> {
    match notifier {
        Some(notifier) => notifier.notify(alert).await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> CrashAlert {
        CrashAlert::new("nginx", Path::new("/var/core"), "core.2026-10-18_1792281600.000000005.nginx")
            .with_host("web-01")
    }

    #[test]
    fn banner_uses_canonical_name() {
        let rendered = alert().with_fqdn("web-01.example.com").render();
        assert!(rendered.starts_with("Subject: [core_dump] nginx crashed on web-01\r\n"));
        assert!(rendered.contains("!!!!! Crash encountered on web-01.example.com !!!!!!!!!\r\n"));
    }

    #[test]
    fn unresolvable_name_gives_none() {
        assert_eq!(canonical_name("no-such-host.invalid"), None);
        assert_eq!(canonical_name("bad\0name"), None);
    }

    #[test]
    fn render_matches_mail_layout() {
        assert_eq!(
            alert().render(),
            "Subject: [core_dump] nginx crashed on web-01\r\n\r\n\
             !!!!! Crash encountered on web-01 !!!!!!!!!\r\n\
             executable name: nginx\r\n\
             core file name: /var/core/core.2026-10-18_1792281600.000000005.nginx\r\n"
        );
    }

    #[test]
    fn new_alert_has_a_host() {
        let alert = CrashAlert::new("x", Path::new("/tmp"), "core.1");
        assert!(!alert.host.is_empty());
        assert!(!alert.fqdn.is_empty());
    }

    #[tokio::test]
    async fn no_transport_is_success() {
        assert!(dispatch(&alert(), None).await.is_ok());
    }

    #[tokio::test]
    async fn command_receives_message() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mail.txt");
        let notifier = CommandNotifier::new(format!("cat > '{}'", out.display()));

        dispatch(&alert(), Some(&notifier)).await.unwrap();

        let delivered = std::fs::read_to_string(out).unwrap();
        assert_eq!(delivered, alert().render());
    }

    #[tokio::test]
    async fn failing_command_is_reported() {
        let notifier = CommandNotifier::new("cat > /dev/null; exit 3");

        let err = notifier.notify(&alert()).await.unwrap_err();

        match err {
            NotifyError::Exit(status) => assert_eq!(status.code(), Some(3)),
            other => panic!("expected exit error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_command_times_out() {
        let notifier =
            CommandNotifier::new("cat > /dev/null; sleep 30").with_timeout(Duration::from_millis(200));

        let err = notifier.notify(&alert()).await.unwrap_err();

        assert!(matches!(err, NotifyError::TimedOut { .. }));
    }
}
