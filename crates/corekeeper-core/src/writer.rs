//! Dump writer: stream a core image into a uniquely named artifact.
//!
//! Bytes land in a `.core-partial.*` staging file in the destination
//! directory, are synced, and are then published under the final
//! [`CoreName`] without clobbering. A name in the core namespace therefore
//! always refers to a complete dump. On failure the staging file is kept for
//! inspection.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::{Builder, NamedTempFile, PersistError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::clock::Clock;
use crate::error::CaptureError;
use crate::naming::{CoreName, PARTIAL_PREFIX};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Attempts at finding a free name before giving up.
pub const MAX_NAME_ATTEMPTS: u32 = 64;

/// A dump published in the core directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedDump {
    pub name: CoreName,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Writes core images into a directory.
pub struct DumpWriter<C> {
    dir: PathBuf,
    clock: C,
    read_timeout: Option<Duration>,
}

impl<C: Clock> DumpWriter<C> {
    pub fn new(dir: impl Into<PathBuf>, clock: C) -> Self {
        Self {
            dir: dir.into(),
            clock,
            read_timeout: None,
        }
    }

    /// Fail a capture when a single read from the input idles longer than
    /// `timeout`. Unset by default: reads block until the producer closes
    /// the stream.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy all of `input` into a new artifact for `executable`.
    pub async fn capture<R>(
        &self,
        executable: &str,
        mut input: R,
    ) -> Result<CapturedDump, CaptureError>
    where
        R: AsyncRead + Unpin,
    {
        let name = CoreName::generate(self.clock.now(), executable);

        let staging = create_staging(&self.dir).map_err(|source| CaptureError::CreateStaging {
            dir: self.dir.clone(),
            source,
        })?;

        let bytes = match self.copy_into(&staging, &mut input).await {
            Ok(bytes) => bytes,
            Err(err) => return Err(err.into_capture_error(keep_partial(staging))),
        };

        let (name, path) = publish(staging, &self.dir, &name)?;
        tracing::debug!(path = %path.display(), bytes, "dump published");
        Ok(CapturedDump { name, path, bytes })
    }

    async fn copy_into<R>(&self, staging: &NamedTempFile, input: &mut R) -> Result<u64, CopyError>
    where
        R: AsyncRead + Unpin,
    {
        let handle = staging.as_file().try_clone().map_err(CopyError::Write)?;
        let mut out = tokio::fs::File::from_std(handle);
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut total = 0u64;

        loop {
            let n = self.read_chunk(input, &mut buf).await.map_err(CopyError::Read)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n]).await.map_err(CopyError::Write)?;
            total += n as u64;
        }

        out.flush().await.map_err(CopyError::Write)?;
        out.sync_all().await.map_err(CopyError::Write)?;
        Ok(total)
    }

    async fn read_chunk<R>(&self, input: &mut R, buf: &mut [u8]) -> io::Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        match self.read_timeout {
            None => input.read(buf).await,
            Some(limit) => tokio::time::timeout(limit, input.read(buf))
                .await
                .map_err(|_| {
                    io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("no input for {limit:?}"),
                    )
                })?,
        }
    }
}

enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

impl CopyError {
    fn into_capture_error(self, partial: PathBuf) -> CaptureError {
        match self {
            Self::Read(source) => CaptureError::Read { partial, source },
            Self::Write(source) => CaptureError::Write { partial, source },
        }
    }
}

/// Open a fresh staging file in `dir`.
///
/// `tempfile_in` wraps open errors with the path and hides the errno, so the
/// file is opened here and the OS error is returned as is.
fn create_staging(dir: &Path) -> io::Result<NamedTempFile> {
    Builder::new().prefix(PARTIAL_PREFIX).make_in(dir, |path| {
        let mut options = std::fs::OpenOptions::new();
        options.read(true).write(true).create_new(true);
        #[cfg(unix)]
        std::os::unix::fs::OpenOptionsExt::mode(&mut options, 0o600);
        options.open(path)
    })
}

/// Keep a staging file on disk and return where it lives.
fn keep_partial(staging: NamedTempFile) -> PathBuf {
    let path = staging.path().to_path_buf();
    match staging.into_temp_path().keep() {
        Ok(kept) => kept,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err.error, "unable to keep partial dump");
            path
        }
    }
}

/// Link the staging file under the first free variant of `name`.
fn publish(
    mut staging: NamedTempFile,
    dir: &Path,
    name: &CoreName,
) -> Result<(CoreName, PathBuf), CaptureError> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let candidate = name.with_collision_suffix(attempt);
        let target = dir.join(candidate.as_str());
        match staging.persist_noclobber(&target) {
            Ok(_) => return Ok((candidate, target)),
            Err(PersistError { error, file }) if error.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!(target = %target.display(), "core name taken, retrying");
                staging = file;
            }
            Err(PersistError { error, file }) => {
                return Err(CaptureError::Publish {
                    partial: keep_partial(file),
                    target,
                    source: error,
                });
            }
        }
    }

    Err(CaptureError::NameExhausted {
        partial: keep_partial(staging),
        attempts: MAX_NAME_ATTEMPTS,
    })
}
