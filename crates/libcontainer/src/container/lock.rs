//! Per-container advisory lock serializing lifecycle operations.
use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

pub const LOCK_FILE: &str = "c.lock";

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("failed to open lock file {path:?}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path:?} is held by another operation")]
    WouldBlock { path: PathBuf },
    #[error("failed to lock {path:?}")]
    Lock { path: PathBuf, source: Errno },
}

type Result<T> = std::result::Result<T, LockError>;

/// Exclusive `flock` on `{container_dir}/c.lock`, released on drop.
#[derive(Debug)]
pub struct ContainerLock {
    _flock: Flock<File>,
    path: PathBuf,
}

impl ContainerLock {
    /// Takes the lock without waiting. A held lock is reported as
    /// `WouldBlock` so callers can decide whether to retry.
    pub fn acquire(container_dir: &Path) -> Result<Self> {
        let path = container_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .mode(0o600)
            .open(&path)
            .map_err(|err| LockError::Open {
                path: path.clone(),
                source: err,
            })?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => {
                tracing::trace!(?path, "container lock acquired");
                Ok(Self {
                    _flock: flock,
                    path,
                })
            }
            Err((_, Errno::EWOULDBLOCK)) => {
                tracing::debug!(?path, "container lock is held");
                Err(LockError::WouldBlock { path })
            }
            Err((_, errno)) => {
                tracing::error!(?path, %errno, "failed to lock container");
                Err(LockError::Lock {
                    path,
                    source: errno,
                })
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
