use std::fs::{read_link, remove_file};
use std::path::{Path, PathBuf};

use crate::syscall::syscall::create_syscall;
use crate::syscall::Syscall;

#[derive(Debug, thiserror::Error)]
pub enum SymlinkError {
    #[error("failed to create symlink {link:?}")]
    Syscall {
        link: PathBuf,
        source: crate::syscall::SyscallError,
    },
    #[error("failed to replace {path:?}")]
    Remove {
        path: PathBuf,
        source: std::io::Error,
    },
}

type Result<T> = std::result::Result<T, SymlinkError>;

const DEFAULT_SYMLINKS: &[(&str, &str)] = &[
    ("/proc/self/fd", "dev/fd"),
    ("/proc/self/fd/0", "dev/stdin"),
    ("/proc/self/fd/1", "dev/stdout"),
    ("/proc/self/fd/2", "dev/stderr"),
];

pub struct Symlink {
    syscall: Box<dyn Syscall>,
}

impl Default for Symlink {
    fn default() -> Self {
        Self::new()
    }
}

impl Symlink {
    pub fn new() -> Symlink {
        Symlink {
            syscall: create_syscall(),
        }
    }

    #[cfg(test)]
    pub(super) fn syscall(&self) -> &dyn Syscall {
        self.syscall.as_ref()
    }

    /// `/dev/ptmx` points into the devpts instance of the container.
    pub fn setup_ptmx(&self, rootfs: &Path) -> Result<()> {
        self.link(Path::new("pts/ptmx"), &rootfs.join("dev/ptmx"))
    }

    // not every architecture has /proc/kcore
    pub fn setup_kcore_symlink(&self, rootfs: &Path) -> Result<()> {
        if Path::new("/proc/kcore").exists() {
            self.link(Path::new("/proc/kcore"), &rootfs.join("dev/kcore"))?;
        }
        Ok(())
    }

    pub fn setup_default_symlinks(&self, rootfs: &Path) -> Result<()> {
        for (src, dst) in DEFAULT_SYMLINKS {
            self.link(Path::new(src), &rootfs.join(dst))?;
        }
        Ok(())
    }

    // An existing link to the same target is kept, anything else in the way
    // is removed first.
    fn link(&self, original: &Path, link: &Path) -> Result<()> {
        match read_link(link) {
            Ok(target) if target == original => return Ok(()),
            _ => {}
        }
        if let Err(err) = remove_file(link) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::error!(?link, %err, "could not remove existing file");
                return Err(SymlinkError::Remove {
                    path: link.to_path_buf(),
                    source: err,
                });
            }
        }

        self.syscall.symlink(original, link).map_err(|err| {
            tracing::error!(?original, ?link, %err, "failed to symlink");
            SymlinkError::Syscall {
                link: link.to_path_buf(),
                source: err,
            }
        })
    }
}
