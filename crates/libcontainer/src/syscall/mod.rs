//! Contains a wrapper of syscalls for unit tests
//! This provides a uniform interface for rest of burrow
//! to call syscalls required for container management

pub mod linux;
#[allow(clippy::module_inception)]
pub mod syscall;
pub mod test;

pub use syscall::Syscall;

#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    #[error("unexpected mount attr option: {0}")]
    UnexpectedMountAttrOption(String),
    #[error(transparent)]
    Nix(#[from] nix::Error),
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error("failed to set capabilities: {0}")]
    SetCaps(#[from] caps::errors::CapsError),
    #[error("failed to set keep capabilities to {value}: {errno}")]
    PrctlSetKeepCapabilities {
        errno: nix::errno::Errno,
        value: bool,
    },
    #[error("failed to set no new privileges: {errno}")]
    PrctlSetNoNewPrivileges { errno: nix::errno::Errno },
    #[error("failed to pivot root to {path:?}: {msg}")]
    PivotRoot {
        path: std::path::PathBuf,
        msg: String,
        errno: nix::errno::Errno,
    },
    #[error("invalid path {0:?}")]
    InvalidPath(std::path::PathBuf),
}

impl SyscallError {
    /// Returns the errno carried by the error, if the failure came from the kernel.
    pub fn errno(&self) -> Option<nix::errno::Errno> {
        match self {
            SyscallError::Nix(errno)
            | SyscallError::PrctlSetKeepCapabilities { errno, .. }
            | SyscallError::PrctlSetNoNewPrivileges { errno }
            | SyscallError::PivotRoot { errno, .. } => Some(*errno),
            SyscallError::IO(err) => err.raw_os_error().map(nix::errno::Errno::from_raw),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyscallError>;
