//! Root filesystem of the container: the mount tree assembled before
//! pivot_root and the hardening applied after it.

#[allow(clippy::module_inception)]
pub(crate) mod rootfs;
pub use rootfs::RootFS;

pub mod device;
pub use device::Device;

pub(super) mod mount;
pub mod paths;
pub(super) mod symlink;

pub mod utils;

#[derive(Debug, thiserror::Error)]
pub enum RootfsError {
    #[error("unknown rootfs_propagation: {0}")]
    UnknownRootfsPropagation(String),
    #[error("failed syscall")]
    Syscall(#[from] crate::syscall::SyscallError),
    #[error(transparent)]
    MissingSpec(#[from] crate::error::MissingSpecError),
    #[error("failed to build mount entry")]
    Spec(#[from] oci_spec::OciSpecError),
    #[error(transparent)]
    Mount(#[from] mount::MountError),
    #[error(transparent)]
    Device(#[from] device::DeviceError),
    #[error(transparent)]
    Symlink(#[from] symlink::SymlinkError),
    #[error(transparent)]
    Paths(#[from] paths::PathsError),
}

type Result<T> = std::result::Result<T, RootfsError>;
