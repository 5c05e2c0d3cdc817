use crate::channel::ChannelError;
use crate::config::ConfigError;
use crate::container::lock::LockError;
use crate::container::state::StateError;
use crate::container::ContainerStatus;
use crate::container_socket::ContainerSocketError;
use crate::hooks::HookError;
use crate::process::container_init_process::InitProcessError;
use crate::process::container_main_process::MainProcessError;
use crate::signal::SignalError;
use crate::syscall::SyscallError;
use crate::tty::TTYError;
use crate::user_ns::UserNamespaceError;

#[derive(Debug, thiserror::Error)]
pub enum MissingSpecError {
    #[error("missing process in spec")]
    Process,
    #[error("missing linux in spec")]
    Linux,
    #[error("missing root in spec")]
    Root,
    #[error("missing args in the process spec")]
    Args,
}

#[derive(Debug, thiserror::Error)]
pub enum ErrInvalidID {
    #[error("container id can't be empty")]
    Empty,
    #[error("container id contains invalid characters: {0:?}")]
    InvalidChars(char),
    #[error("container id can't be used to represent a file name (such as . or ..)")]
    FileName,
    #[error("container id is longer than {} characters", crate::container::builder::MAX_ID_LEN)]
    TooLong,
}

#[derive(Debug, thiserror::Error)]
pub enum ErrInvalidSpec {
    #[error("runtime spec has incompatible version. Only 1.X.Y is supported")]
    UnsupportedVersion,
    #[error("apparmor is specified but not enabled on this system")]
    AppArmorNotEnabled,
    #[error("invalid io priority or class.")]
    IoPriority,
    #[error("seccomp is configured but this build has no seccomp support")]
    SeccompUnsupported,
    #[error("process.terminal is set but no console socket was given")]
    ConsoleSocketRequired,
}

#[derive(Debug, thiserror::Error)]
pub enum LibcontainerError {
    #[error("invalid container id")]
    InvalidID(#[from] ErrInvalidID),
    #[error("container already exists")]
    Exist,
    #[error("container state directory does not exist")]
    NoDirectory,
    #[error("invalid runtime spec")]
    InvalidSpec(#[from] ErrInvalidSpec),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("container is in an incorrect status: {0}")]
    IncorrectStatus(ContainerStatus),
    #[error("another operation is in progress on this container")]
    OperationInProgress,
    #[error("protocol violation: expected {expected:?}, got {got:?}")]
    Protocol { expected: String, got: String },
    #[error("requires a supported cgroup setup")]
    CgroupSetup(#[from] libcgroups::common::CreateCgroupSetupError),
    #[error("cgroup operation failed")]
    Cgroup(#[from] libcgroups::common::AnyManagerError),

    // Catch all errors that are not covered by the above
    #[error(transparent)]
    OtherIO(#[from] std::io::Error),
    #[error(transparent)]
    OtherSyscall(#[from] nix::Error),
    #[error("failed to load the spec")]
    Spec(#[from] oci_spec::OciSpecError),
    #[error(transparent)]
    MissingSpec(#[from] MissingSpecError),
    #[error(transparent)]
    Syscall(#[from] SyscallError),
    #[error(transparent)]
    Channel(ChannelError),
    #[error(transparent)]
    ContainerSocket(#[from] ContainerSocketError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Lock(LockError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    UserNamespace(#[from] UserNamespaceError),
    #[error(transparent)]
    Signal(#[from] SignalError<String>),
    #[error(transparent)]
    Tty(#[from] TTYError),
    #[error(transparent)]
    MainProcess(#[from] MainProcessError),
    #[error(transparent)]
    InitProcess(#[from] InitProcessError),
}

impl From<ChannelError> for LibcontainerError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::UnexpectedMessage { expected, got } => LibcontainerError::Protocol {
                expected: expected.to_string(),
                got,
            },
            err => LibcontainerError::Channel(err),
        }
    }
}

impl From<LockError> for LibcontainerError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::WouldBlock { .. } => LibcontainerError::OperationInProgress,
            err => LibcontainerError::Lock(err),
        }
    }
}
