use std::ffi::OsString;
use std::os::fd::RawFd;

use libcgroups::common::CgroupConfig;
use oci_spec::runtime::Spec;

use crate::syscall::syscall::SyscallType;
use crate::user_ns::UserNamespaceConfig;

/// Environment variable carrying the child end of the init channel
/// across the re-exec.
pub const INIT_SOCK_FD_ENV: &str = "_BURROW_INIT_SOCK_FD";
/// Environment variable carrying the connected console socket.
pub const CONSOLE_SOCK_FD_ENV: &str = "_BURROW_CONSOLE_SOCK_FD";

pub struct ContainerArgs<'a> {
    /// Interface to operating system primitives
    pub syscall: SyscallType,
    /// OCI compliant runtime spec
    pub spec: &'a Spec,
    /// Socket to communicate the file descriptor of the ptty
    pub console_socket: Option<RawFd>,
    /// Id mappings to write when a new user namespace is created
    pub user_ns_config: Option<UserNamespaceConfig>,
    /// Cgroup to place the container process in, if the runtime manages one
    pub cgroup_config: Option<CgroupConfig>,
    /// Arguments for re-entering the runtime binary as the container process
    pub reexec_args: Vec<OsString>,
}
