use std::os::unix::process::CommandExt;
use std::process::Command;

use libcgroups::common::{
    create_cgroup_manager, AnyManagerError, CgroupManager, CreateCgroupSetupError,
};
use nix::sched::CloneFlags;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use oci_spec::runtime::LinuxNamespaceType;

use crate::channel::{self, ChannelError, Endpoint, Message};
use crate::error::MissingSpecError;
use crate::namespaces::{NamespaceError, Namespaces};
use crate::process::args::{ContainerArgs, CONSOLE_SOCK_FD_ENV, INIT_SOCK_FD_ENV};
use crate::process::fork::{self, CloneError};
use crate::user_ns::UserNamespaceError;

#[derive(Debug, thiserror::Error)]
pub enum MainProcessError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    MissingSpec(#[from] MissingSpecError),
    #[error(transparent)]
    Namespaces(#[from] NamespaceError),
    #[error(transparent)]
    Clone(#[from] CloneError),
    #[error("failed to write id mappings")]
    UserNamespace(#[from] UserNamespaceError),
    #[error("failed to set up cgroup manager")]
    CgroupSetup(#[from] CreateCgroupSetupError),
    #[error("failed to add container process to cgroup")]
    Cgroup(#[from] AnyManagerError),
    #[error("failed to unshare the cgroup namespace")]
    UnshareCgroup(#[source] nix::Error),
    #[error("failed to make console socket inheritable")]
    ConsoleSocket(#[source] nix::Error),
    #[error("failed to re-exec the runtime")]
    Exec(#[source] std::io::Error),
}

type Result<T> = std::result::Result<T, MainProcessError>;

/// Spawns the container process and waits until it reports `ready`.
/// Returns its pid, as seen from the runtime's pid namespace.
pub fn container_main_process(args: &ContainerArgs) -> Result<Pid> {
    let linux = args.spec.linux().as_ref().ok_or(MissingSpecError::Linux)?;
    let namespaces = Namespaces::try_from(linux.namespaces().as_ref())?
        .with_syscall(args.syscall.create_syscall());
    let (main_end, init_end) = channel::channel()?;

    // a joined pid namespace only applies to children, so join it here
    namespaces.join_namespaces(|flag| flag == CloneFlags::CLONE_NEWPID)?;

    // the cgroup namespace is unshared once the child sits in its cgroup
    let flags = namespaces
        .clone_flags()
        .difference(CloneFlags::CLONE_NEWCGROUP);
    let unshare_cgroup = namespaces.is_new(LinuxNamespaceType::Cgroup);
    let child = fork::container_clone(flags, || {
        container_child(args, &namespaces, &init_end, unshare_cgroup)
    })?;
    tracing::debug!(%child, ?flags, "container process cloned");
    drop(init_end);

    if let Err(err) = wait_for_ready(args, child, &main_end) {
        tracing::error!(%child, %err, "container process failed to become ready");
        let _ = signal::kill(child, Signal::SIGKILL);
        let _ = waitpid(child, None);
        return Err(err);
    }

    Ok(child)
}

fn wait_for_ready(args: &ContainerArgs, child: Pid, main_end: &Endpoint) -> Result<()> {
    if let Some(user_ns_config) = &args.user_ns_config {
        user_ns_config.write_mappings(child)?;
    }

    if let Some(cgroup_config) = &args.cgroup_config {
        let cmanager = create_cgroup_manager(cgroup_config)?;
        cmanager.add_task(child)?;
    }

    main_end.send(Message::Mapped)?;
    main_end.recv(Message::Ready)?;
    Ok(())
}

/// Runs in the cloned child. Only returns on error; success replaces the
/// process image with the runtime binary in reexec mode.
fn container_child(
    args: &ContainerArgs,
    namespaces: &Namespaces,
    init_end: &Endpoint,
    unshare_cgroup: bool,
) -> Result<i32> {
    init_end.recv(Message::Mapped)?;

    if unshare_cgroup {
        nix::sched::unshare(CloneFlags::CLONE_NEWCGROUP).map_err(MainProcessError::UnshareCgroup)?;
    }
    namespaces.join_namespaces(|flag| flag != CloneFlags::CLONE_NEWPID)?;

    let init_fd = init_end.inheritable()?;
    let mut cmd = Command::new("/proc/self/exe");
    cmd.arg0("burrow")
        .args(&args.reexec_args)
        .env(INIT_SOCK_FD_ENV, init_fd.to_string());

    if let Some(console_fd) = args.console_socket {
        nix::fcntl::fcntl(
            console_fd,
            nix::fcntl::FcntlArg::F_SETFD(nix::fcntl::FdFlag::empty()),
        )
        .map_err(MainProcessError::ConsoleSocket)?;
        cmd.env(CONSOLE_SOCK_FD_ENV, console_fd.to_string());
    }

    tracing::debug!(args = ?args.reexec_args, "re-exec runtime");
    Err(MainProcessError::Exec(cmd.exec()))
}
