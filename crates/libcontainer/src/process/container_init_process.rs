use std::collections::HashMap;
use std::ffi::CString;
use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::{env, fs, mem};

use nix::sys::stat::Mode;
use nix::unistd::{self, Gid, Uid};
use oci_spec::runtime::{
    IOPriorityClass, LinuxSchedulerFlag, LinuxSchedulerPolicy, LinuxSeccomp, Process, Scheduler,
    Spec,
};

use crate::apparmor::{self, AppArmorError};
use crate::capabilities;
use crate::channel::{ChannelError, Endpoint, Message};
use crate::container::state::StateError;
use crate::container::State;
use crate::container_socket::{ContainerListener, ContainerSocketError, CONTAINER_SOCKET};
use crate::error::MissingSpecError;
use crate::hooks::{self, HookError};
use crate::namespaces::{NamespaceError, Namespaces};
use crate::process::args::{CONSOLE_SOCK_FD_ENV, INIT_SOCK_FD_ENV};
use crate::rootfs::{RootFS, RootfsError};
#[cfg(feature = "libseccomp")]
use crate::seccomp;
use crate::syscall::linux::SchedAttr;
use crate::syscall::syscall::create_syscall;
use crate::syscall::{Syscall, SyscallError};
use crate::tty::{self, TTYError};
use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum InitProcessError {
    #[error("{name} is missing or not a descriptor")]
    InheritedFd { name: &'static str },
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to load spec")]
    Spec(#[from] oci_spec::OciSpecError),
    #[error(transparent)]
    MissingSpec(#[from] MissingSpecError),
    #[error(transparent)]
    Namespaces(#[from] NamespaceError),
    #[error("failed to create session")]
    Setsid(#[source] nix::Error),
    #[error("terminal requested but no console socket was passed")]
    NoConsoleSocket,
    #[error(transparent)]
    Tty(#[from] TTYError),
    #[error(transparent)]
    Rootfs(#[from] RootfsError),
    #[error(transparent)]
    ContainerSocket(#[from] ContainerSocketError),
    #[error("failed to set sysctl {key}")]
    Sysctl { key: String, source: std::io::Error },
    #[error("failed to set hostname")]
    Hostname(#[source] SyscallError),
    #[error("failed to set domainname")]
    Domainname(#[source] SyscallError),
    #[error("failed to set rlimit {typ}")]
    Rlimit { typ: String, source: SyscallError },
    #[error("failed to set scheduler")]
    Scheduler(#[source] SyscallError),
    #[error("failed to set io priority")]
    IoPriority(#[source] SyscallError),
    #[error("invalid umask {0:o}")]
    InvalidUmask(u32),
    #[error("failed to drop bounding capabilities")]
    DropBounding(#[source] SyscallError),
    #[error("failed to set keep capabilities to {value}")]
    KeepCapabilities { value: bool, source: SyscallError },
    #[error("failed to read setgroups policy")]
    ReadSetgroups(#[source] std::io::Error),
    #[error("cannot set supplementary groups, setgroups is denied")]
    SetGroupsDenied,
    #[error("failed to set supplementary groups")]
    SetGroups(#[source] SyscallError),
    #[error("failed to switch to uid {uid} gid {gid}")]
    SetId {
        uid: u32,
        gid: u32,
        source: SyscallError,
    },
    #[error("failed to apply capabilities")]
    ApplyCapabilities(#[source] SyscallError),
    #[error("failed to set no new privileges")]
    NoNewPrivileges(#[source] SyscallError),
    #[cfg(feature = "libseccomp")]
    #[error(transparent)]
    Seccomp(#[from] seccomp::SeccompError),
    #[error("seccomp is configured but this build has no seccomp support")]
    SeccompUnsupported,
    #[error(transparent)]
    AppArmor(#[from] AppArmorError),
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error("failed to chdir to {path:?}")]
    Chdir { path: PathBuf, source: nix::Error },
    #[error("executable {0:?} not found")]
    ExecutableNotFound(String),
    #[error("{0:?} is not executable")]
    NotExecutable(PathBuf),
    #[error("argument or environment entry {0:?} contains a nul byte")]
    InvalidArg(String),
    #[error("failed to exec {path:?}")]
    Exec { path: PathBuf, source: nix::Error },
}

type Result<T> = std::result::Result<T, InitProcessError>;

/// Body of the re-executed runtime inside the container's namespaces.
/// Builds the root filesystem, reports `ready`, waits for `start`, hardens
/// the process and execs the user program. Returns only if the spec has
/// no process to run.
#[tracing::instrument(level = "trace")]
pub fn container_init_process(container_dir: &Path) -> Result<()> {
    let init_end = {
        let fd = inherited_fd(INIT_SOCK_FD_ENV)?.ok_or(InitProcessError::InheritedFd {
            name: INIT_SOCK_FD_ENV,
        })?;
        // SAFETY: the runtime handed this descriptor over for this process to own
        unsafe { Endpoint::from_raw_fd(fd) }
    };
    let console_fd = inherited_fd(CONSOLE_SOCK_FD_ENV)?;

    let state = State::load(container_dir)?;
    let mut spec = Spec::load(state.bundle.join("config.json"))?;
    spec.canonicalize_rootfs(&state.bundle)?;
    let linux = spec.linux().as_ref().ok_or(MissingSpecError::Linux)?;
    let namespaces = Namespaces::try_from(linux.namespaces().as_ref())?;
    let rootfs_path = spec
        .root()
        .as_ref()
        .ok_or(MissingSpecError::Root)?
        .path()
        .clone();

    unistd::setsid().map_err(InitProcessError::Setsid)?;

    let terminal = spec
        .process()
        .as_ref()
        .and_then(|p| p.terminal())
        .unwrap_or(false);
    let console = match (terminal, console_fd) {
        (true, Some(fd)) => Some(tty::setup_console(fd)?),
        (true, None) => return Err(InitProcessError::NoConsoleSocket),
        (false, _) => None,
    };

    let rootfs = RootFS::new();
    rootfs.prepare_rootfs(&spec, &rootfs_path, namespaces.is_new(oci_spec::runtime::LinuxNamespaceType::User))?;
    let syscall = create_syscall();
    if let Some(slave) = &console {
        tty::bind_console(&rootfs_path, slave, syscall.as_ref())?;
    }

    let listener = ContainerListener::new(&container_dir.join(CONTAINER_SOCKET))?;
    init_end.send(Message::Ready)?;
    drop(init_end);
    listener.wait_for_container_start()?;

    // the runtime persisted `created` before it could send `start`
    let state = State::load(container_dir)?;

    rootfs.pivot_root(&rootfs_path)?;

    if spec.process().is_some() {
        let setgroups_denied = setgroups_denied()?;
        let mut loader = load_seccomp;
        setup_post_pivot(
            &spec,
            &namespaces,
            &rootfs,
            syscall.as_ref(),
            setgroups_denied,
            &mut loader,
        )?;
    }

    // startContainer hooks run inside the container, after pivot
    hooks::run_hooks(
        spec.hooks().as_ref().and_then(|h| h.start_container().as_ref()),
        &state,
    )?;

    match spec.process() {
        Some(process) => exec_process(process),
        None => {
            tracing::debug!("no process configured, exiting");
            Ok(())
        }
    }
}

fn inherited_fd(name: &'static str) -> Result<Option<RawFd>> {
    let Ok(value) = env::var(name) else {
        return Ok(None);
    };
    env::remove_var(name);
    value
        .parse::<RawFd>()
        .map(Some)
        .map_err(|_| InitProcessError::InheritedFd { name })
}

fn setgroups_denied() -> Result<bool> {
    match fs::read_to_string("/proc/self/setgroups") {
        Ok(policy) => Ok(policy.trim() == "deny"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(InitProcessError::ReadSetgroups(err)),
    }
}

#[cfg(feature = "libseccomp")]
fn load_seccomp(config: &LinuxSeccomp) -> Result<()> {
    seccomp::initialize_seccomp(config)?;
    Ok(())
}

#[cfg(not(feature = "libseccomp"))]
fn load_seccomp(_config: &LinuxSeccomp) -> Result<()> {
    Err(InitProcessError::SeccompUnsupported)
}

/// Hardens the process after pivot_root, in the order the sandbox needs:
/// mounts first, then process attributes, then the privilege drop. Seccomp
/// goes in before the capability drop unless no-new-privileges is set, in
/// which case it is loaded last so the filter covers as little setup as
/// possible.
fn setup_post_pivot(
    spec: &Spec,
    namespaces: &Namespaces,
    rootfs: &RootFS,
    syscall: &dyn Syscall,
    setgroups_denied: bool,
    load_seccomp: &mut dyn FnMut(&LinuxSeccomp) -> Result<()>,
) -> Result<()> {
    let linux = spec.linux().as_ref().ok_or(MissingSpecError::Linux)?;
    let process = spec.process().as_ref().ok_or(MissingSpecError::Process)?;

    if let Some(kernel_params) = linux.sysctl() {
        sysctl(kernel_params)?;
    }

    rootfs.apply_masked_and_readonly_paths(linux)?;
    rootfs.adjust_root_mount_propagation(linux)?;
    if spec.root().as_ref().and_then(|r| r.readonly()).unwrap_or(false) {
        rootfs.remount_root_readonly()?;
    }

    if namespaces.is_new(oci_spec::runtime::LinuxNamespaceType::Uts) {
        if let Some(hostname) = spec.hostname() {
            syscall
                .set_hostname(hostname)
                .map_err(InitProcessError::Hostname)?;
        }
        if let Some(domainname) = spec.domainname() {
            syscall
                .set_domainname(domainname)
                .map_err(InitProcessError::Domainname)?;
        }
    }

    if let Some(profile) = process.apparmor_profile() {
        apparmor::apply_profile(profile)?;
    }

    for rlimit in process.rlimits().iter().flatten() {
        syscall
            .set_rlimit(rlimit)
            .map_err(|err| InitProcessError::Rlimit {
                typ: format!("{:?}", rlimit.typ()),
                source: err,
            })?;
    }

    if let Some(scheduler) = process.scheduler() {
        syscall
            .set_scheduler(&sched_attr(scheduler))
            .map_err(InitProcessError::Scheduler)?;
    }

    if let Some(io_priority) = process.io_priority() {
        let class = match io_priority.class() {
            IOPriorityClass::IoprioClassRt => 1,
            IOPriorityClass::IoprioClassBe => 2,
            IOPriorityClass::IoprioClassIdle => 3,
        };
        syscall
            .set_io_priority(class, io_priority.priority())
            .map_err(InitProcessError::IoPriority)?;
    }

    if let Some(umask) = process.user().umask() {
        let mode = Mode::from_bits(umask).ok_or(InitProcessError::InvalidUmask(umask))?;
        nix::sys::stat::umask(mode);
    }

    let no_new_privileges = process.no_new_privileges().unwrap_or(false);
    let seccomp = linux.seccomp().as_ref();
    if let (false, Some(seccomp)) = (no_new_privileges, seccomp) {
        // without no_new_privileges the filter needs CAP_SYS_ADMIN
        load_seccomp(seccomp)?;
    }

    set_user(process, syscall, setgroups_denied)?;

    if no_new_privileges {
        syscall
            .set_no_new_privileges()
            .map_err(InitProcessError::NoNewPrivileges)?;
        if let Some(seccomp) = seccomp {
            load_seccomp(seccomp)?;
        }
    }

    Ok(())
}

/// Drops the bounding set, switches user and groups, then applies the
/// remaining capability sets. KEEPCAPS carries permitted capabilities
/// across a switch away from root.
fn set_user(process: &Process, syscall: &dyn Syscall, setgroups_denied: bool) -> Result<()> {
    let user = process.user();
    let caps = process.capabilities().as_ref();

    if let Some(caps) = caps {
        capabilities::drop_bounding(caps, syscall).map_err(InitProcessError::DropBounding)?;
    }

    let keep_caps = user.uid() != 0 && caps.map(capabilities::retains_any).unwrap_or(false);
    if keep_caps {
        syscall
            .set_keep_capabilities(true)
            .map_err(|err| InitProcessError::KeepCapabilities {
                value: true,
                source: err,
            })?;
    }

    let gids: Vec<Gid> = user
        .additional_gids()
        .iter()
        .flatten()
        .map(|gid| Gid::from_raw(*gid))
        .collect();
    match (setgroups_denied, gids.is_empty()) {
        (true, false) => return Err(InitProcessError::SetGroupsDenied),
        (true, true) => {}
        (false, _) => syscall
            .set_groups(&gids)
            .map_err(InitProcessError::SetGroups)?,
    }

    syscall
        .set_id(Uid::from_raw(user.uid()), Gid::from_raw(user.gid()))
        .map_err(|err| InitProcessError::SetId {
            uid: user.uid(),
            gid: user.gid(),
            source: err,
        })?;

    if let Some(caps) = caps {
        capabilities::apply_sets(caps, syscall).map_err(InitProcessError::ApplyCapabilities)?;
    }

    if keep_caps {
        syscall
            .set_keep_capabilities(false)
            .map_err(|err| InitProcessError::KeepCapabilities {
                value: false,
                source: err,
            })?;
    }
    Ok(())
}

fn sysctl(kernel_params: &HashMap<String, String>) -> Result<()> {
    let sys = PathBuf::from("/proc/sys");
    for (kernel_param, value) in kernel_params {
        let path = sys.join(kernel_param.replace('.', "/"));
        tracing::debug!(?kernel_param, ?value, "apply sysctl");
        fs::write(&path, value.as_bytes()).map_err(|err| {
            tracing::error!(?path, %err, "failed to set sysctl");
            InitProcessError::Sysctl {
                key: kernel_param.clone(),
                source: err,
            }
        })?;
    }

    Ok(())
}

fn sched_attr(scheduler: &Scheduler) -> SchedAttr {
    let sched_policy = match scheduler.policy() {
        LinuxSchedulerPolicy::SchedOther => 0,
        LinuxSchedulerPolicy::SchedFifo => 1,
        LinuxSchedulerPolicy::SchedRr => 2,
        LinuxSchedulerPolicy::SchedBatch => 3,
        LinuxSchedulerPolicy::SchedIso => 4,
        LinuxSchedulerPolicy::SchedIdle => 5,
        LinuxSchedulerPolicy::SchedDeadline => 6,
    };
    let sched_flags = scheduler
        .flags()
        .iter()
        .flatten()
        .fold(0u64, |acc, flag| {
            acc | match flag {
                LinuxSchedulerFlag::SchedResetOnFork => 0x01,
                LinuxSchedulerFlag::SchedFlagReclaim => 0x02,
                LinuxSchedulerFlag::SchedFlagDLOverrun => 0x04,
                LinuxSchedulerFlag::SchedFlagKeepPolicy => 0x08,
                LinuxSchedulerFlag::SchedFlagKeepParams => 0x10,
                LinuxSchedulerFlag::SchedFlagUtilClampMin => 0x20,
                LinuxSchedulerFlag::SchedFlagUtilClampMax => 0x40,
            }
        });

    SchedAttr {
        size: mem::size_of::<SchedAttr>() as u32,
        sched_policy,
        sched_flags,
        sched_nice: scheduler.nice().unwrap_or(0),
        sched_priority: scheduler.priority().unwrap_or(0) as u32,
        sched_runtime: scheduler.runtime().unwrap_or(0),
        sched_deadline: scheduler.deadline().unwrap_or(0),
        sched_period: scheduler.period().unwrap_or(0),
        sched_util_min: 0,
        sched_util_max: 0,
    }
}

/// Replaces this process with the user program. The path is resolved
/// against the container's own `PATH`, after changing to its cwd.
fn exec_process(process: &Process) -> Result<()> {
    let args = process
        .args()
        .as_ref()
        .filter(|args| !args.is_empty())
        .ok_or(MissingSpecError::Args)?;

    let cwd = process.cwd();
    if !cwd.as_os_str().is_empty() {
        unistd::chdir(cwd).map_err(|err| InitProcessError::Chdir {
            path: cwd.clone(),
            source: err,
        })?;
    }

    let envs = process.env().clone().unwrap_or_default();
    let path_var = envs
        .iter()
        .rev()
        .find(|e| e.starts_with("PATH="))
        .map(String::as_str)
        .unwrap_or("");
    let executable = utils::get_executable_path(&args[0], path_var)
        .ok_or_else(|| InitProcessError::ExecutableNotFound(args[0].clone()))?;
    match utils::is_executable(&executable) {
        Ok(true) => {}
        Ok(false) => return Err(InitProcessError::NotExecutable(executable)),
        Err(err) => {
            tracing::error!(?executable, %err, "failed to inspect executable");
            return Err(InitProcessError::ExecutableNotFound(args[0].clone()));
        }
    }

    let to_cstring = |s: &[u8]| {
        CString::new(s).map_err(|_| InitProcessError::InvalidArg(String::from_utf8_lossy(s).into()))
    };
    let path = to_cstring(executable.as_os_str().as_bytes())?;
    let argv = args
        .iter()
        .map(|a| to_cstring(a.as_bytes()))
        .collect::<Result<Vec<_>>>()?;
    let envp = envs
        .iter()
        .map(|e| to_cstring(e.as_bytes()))
        .collect::<Result<Vec<_>>>()?;

    tracing::debug!(?executable, ?args, "exec container process");
    match unistd::execve(&path, &argv, &envp) {
        Ok(never) => match never {},
        Err(err) => {
            tracing::error!(?executable, %err, "failed to exec");
            Err(InitProcessError::Exec {
                path: executable,
                source: err,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashSet;

    use anyhow::Result;
    use oci_spec::runtime::{
        Capability, LinuxBuilder, LinuxCapabilitiesBuilder, LinuxIOPriorityBuilder,
        LinuxNamespaceBuilder, LinuxNamespaceType, LinuxSchedulerPolicy, LinuxSeccompAction,
        LinuxSeccompBuilder, PosixRlimitBuilder, PosixRlimitType, ProcessBuilder, RootBuilder,
        SchedulerBuilder, SpecBuilder, UserBuilder,
    };

    use super::*;
    use crate::syscall::test::{ArgName, Call, TestHelperSyscall};

    fn label(call: &Call) -> String {
        match call {
            Call::Mount(m) => format!("mount {}", m.target.display()),
            Call::Hostname(h) => format!("hostname {h}"),
            Call::Domainname(d) => format!("domainname {d}"),
            Call::Rlimit(_) => "rlimit".to_string(),
            Call::Scheduler(_) => "scheduler".to_string(),
            Call::IoPriority(class, prio) => format!("ioprio {class} {prio}"),
            Call::SetCapability(set, _) => format!("caps {set:?}"),
            Call::KeepCapabilities(v) => format!("keepcaps {v}"),
            Call::Groups(g) => format!("groups {}", g.len()),
            Call::SetId(uid, gid) => format!("setid {uid} {gid}"),
            Call::NoNewPrivileges => "nnp".to_string(),
            other => format!("{other:?}"),
        }
    }

    fn hardened_spec(no_new_privileges: bool) -> Result<Spec> {
        let caps = |list: &[Capability]| -> HashSet<Capability> { list.iter().cloned().collect() };
        let capabilities = LinuxCapabilitiesBuilder::default()
            .bounding(caps(&[Capability::NetBindService]))
            .effective(caps(&[Capability::NetBindService]))
            .permitted(caps(&[Capability::NetBindService]))
            .inheritable(caps(&[]))
            .ambient(caps(&[]))
            .build()?;
        let process = ProcessBuilder::default()
            .args(vec!["/bin/sh".to_string()])
            .user(
                UserBuilder::default()
                    .uid(1000u32)
                    .gid(1000u32)
                    .additional_gids(vec![1000u32])
                    .build()?,
            )
            .capabilities(capabilities)
            .rlimits(vec![PosixRlimitBuilder::default()
                .typ(PosixRlimitType::RlimitNofile)
                .hard(1024u64)
                .soft(1024u64)
                .build()?])
            .scheduler(
                SchedulerBuilder::default()
                    .policy(LinuxSchedulerPolicy::SchedBatch)
                    .nice(5)
                    .build()?,
            )
            .io_priority(
                LinuxIOPriorityBuilder::default()
                    .class(IOPriorityClass::IoprioClassBe)
                    .priority(4)
                    .build()?,
            )
            .no_new_privileges(no_new_privileges)
            .build()?;
        let linux = LinuxBuilder::default()
            .namespaces(vec![
                LinuxNamespaceBuilder::default()
                    .typ(LinuxNamespaceType::Mount)
                    .build()?,
                LinuxNamespaceBuilder::default()
                    .typ(LinuxNamespaceType::Uts)
                    .build()?,
            ])
            .masked_paths(vec!["/proc/kcore".to_string()])
            .readonly_paths(vec!["/proc".to_string()])
            .rootfs_propagation("shared")
            .seccomp(
                LinuxSeccompBuilder::default()
                    .default_action(LinuxSeccompAction::ScmpActAllow)
                    .build()?,
            )
            .build()?;
        Ok(SpecBuilder::default()
            .root(RootBuilder::default().path("rootfs").readonly(true).build()?)
            .hostname("box")
            .process(process)
            .linux(linux)
            .build()?)
    }

    /// Runs the post-pivot sequence against the recording syscall and
    /// returns the call labels with `seccomp` spliced in where the filter
    /// was loaded.
    fn run_sequence(spec: &Spec) -> Result<Vec<String>> {
        let rootfs = RootFS::new();
        let syscall = rootfs.syscall();
        let recorder = syscall
            .as_any()
            .downcast_ref::<TestHelperSyscall>()
            .expect("test syscall");
        let linux = spec.linux().as_ref().expect("linux");
        let namespaces = Namespaces::try_from(linux.namespaces().as_ref())?;

        let loaded_at = RefCell::new(vec![]);
        let mut loader = |_: &LinuxSeccomp| -> super::Result<()> {
            loaded_at.borrow_mut().push(recorder.get_calls().len());
            Ok(())
        };
        setup_post_pivot(spec, &namespaces, &rootfs, syscall, false, &mut loader)?;

        let mut labels: Vec<String> = recorder.get_calls().iter().map(label).collect();
        for at in loaded_at.borrow().iter().rev() {
            labels.insert(*at, "seccomp".to_string());
        }
        Ok(labels)
    }

    #[test]
    fn test_post_pivot_order_with_no_new_privileges() -> Result<()> {
        let labels = run_sequence(&hardened_spec(true)?)?;
        assert_eq!(
            labels,
            vec![
                "mount /proc/kcore",
                "mount /proc",
                "mount /proc",
                "mount /",
                "mount /",
                "hostname box",
                "rlimit",
                "scheduler",
                "ioprio 2 4",
                "caps Bounding",
                "keepcaps true",
                "groups 1",
                "setid 1000 1000",
                "caps Effective",
                "caps Permitted",
                "caps Inheritable",
                "caps Ambient",
                "keepcaps false",
                "nnp",
                "seccomp",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_seccomp_before_capability_drop_without_no_new_privileges() -> Result<()> {
        let labels = run_sequence(&hardened_spec(false)?)?;
        let seccomp = labels.iter().position(|l| l == "seccomp").expect("seccomp");
        let bounding = labels.iter().position(|l| l == "caps Bounding").expect("bounding");
        assert!(seccomp < bounding);
        assert!(!labels.contains(&"nnp".to_string()));
        Ok(())
    }

    #[test]
    fn test_masked_paths_before_readonly_ancestor() -> Result<()> {
        let labels = run_sequence(&hardened_spec(true)?)?;
        let masked = labels.iter().position(|l| l == "mount /proc/kcore").expect("masked");
        let readonly = labels.iter().position(|l| l == "mount /proc").expect("readonly");
        assert!(masked < readonly);
        Ok(())
    }

    #[test]
    fn test_setgroups_denied_with_groups_fails() -> Result<()> {
        let spec = hardened_spec(true)?;
        let syscall = TestHelperSyscall::default();
        let process = spec.process().as_ref().expect("process");
        assert!(matches!(
            set_user(process, &syscall, true),
            Err(InitProcessError::SetGroupsDenied)
        ));
        assert!(!syscall
            .get_calls()
            .iter()
            .any(|c| matches!(c, Call::SetId(..))));
        Ok(())
    }

    #[test]
    fn test_root_user_does_not_keep_caps() -> Result<()> {
        let process = ProcessBuilder::default()
            .user(UserBuilder::default().uid(0u32).gid(0u32).build()?)
            .build()?;
        let syscall = TestHelperSyscall::default();
        set_user(&process, &syscall, false)?;
        assert!(!syscall
            .get_calls()
            .iter()
            .any(|c| matches!(c, Call::KeepCapabilities(_))));
        Ok(())
    }

    #[test]
    fn test_set_id_failure_is_reported() -> Result<()> {
        let spec = hardened_spec(true)?;
        let syscall = TestHelperSyscall::default();
        syscall.set_ret_err(ArgName::SetId, || {
            SyscallError::Nix(nix::errno::Errno::EPERM)
        });
        let process = spec.process().as_ref().expect("process");
        assert!(matches!(
            set_user(process, &syscall, false),
            Err(InitProcessError::SetId { uid: 1000, gid: 1000, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_sched_attr() -> Result<()> {
        let scheduler = SchedulerBuilder::default()
            .policy(LinuxSchedulerPolicy::SchedFifo)
            .priority(10)
            .flags(vec![
                LinuxSchedulerFlag::SchedResetOnFork,
                LinuxSchedulerFlag::SchedFlagKeepParams,
            ])
            .build()?;
        let attr = sched_attr(&scheduler);
        assert_eq!(attr.sched_policy, 1);
        assert_eq!(attr.sched_priority, 10);
        assert_eq!(attr.sched_flags, 0x11);
        assert_eq!(attr.sched_nice, 0);
        assert_eq!(attr.size as usize, mem::size_of::<SchedAttr>());
        Ok(())
    }

    #[test]
    fn test_exec_missing_executable() -> Result<()> {
        let process = ProcessBuilder::default()
            .args(vec!["burrow-no-such-binary".to_string()])
            .env(vec!["PATH=/nonexistent".to_string()])
            .cwd("")
            .build()?;
        assert!(matches!(
            exec_process(&process),
            Err(InitProcessError::ExecutableNotFound(name)) if name == "burrow-no-such-binary"
        ));
        Ok(())
    }
}
