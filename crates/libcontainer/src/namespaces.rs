//! Namespaces provide isolation of resources for processes at a kernel level.
//! The namespaces are: Mount (filesystem),
//! Process (processes in a namespace have two PIDs, one for the global PID,
//! which is used by the main system and the second one is for the child within the process tree),
//! Interprocess Communication (Control or communication between processes),
//! Network (which network devices can be seen by the processes in the namespace), User (User configs),
//! UTS (hostname and domain information, processes will think they're running on servers with different names),
//! Cgroup (Resource limits, execution priority etc.)
//!
//! Namespaces without a path are created by the clone flags of the container
//! process. Namespaces with a path are joined with setns.

use std::collections;
use std::os::fd::AsRawFd;
use std::path::Path;

use nix::fcntl;
use nix::sched::CloneFlags;
use nix::sys::stat;
use oci_spec::runtime::{LinuxNamespace, LinuxNamespaceType};

use crate::syscall::syscall::create_syscall;
use crate::syscall::{Syscall, SyscallError};

// user first, so the joined user namespace grants the rights to join the rest
static ORDERED_NAMESPACES: &[CloneFlags] = &[
    CloneFlags::CLONE_NEWUSER,
    CloneFlags::CLONE_NEWPID,
    CloneFlags::CLONE_NEWUTS,
    CloneFlags::CLONE_NEWIPC,
    CloneFlags::CLONE_NEWNET,
    CloneFlags::CLONE_NEWCGROUP,
    CloneFlags::CLONE_NEWNS,
];

#[derive(Debug, thiserror::Error)]
pub enum NamespaceError {
    #[error("unsupported namespace type: {0:?}")]
    Unsupported(LinuxNamespaceType),
    #[error("failed to open namespace {path:?}")]
    Open {
        path: std::path::PathBuf,
        source: nix::Error,
    },
    #[error("failed to enter {typ:?} namespace at {path:?}")]
    SetNs {
        typ: CloneFlags,
        path: std::path::PathBuf,
        source: SyscallError,
    },
}

type Result<T> = std::result::Result<T, NamespaceError>;

/// Holds information about namespaces
pub struct Namespaces {
    command: Box<dyn Syscall>,
    namespace_map: collections::HashMap<CloneFlags, LinuxNamespace>,
}

pub fn get_clone_flag(namespace_type: LinuxNamespaceType) -> Result<CloneFlags> {
    #[allow(unreachable_patterns)]
    match namespace_type {
        LinuxNamespaceType::User => Ok(CloneFlags::CLONE_NEWUSER),
        LinuxNamespaceType::Pid => Ok(CloneFlags::CLONE_NEWPID),
        LinuxNamespaceType::Uts => Ok(CloneFlags::CLONE_NEWUTS),
        LinuxNamespaceType::Ipc => Ok(CloneFlags::CLONE_NEWIPC),
        LinuxNamespaceType::Network => Ok(CloneFlags::CLONE_NEWNET),
        LinuxNamespaceType::Cgroup => Ok(CloneFlags::CLONE_NEWCGROUP),
        LinuxNamespaceType::Mount => Ok(CloneFlags::CLONE_NEWNS),
        other => Err(NamespaceError::Unsupported(other)),
    }
}

impl TryFrom<Option<&Vec<LinuxNamespace>>> for Namespaces {
    type Error = NamespaceError;

    fn try_from(namespaces: Option<&Vec<LinuxNamespace>>) -> Result<Self> {
        let namespace_map = namespaces
            .map(|ns| ns.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|ns| get_clone_flag(ns.typ()).map(|flag| (flag, ns.clone())))
            .collect::<Result<collections::HashMap<_, _>>>()?;

        Ok(Namespaces {
            command: create_syscall(),
            namespace_map,
        })
    }
}

impl Namespaces {
    pub fn with_syscall(mut self, command: Box<dyn Syscall>) -> Self {
        self.command = command;
        self
    }

    /// Flags for the namespaces the container process creates itself.
    pub fn clone_flags(&self) -> CloneFlags {
        self.namespace_map
            .iter()
            .filter(|(_, ns)| ns.path().is_none())
            .fold(CloneFlags::empty(), |flags, (flag, _)| flags | *flag)
    }

    /// Joins every namespace that has a path and passes `filter`, in
    /// dependency order.
    pub fn join_namespaces<F: Fn(CloneFlags) -> bool>(&self, filter: F) -> Result<()> {
        let to_enter = ORDERED_NAMESPACES
            .iter()
            .filter(|c| filter(**c))
            .filter_map(|c| self.namespace_map.get_key_value(c))
            .filter_map(|(flag, ns)| ns.path().as_deref().map(|path| (*flag, path)));

        for (ns_type, path) in to_enter {
            self.set_ns(ns_type, path)?;
        }
        Ok(())
    }

    fn set_ns(&self, ns_type: CloneFlags, path: &Path) -> Result<()> {
        tracing::debug!(?ns_type, ?path, "joining namespace");
        let fd = fcntl::open(path, fcntl::OFlag::O_CLOEXEC, stat::Mode::empty()).map_err(
            |err| {
                tracing::error!(?err, ?path, "failed to open namespace file");
                NamespaceError::Open {
                    path: path.to_owned(),
                    source: err,
                }
            },
        )?;
        // SAFETY: fd was just opened and is owned here
        let fd = unsafe { <std::os::fd::OwnedFd as std::os::fd::FromRawFd>::from_raw_fd(fd) };
        self.command
            .set_ns(fd.as_raw_fd(), ns_type)
            .map_err(|err| {
                tracing::error!(?err, ?ns_type, ?path, "failed to set namespace");
                NamespaceError::SetNs {
                    typ: ns_type,
                    path: path.to_owned(),
                    source: err,
                }
            })
    }

    pub fn get(&self, k: LinuxNamespaceType) -> Option<&LinuxNamespace> {
        get_clone_flag(k)
            .ok()
            .and_then(|flag| self.namespace_map.get(&flag))
    }

    /// True when the namespace is requested and created fresh.
    pub fn is_new(&self, k: LinuxNamespaceType) -> bool {
        self.get(k).map(|ns| ns.path().is_none()).unwrap_or(false)
    }
}
