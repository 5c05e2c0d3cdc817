use std::ffi::OsString;
use std::fs;
use std::os::fd::AsRawFd;
use std::path::PathBuf;

use libcgroups::common::CgroupConfig;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::{self, Pid};
use oci_spec::runtime::Spec;

use super::{Container, ContainerStatus};
use crate::config::BurrowConfig;
use crate::error::LibcontainerError;
use crate::hooks;
use crate::process::args::ContainerArgs;
use crate::process::container_main_process::container_main_process;
use crate::syscall::syscall::SyscallType;
use crate::tty;
use crate::user_ns::UserNamespaceConfig;
use crate::utils;

/// Drives one `create` once the container directory exists and is locked.
pub(super) struct ContainerBuilderImpl<'a> {
    /// Interface to operating system primitives
    pub syscall: SyscallType,
    /// OCI compliant runtime spec
    pub spec: &'a Spec,
    /// Container being created, still in `Creating`
    pub container: &'a mut Container,
    /// Parts of the spec later operations need
    pub config: BurrowConfig,
    /// File which will be used to communicate the pid of the
    /// container process to the higher level runtime
    pub pid_file: Option<PathBuf>,
    /// Socket to send the pty master to, when the process has a terminal
    pub console_socket: Option<PathBuf>,
    /// Id mappings for a new user namespace
    pub user_ns_config: Option<UserNamespaceConfig>,
    /// Arguments for re-entering the runtime binary
    pub reexec_args: Vec<OsString>,
}

impl<'a> ContainerBuilderImpl<'a> {
    /// Runs the create sequence. On failure the child is killed and
    /// everything written under the container directory is removed.
    pub(super) fn create(mut self) -> Result<(), LibcontainerError> {
        let mut child = None;
        match self.run_container(&mut child) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!(id = self.container.id(), %err, "failed to create container");
                self.cleanup_container(child);
                Err(err)
            }
        }
    }

    fn run_container(&mut self, child: &mut Option<Pid>) -> Result<(), LibcontainerError> {
        let process = self.spec.process().as_ref();

        self.container.save()?;
        self.config.save(&self.container.root).map_err(|err| {
            tracing::error!(root = ?self.container.root, %err, "failed to save config");
            err
        })?;

        // the child inherits oom_score_adj across clone and exec
        if let Some(oom_score_adj) = process.and_then(|p| p.oom_score_adj()) {
            tracing::debug!(oom_score_adj, "set oom score");
            fs::write("/proc/self/oom_score_adj", oom_score_adj.to_string()).map_err(|err| {
                tracing::error!(%err, "failed to write /proc/self/oom_score_adj");
                LibcontainerError::OtherIO(err)
            })?;
        }

        let console = self
            .console_socket
            .as_deref()
            .map(tty::connect_console_socket)
            .transpose()?;

        let cgroup_config = self.config.manage_cgroup.then(|| CgroupConfig {
            cgroup_path: self.config.cgroup_path.clone(),
            container_id: self.container.id().to_owned(),
        });
        let args = ContainerArgs {
            syscall: self.syscall,
            spec: self.spec,
            console_socket: console.as_ref().map(|fd| fd.as_raw_fd()),
            user_ns_config: self.user_ns_config.take(),
            cgroup_config,
            reexec_args: self.reexec_args.clone(),
        };

        let pid = container_main_process(&args)?;
        *child = Some(pid);
        // the child holds its own copy of the console socket now
        drop(console);

        self.container.set_pid(pid.as_raw());
        if let Some(hooks) = self.spec.hooks() {
            hooks::run_hooks(hooks.create_runtime().as_ref(), &self.container.state)?;
            hooks::run_hooks(hooks.create_container().as_ref(), &self.container.state)?;
        }

        self.container
            .set_status(ContainerStatus::Created)
            .set_creator(unistd::getuid().as_raw())
            .save()?;

        if let Some(pid_file) = &self.pid_file {
            utils::write_file_atomic(pid_file, pid.to_string()).map_err(|err| {
                tracing::error!(?pid_file, %err, "failed to write pid file");
                LibcontainerError::OtherIO(err)
            })?;
        }

        tracing::debug!(id = self.container.id(), %pid, "container created");
        Ok(())
    }

    fn cleanup_container(&self, child: Option<Pid>) {
        if let Some(pid) = child {
            if let Err(err) = signal::kill(pid, Signal::SIGKILL) {
                tracing::warn!(%pid, %err, "failed to kill container process");
            }
            let _ = waitpid(pid, None);
        }

        if self.config.manage_cgroup {
            if let Err(err) = self.container.remove_cgroup(&self.config) {
                tracing::warn!(%err, "failed to remove cgroup");
            }
        }

        if let Err(err) = fs::remove_dir_all(&self.container.root) {
            tracing::warn!(root = ?self.container.root, %err, "failed to remove container dir");
        }
    }
}

