use std::fs;

use libcgroups::common::{create_cgroup_manager, CgroupConfig, CgroupManager};
use nix::sys::signal;

use super::{Container, ContainerStatus};
use crate::config::BurrowConfig;
use crate::error::LibcontainerError;
use crate::hooks;

impl Container {
    /// Deletes the container
    ///
    /// # Example
    ///
    /// ```no_run
    /// use libcontainer::container::builder::ContainerBuilder;
    /// use libcontainer::syscall::syscall::SyscallType;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let mut container = ContainerBuilder::new(
    ///     "74f1a4cb3801".to_owned(),
    ///     SyscallType::default(),
    /// )
    /// .as_init("/var/run/docker/bundle")
    /// .build()?;
    ///
    /// container.delete(true)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn delete(&mut self, force: bool) -> Result<(), LibcontainerError> {
        self.with_lock(|c| c.delete_locked(force))
    }

    fn delete_locked(&mut self, force: bool) -> Result<(), LibcontainerError> {
        if self.refresh_status() {
            self.save()?;
        }

        // a crashed create can leave no config behind
        let config = match self.config() {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!(%err, id = ?self.id(), "container has no saved config");
                None
            }
        };

        if force && !self.can_delete() {
            if self.pid().is_some() {
                self.force_kill(config.as_ref());
            }
            self.set_status(ContainerStatus::Stopped).save()?;
        }

        tracing::debug!(id = ?self.id(), status = ?self.status(), "delete container");
        if !self.can_delete() {
            tracing::error!(id = ?self.id(), status = ?self.status(), "cannot delete container due to incorrect state");
            return Err(LibcontainerError::IncorrectStatus(self.status()));
        }

        if let Some(config) = config.as_ref().filter(|c| c.manage_cgroup) {
            match self.remove_cgroup(config) {
                Ok(()) => {}
                Err(err) if force => {
                    tracing::warn!(%err, id = ?self.id(), "failed to remove cgroup, deleting anyway");
                }
                Err(err) => return Err(err),
            }
        }

        tracing::debug!(root = ?self.root, "remove container dir");
        fs::remove_dir_all(&self.root).map_err(|err| {
            tracing::error!(root = ?self.root, %err, "failed to remove container dir");
            LibcontainerError::OtherIO(err)
        })?;

        if let Some(hooks) = config.as_ref().and_then(|c| c.hooks.as_ref()) {
            if let Err(err) = hooks::run_hooks(hooks.poststop().as_ref(), &self.state) {
                tracing::warn!(%err, "failed to run poststop hooks");
            }
        }

        Ok(())
    }

    // Best effort. The primary process is always signalled as well, since
    // a cgroup that cannot be read may not list it.
    fn force_kill(&self, config: Option<&BurrowConfig>) {
        let sigkill = signal::Signal::SIGKILL;
        if config.map(|c| c.manage_cgroup).unwrap_or(false) {
            if let Err(err) = self.do_kill(sigkill.into(), true) {
                tracing::warn!(%err, id = ?self.id(), "failed to kill cgroup members");
            }
        }
        if let Err(err) = self.do_kill(sigkill.into(), false) {
            tracing::warn!(%err, id = ?self.id(), "failed to kill container process");
        }
    }

    pub(super) fn remove_cgroup(&self, config: &BurrowConfig) -> Result<(), LibcontainerError> {
        let cmanager = create_cgroup_manager(&CgroupConfig {
            cgroup_path: config.cgroup_path.clone(),
            container_id: self.id().to_owned(),
        })?;
        cmanager.remove().map_err(|err| {
            tracing::error!(cgroup_path = ?config.cgroup_path, %err, "failed to remove cgroup");
            err
        })?;
        Ok(())
    }
}
