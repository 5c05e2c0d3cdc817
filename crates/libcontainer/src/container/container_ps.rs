use libcgroups::common::{create_cgroup_manager, CgroupConfig, CgroupManager};
use nix::unistd::Pid;

use super::{Container, ContainerStatus};
use crate::error::LibcontainerError;

impl Container {
    /// Lists the processes that belong to the container. A managed cgroup
    /// is authoritative; otherwise only the primary process is known.
    pub fn processes(&mut self) -> Result<Vec<Pid>, LibcontainerError> {
        self.with_lock(|c| {
            if c.refresh_status() {
                c.save()?;
            }

            let config = c.config()?;
            if !config.manage_cgroup {
                return Ok(c.alive_pid().into_iter().collect());
            }

            let cmanager = create_cgroup_manager(&CgroupConfig {
                cgroup_path: config.cgroup_path,
                container_id: c.id().to_owned(),
            })?;
            let mut pids = cmanager.get_all_pids()?;
            pids.sort();
            Ok(pids)
        })
    }

    fn alive_pid(&self) -> Option<Pid> {
        match self.status() {
            ContainerStatus::Stopped => None,
            _ => self.pid(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use anyhow::Result;
    use nix::sys::wait::waitpid;
    use nix::unistd::{fork, pause, ForkResult};
    use serial_test::serial;

    use super::*;
    use crate::config::BurrowConfig;

    fn unmanaged(tmp: &Path, status: ContainerStatus, pid: Option<i32>) -> Result<Container> {
        let container = Container::new("c1", status, pid, Path::new("/b"), tmp);
        container.save()?;
        BurrowConfig {
            hooks: None,
            cgroup_path: None,
            manage_cgroup: false,
        }
        .save(tmp)?;
        Ok(container)
    }

    #[test]
    #[serial]
    fn test_processes_without_cgroup_is_primary_pid() -> Result<()> {
        let child = match unsafe { fork()? } {
            ForkResult::Child => {
                pause();
                unsafe { libc::_exit(0) }
            }
            ForkResult::Parent { child } => child,
        };
        let tmp = tempfile::tempdir()?;
        let mut container = unmanaged(tmp.path(), ContainerStatus::Running, Some(child.as_raw()))?;

        let pids = container.processes();
        nix::sys::signal::kill(child, nix::sys::signal::Signal::SIGKILL)?;
        waitpid(child, None)?;
        assert_eq!(pids?, vec![child]);
        Ok(())
    }

    #[test]
    fn test_processes_of_dead_container_is_empty() -> Result<()> {
        let child = match unsafe { fork()? } {
            ForkResult::Child => unsafe { libc::_exit(0) },
            ForkResult::Parent { child } => child,
        };
        waitpid(child, None)?;
        let tmp = tempfile::tempdir()?;
        let mut container = unmanaged(tmp.path(), ContainerStatus::Running, Some(child.as_raw()))?;

        assert!(container.processes()?.is_empty());
        // the dead process was reconciled on the way
        assert_eq!(
            crate::container::State::load(tmp.path())?.status,
            ContainerStatus::Stopped
        );
        Ok(())
    }
}
