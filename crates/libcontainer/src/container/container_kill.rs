use libcgroups::common::{create_cgroup_manager, CgroupConfig, CgroupManager};
use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;

use super::{Container, ContainerStatus};
use crate::error::LibcontainerError;
use crate::signal::Signal;

impl Container {
    /// Sends the specified signal to the container init process
    ///
    /// # Example
    ///
    /// ```no_run
    /// use libcontainer::container::builder::ContainerBuilder;
    /// use libcontainer::syscall::syscall::SyscallType;
    /// use nix::sys::signal::Signal;
    ///
    /// # fn main() -> anyhow::Result<()> {
    /// let mut container = ContainerBuilder::new(
    ///     "74f1a4cb3801".to_owned(),
    ///     SyscallType::default(),
    /// )
    /// .as_init("/var/run/docker/bundle")
    /// .build()?;
    ///
    /// container.kill(Signal::SIGKILL, false)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn kill<S: Into<Signal>>(&mut self, signal: S, all: bool) -> Result<(), LibcontainerError> {
        let signal = signal.into();
        // The saved status decides; a process that died since is handled by
        // send_signal.
        self.with_lock(|c| {
            // just like runc, allow kill --all even if the container is stopped
            if c.can_kill() || (all && c.status() == ContainerStatus::Stopped) {
                c.do_kill(signal, all)
            } else {
                tracing::error!(id = ?c.id(), status = ?c.status(), "cannot kill container due to incorrect state");
                Err(LibcontainerError::IncorrectStatus(c.status()))
            }
        })
    }

    pub(crate) fn do_kill(&self, signal: Signal, all: bool) -> Result<(), LibcontainerError> {
        if all && self.config()?.manage_cgroup {
            self.kill_all_processes(signal)
        } else {
            self.kill_one_process(signal)
        }
    }

    fn kill_one_process(&self, signal: Signal) -> Result<(), LibcontainerError> {
        match self.pid() {
            Some(pid) => send_signal(pid, signal),
            None => {
                tracing::debug!(id = ?self.id(), "no process to signal");
                Ok(())
            }
        }
    }

    fn kill_all_processes(&self, signal: Signal) -> Result<(), LibcontainerError> {
        let config = self.config()?;
        let cmanager = create_cgroup_manager(&CgroupConfig {
            cgroup_path: config.cgroup_path,
            container_id: self.id().to_owned(),
        })?;
        let pids = cmanager.get_all_pids()?;
        pids.into_iter().try_for_each(|pid| send_signal(pid, signal))
    }
}

/// A process that is already gone counts as signalled.
fn send_signal(pid: Pid, signal: Signal) -> Result<(), LibcontainerError> {
    let signal = signal.into_raw();
    tracing::debug!(%pid, ?signal, "kill");
    match signal::kill(pid, signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(err) => {
            tracing::error!(%pid, ?signal, %err, "failed to send signal");
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use anyhow::Result;
    use nix::sys::wait::{waitpid, WaitStatus};
    use nix::unistd::{fork, pause, ForkResult};
    use serial_test::serial;

    use super::*;
    use crate::config::BurrowConfig;
    use crate::container::State;

    #[test]
    fn test_kill_rejects_wrong_status() -> Result<()> {
        for status in [ContainerStatus::Creating, ContainerStatus::Stopped] {
            let tmp = tempfile::tempdir()?;
            let mut container = Container::new("c1", status, None, Path::new("/b"), tmp.path());
            container.save()?;
            assert!(matches!(
                container.kill(nix::sys::signal::Signal::SIGTERM, false),
                Err(LibcontainerError::IncorrectStatus(s)) if s == status
            ));
        }
        Ok(())
    }

    #[test]
    fn test_kill_all_when_stopped_without_cgroup() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut container =
            Container::new("c1", ContainerStatus::Stopped, None, Path::new("/b"), tmp.path());
        container.save()?;
        BurrowConfig::default().save(tmp.path())?;
        container.kill(nix::sys::signal::Signal::SIGKILL, true)?;
        Ok(())
    }

    #[test]
    #[serial]
    fn test_kill_delivers_signal() -> Result<()> {
        let child = match unsafe { fork()? } {
            ForkResult::Child => {
                pause();
                unsafe { libc::_exit(0) }
            }
            ForkResult::Parent { child } => child,
        };

        let tmp = tempfile::tempdir()?;
        let mut container = Container::new(
            "c1",
            ContainerStatus::Running,
            Some(child.as_raw()),
            Path::new("/b"),
            tmp.path(),
        );
        container.save()?;
        container.kill(nix::sys::signal::Signal::SIGKILL, false)?;

        assert_eq!(
            waitpid(child, None)?,
            WaitStatus::Signaled(child, nix::sys::signal::Signal::SIGKILL, false)
        );
        // kill leaves the status for the liveness check to correct
        assert_eq!(State::load(tmp.path())?.status, ContainerStatus::Running);
        Ok(())
    }

    #[test]
    #[serial]
    fn test_kill_ignores_missing_process() -> Result<()> {
        let child = match unsafe { fork()? } {
            ForkResult::Child => unsafe { libc::_exit(0) },
            ForkResult::Parent { child } => child,
        };
        waitpid(child, None)?;

        assert!(send_signal(child, nix::sys::signal::Signal::SIGTERM.into()).is_ok());
        Ok(())
    }

    #[test]
    #[serial]
    fn test_kill_running_with_dead_process() -> Result<()> {
        let child = match unsafe { fork()? } {
            ForkResult::Child => unsafe { libc::_exit(0) },
            ForkResult::Parent { child } => child,
        };
        waitpid(child, None)?;

        let tmp = tempfile::tempdir()?;
        let mut container = Container::new(
            "c1",
            ContainerStatus::Running,
            Some(child.as_raw()),
            Path::new("/b"),
            tmp.path(),
        );
        container.save()?;
        container.kill(nix::sys::signal::Signal::SIGTERM, false)?;
        Ok(())
    }
}
