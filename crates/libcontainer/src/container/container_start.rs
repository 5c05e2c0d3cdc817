use oci_spec::runtime::Spec;

use super::{Container, ContainerStatus};
use crate::container_socket::{ContainerSocket, CONTAINER_SOCKET};
use crate::error::LibcontainerError;
use crate::hooks;

impl Container {
    /// Starts a previously created container
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
    /// container.start()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn start(&mut self) -> Result<(), LibcontainerError> {
        self.with_lock(|c| c.start_locked())
    }

    pub(super) fn start_locked(&mut self) -> Result<(), LibcontainerError> {
        if self.refresh_status() {
            self.save()?;
        }

        if !self.can_start() {
            tracing::error!(status = ?self.status(), id = ?self.id(), "cannot start container due to incorrect state");
            return Err(LibcontainerError::IncorrectStatus(self.status()));
        }

        let spec = Spec::load(self.bundle().join("config.json"))?;
        let hooks = spec.hooks().as_ref();

        // prestart is deprecated in the runtime spec but still used by docker
        #[allow(deprecated)]
        hooks::run_hooks(hooks.and_then(|h| h.prestart().as_ref()), &self.state).map_err(
            |err| {
                tracing::error!(%err, "failed to run prestart hooks");
                err
            },
        )?;

        ContainerSocket::new(self.root.join(CONTAINER_SOCKET)).notify_container_start()?;

        if spec.process().is_none() {
            // the child runs its startContainer hooks and exits
            tracing::debug!(id = ?self.id(), "no process configured");
            self.set_status(ContainerStatus::Stopped).save()?;
            return Ok(());
        }

        self.set_status(ContainerStatus::Running).save()?;

        // poststart runs in the runtime namespace once the payload is started
        if let Err(err) = hooks::run_hooks(hooks.and_then(|h| h.poststart().as_ref()), &self.state)
        {
            tracing::warn!(%err, "failed to run poststart hooks");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use anyhow::Result;
    use oci_spec::runtime::{HookBuilder, HooksBuilder, SpecBuilder};
    use serial_test::serial;

    use super::*;
    use crate::container::State;
    use crate::container_socket::ContainerListener;

    #[test]
    fn test_start_rejects_wrong_status() -> Result<()> {
        for status in [
            ContainerStatus::Creating,
            ContainerStatus::Running,
            ContainerStatus::Stopped,
        ] {
            let tmp = tempfile::tempdir()?;
            // pid of this process keeps the liveness check from rewriting the status
            let pid = std::process::id() as i32;
            let mut container =
                Container::new("c1", status, Some(pid), Path::new("/absent"), tmp.path());
            container.save()?;

            let err = container.start().unwrap_err();
            assert!(matches!(err, LibcontainerError::IncorrectStatus(s) if s == status));
            assert_eq!(crate::container::State::load(tmp.path())?.status, status);
        }
        Ok(())
    }

    #[test]
    #[serial]
    fn test_start_without_listener_keeps_created() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bundle = tempfile::tempdir()?;
        SpecBuilder::default()
            .build()?
            .save(bundle.path().join("config.json"))?;

        let pid = std::process::id() as i32;
        let mut container = Container::new(
            "c1",
            ContainerStatus::Created,
            Some(pid),
            bundle.path(),
            tmp.path(),
        );
        container.save()?;

        assert!(matches!(
            container.start(),
            Err(LibcontainerError::ContainerSocket(_))
        ));
        assert_eq!(
            crate::container::State::load(tmp.path())?.status,
            ContainerStatus::Created
        );
        Ok(())
    }

    #[test]
    #[serial]
    fn test_start_notifies_and_persists_running_before_poststart() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bundle = tempfile::tempdir()?;
        let seen = bundle.path().join("seen");
        let on_disk = bundle.path().join("on_disk");
        let poststart = HookBuilder::default()
            .path("bash")
            .args(vec![
                String::from("bash"),
                String::from("-c"),
                format!(
                    "cat > {} && cp {} {}",
                    seen.display(),
                    State::file_path(tmp.path()).display(),
                    on_disk.display()
                ),
            ])
            .build()?;
        // the default spec carries a process
        SpecBuilder::default()
            .hooks(HooksBuilder::default().poststart(vec![poststart]).build()?)
            .build()?
            .save(bundle.path().join("config.json"))?;

        let pid = std::process::id() as i32;
        let mut container = Container::new(
            "c1",
            ContainerStatus::Created,
            Some(pid),
            bundle.path(),
            tmp.path(),
        );
        container.save()?;

        let listener = ContainerListener::new(&tmp.path().join(CONTAINER_SOCKET))?;
        let waiter = std::thread::spawn(move || listener.wait_for_container_start());

        container.start()?;
        waiter.join().expect("listener thread panicked")?;

        assert_eq!(container.status(), ContainerStatus::Running);
        assert_eq!(State::load(tmp.path())?.status, ContainerStatus::Running);
        let seen: State = serde_json::from_str(&std::fs::read_to_string(seen)?)?;
        assert_eq!(seen.status, ContainerStatus::Running);
        let on_disk: State = serde_json::from_str(&std::fs::read_to_string(on_disk)?)?;
        assert_eq!(on_disk.status, ContainerStatus::Running);
        Ok(())
    }
}
