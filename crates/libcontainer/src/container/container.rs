use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use procfs::process::{ProcState, Process};

use crate::config::BurrowConfig;
use crate::container::lock::ContainerLock;
use crate::container::{ContainerStatus, State};
use crate::error::LibcontainerError;

/// Structure representing the container data
#[derive(Debug, Clone)]
pub struct Container {
    // State of the container
    pub state: State,
    // Directory holding state.json, c.lock and container.sock
    pub root: PathBuf,
}

impl Container {
    pub fn new(
        container_id: &str,
        status: ContainerStatus,
        pid: Option<i32>,
        bundle: &Path,
        container_root: &Path,
    ) -> Self {
        Self {
            state: State::new(container_id, status, pid, bundle.to_path_buf()),
            root: container_root.to_path_buf(),
        }
    }

    /// Reads the persisted state without probing the process. Use
    /// `get_state` for anything reported to a caller.
    pub fn load(container_root: PathBuf) -> Result<Self, LibcontainerError> {
        if !container_root.exists() {
            return Err(LibcontainerError::NoDirectory);
        }
        let state = State::load(&container_root)?;
        Ok(Self {
            state,
            root: container_root,
        })
    }

    pub fn save(&self) -> Result<(), LibcontainerError> {
        tracing::debug!(root = ?self.root, status = %self.state.status, "save container state");
        self.state.save(&self.root)?;
        Ok(())
    }

    pub fn refresh_state(&mut self) -> Result<&mut Self, LibcontainerError> {
        self.state = State::load(&self.root)?;
        Ok(self)
    }

    /// Runs `f` holding the container lock, on state freshly reloaded
    /// under that lock. The lock is released on every exit path.
    pub fn with_lock<T, F>(&mut self, f: F) -> Result<T, LibcontainerError>
    where
        F: FnOnce(&mut Self) -> Result<T, LibcontainerError>,
    {
        let _lock = ContainerLock::acquire(&self.root)?;
        self.refresh_state()?;
        f(self)
    }

    /// Returns the current state, first reconciling a dead primary
    /// process into `Stopped`. The correction is persisted once; later
    /// calls find `Stopped` and leave the file alone.
    pub fn get_state(&mut self) -> Result<&State, LibcontainerError> {
        self.with_lock(|c| {
            if c.refresh_status() {
                c.save()?;
            }
            Ok(())
        })?;
        Ok(&self.state)
    }

    /// Marks the container `Stopped` if its process is gone. Returns
    /// whether the status changed.
    pub(crate) fn refresh_status(&mut self) -> bool {
        if self.state.pid == 0 || self.status() == ContainerStatus::Stopped {
            return false;
        }
        if is_alive(self.state.pid) {
            return false;
        }
        tracing::debug!(id = self.id(), pid = self.state.pid, "container process is gone");
        self.set_status(ContainerStatus::Stopped);
        true
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn can_start(&self) -> bool {
        self.state.status.can_start()
    }

    pub fn can_kill(&self) -> bool {
        self.state.status.can_kill()
    }

    pub fn can_delete(&self) -> bool {
        self.state.status.can_delete()
    }

    pub fn bundle(&self) -> &PathBuf {
        &self.state.bundle
    }

    pub fn pid(&self) -> Option<Pid> {
        match self.state.pid {
            0 => None,
            pid => Some(Pid::from_raw(pid)),
        }
    }

    pub fn set_pid(&mut self, pid: i32) -> &mut Self {
        self.state.pid = pid;
        self
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.state.created
    }

    pub fn creator(&self) -> Option<u32> {
        self.state.creator
    }

    pub fn set_creator(&mut self, uid: u32) -> &mut Self {
        self.state.creator = Some(uid);
        self
    }

    pub fn status(&self) -> ContainerStatus {
        self.state.status
    }

    pub fn set_status(&mut self, status: ContainerStatus) -> &mut Self {
        if status == ContainerStatus::Created && self.state.created.is_none() {
            self.state.created = Some(Utc::now());
        }
        self.state.status = status;
        self
    }

    pub fn config(&self) -> Result<BurrowConfig, LibcontainerError> {
        Ok(BurrowConfig::load(&self.root)?)
    }
}

/// A pid counts as alive while it can be signalled and is not a zombie.
fn is_alive(pid: i32) -> bool {
    match signal::kill(Pid::from_raw(pid), None) {
        Err(Errno::ESRCH) => return false,
        Err(err) => tracing::debug!(pid, %err, "liveness signal failed, checking procfs"),
        Ok(()) => {}
    }

    match Process::new(pid).and_then(|p| p.stat()).map(|s| s.state()) {
        Ok(Ok(ProcState::Zombie | ProcState::Dead)) => false,
        Ok(_) => true,
        Err(_) => false,
    }
}
