use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Component::RootDir, Path, PathBuf},
    time::Duration,
};

use nix::unistd::Pid;

use super::util::{self, V2UtilError, CGROUP_KILL, CGROUP_SUBTREE_CONTROL};
use crate::common::{
    self, CgroupManager, JoinSafelyError, PathBufExt, WrapIoResult, WrappedIoError, CGROUP_PROCS,
};

#[derive(thiserror::Error, Debug)]
pub enum V2ManagerError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("while joining paths: {0}")]
    JoinSafely(#[from] JoinSafelyError),
    #[error(transparent)]
    V2Util(#[from] V2UtilError),
}

pub struct Manager {
    root_path: PathBuf,
    cgroup_path: PathBuf,
    full_path: PathBuf,
}

impl Manager {
    /// Constructs a new cgroup manager with root path being the mount point
    /// of a cgroup v2 fs and cgroup path being a relative path from the root
    pub fn new(root_path: PathBuf, cgroup_path: PathBuf) -> Result<Self, V2ManagerError> {
        let full_path = root_path.join_safely(&cgroup_path)?;

        Ok(Self {
            root_path,
            cgroup_path,
            full_path,
        })
    }

    pub fn full_path(&self) -> &Path {
        &self.full_path
    }

    fn create_unified_cgroup(&self, pid: Pid) -> Result<(), V2ManagerError> {
        let controllers: Vec<String> = util::get_available_controllers(&self.root_path)?
            .iter()
            .map(|c| format!("+{c}"))
            .collect();

        Self::write_controllers(&self.root_path, &controllers)?;

        let mut current_path = self.root_path.clone();
        let mut components = self
            .cgroup_path
            .components()
            .filter(|c| c.ne(&RootDir))
            .peekable();
        while let Some(component) = components.next() {
            current_path = current_path.join(component);
            if !current_path.exists() {
                fs::create_dir(&current_path).wrap_create_dir(&current_path)?;
                fs::set_permissions(&current_path, fs::Permissions::from_mode(0o755))
                    .wrap_other(&current_path)?;
            }

            // the leaf must not enable controllers for its children, otherwise
            // the no internal process rule rejects the write to cgroup.procs
            if components.peek().is_some() {
                Self::write_controllers(&current_path, &controllers)?;
            }
        }

        common::write_cgroup_file(self.full_path.join(CGROUP_PROCS), pid)?;
        Ok(())
    }

    fn write_controllers(path: &Path, controllers: &[String]) -> Result<(), WrappedIoError> {
        for controller in controllers {
            common::write_cgroup_file_str(path.join(CGROUP_SUBTREE_CONTROL), controller)?;
        }

        Ok(())
    }
}

impl CgroupManager for Manager {
    type Error = V2ManagerError;

    #[tracing::instrument(level = "trace", skip(self), fields(cgroup = ?self.full_path))]
    fn add_task(&self, pid: Pid) -> Result<(), Self::Error> {
        self.create_unified_cgroup(pid)?;
        Ok(())
    }

    fn remove(&self) -> Result<(), Self::Error> {
        if !self.full_path.exists() {
            tracing::debug!(path = ?self.full_path, "cgroup already gone");
            return Ok(());
        }

        tracing::debug!("remove cgroup {:?}", self.full_path);
        let kill_file = self.full_path.join(CGROUP_KILL);
        if kill_file.exists() {
            common::write_cgroup_file_str(&kill_file, "1")?;
        } else {
            common::kill_procs(&self.full_path)?;
        }

        common::delete_with_retry(&self.full_path, 4, Duration::from_millis(100))?;
        Ok(())
    }

    fn get_all_pids(&self) -> Result<Vec<Pid>, Self::Error> {
        Ok(common::get_all_pids(&self.full_path)?)
    }
}
