use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use nix::unistd::Pid;

use super::{
    util::{self, V1MountPointError},
    ControllerType as CtrlType,
};
use crate::common::{
    self, clean_path, CgroupManager, JoinSafelyError, PathBufExt, WrapIoResult, WrappedIoError,
    CGROUP_PROCS,
};

#[derive(thiserror::Error, Debug)]
pub enum V1ManagerError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("mount point error: {0}")]
    MountPoint(#[from] V1MountPointError),
    #[error("while joining paths: {0}")]
    JoinSafely(#[from] JoinSafelyError),
    #[error("invalid cgroup path {0:?}")]
    InvalidPath(PathBuf),
    #[error("no cgroup subsystem is mounted")]
    NoSubsystems,
}

/// Places processes under a static path below every mounted v1 subsystem.
pub struct Manager {
    subsystems: HashMap<CtrlType, PathBuf>,
}

/// A static path must name something and must stay below the subsystem root.
pub fn validate_cgroup_path(path: &Path) -> bool {
    if path.as_os_str().is_empty() {
        return false;
    }

    !clean_path(path).starts_with("..")
}

impl Manager {
    /// Constructs a new cgroup manager with cgroups_path being relative to the root of the subsystem
    pub fn new(cgroup_path: &Path) -> Result<Self, V1ManagerError> {
        let mount_points = util::list_supported_mount_points()?;
        Self::with_mount_points(mount_points, cgroup_path)
    }

    pub fn with_mount_points(
        mount_points: HashMap<CtrlType, PathBuf>,
        cgroup_path: &Path,
    ) -> Result<Self, V1ManagerError> {
        if !validate_cgroup_path(cgroup_path) {
            return Err(V1ManagerError::InvalidPath(cgroup_path.to_path_buf()));
        }

        if mount_points.is_empty() {
            return Err(V1ManagerError::NoSubsystems);
        }

        let mut subsystems = HashMap::with_capacity(mount_points.len());
        for (subsystem, mount_point) in mount_points {
            tracing::debug!(%subsystem, ?mount_point, "cgroup subsystem");
            subsystems.insert(subsystem, mount_point.join_safely(cgroup_path)?);
        }

        Ok(Manager { subsystems })
    }

    fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        let mut paths: Vec<&PathBuf> = self.subsystems.values().collect();
        paths.sort();
        paths.dedup();
        paths.into_iter()
    }
}

impl CgroupManager for Manager {
    type Error = V1ManagerError;

    fn add_task(&self, pid: Pid) -> Result<(), Self::Error> {
        for path in self.paths() {
            fs::create_dir_all(path).wrap_create_dir(path)?;
            common::write_cgroup_file(path.join(CGROUP_PROCS), pid)?;
        }

        Ok(())
    }

    fn remove(&self) -> Result<(), Self::Error> {
        for path in self.paths() {
            if path.exists() {
                tracing::debug!("remove cgroup {:?}", path);
                common::kill_procs(path)?;
                common::delete_with_retry(path, 4, Duration::from_millis(100))?;
            }
        }

        Ok(())
    }

    fn get_all_pids(&self) -> Result<Vec<Pid>, Self::Error> {
        let path = self
            .subsystems
            .get(&CtrlType::Pids)
            .or_else(|| self.subsystems.get(&CtrlType::Devices))
            .or_else(|| self.paths().next())
            .ok_or(V1ManagerError::NoSubsystems)?;
        Ok(common::get_all_pids(path)?)
    }
}
