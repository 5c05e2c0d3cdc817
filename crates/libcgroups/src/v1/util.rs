use std::{collections::HashMap, path::PathBuf};

use procfs::process::{MountInfo, Process};
use procfs::ProcError;

use super::{ControllerType, CONTROLLERS};

#[derive(thiserror::Error, Debug)]
pub enum V1MountPointError {
    #[error("failed to read process info from /proc/self: {0}")]
    ReadSelf(ProcError),
    #[error("failed to get mountinfo: {0}")]
    MountInfo(ProcError),
    #[error("could not find mountpoint for {subsystem}")]
    NotFound { subsystem: ControllerType },
}

fn cgroup_mounts() -> Result<Vec<MountInfo>, V1MountPointError> {
    Ok(Process::myself()
        .map_err(V1MountPointError::ReadSelf)?
        .mountinfo()
        .map_err(V1MountPointError::MountInfo)?
        .into_iter()
        .filter(|m| m.fs_type == "cgroup")
        .collect())
}

/// List the mount points of all currently supported cgroup subsystems.
pub fn list_supported_mount_points() -> Result<HashMap<ControllerType, PathBuf>, V1MountPointError>
{
    let mounts = cgroup_mounts()?;
    let mount_points: Vec<PathBuf> = mounts.into_iter().map(|m| m.mount_point).collect();

    let mut found = HashMap::with_capacity(CONTROLLERS.len());
    for controller in CONTROLLERS {
        if let Some(mount_point) = find_mount_point(&mount_points, controller) {
            found.insert(*controller, mount_point);
        }
    }

    Ok(found)
}

pub fn get_subsystem_mount_point(subsystem: &ControllerType) -> Result<PathBuf, V1MountPointError> {
    let mount_points: Vec<PathBuf> = cgroup_mounts()?.into_iter().map(|m| m.mount_point).collect();
    find_mount_point(&mount_points, subsystem)
        .ok_or(V1MountPointError::NotFound { subsystem: *subsystem })
}

/// Picks the mount point of `subsystem`. Some distributions co-mount
/// `cpu,cpuacct` and `net_cls,net_prio` in a single directory.
fn find_mount_point(mount_points: &[PathBuf], subsystem: &ControllerType) -> Option<PathBuf> {
    let name = subsystem.as_ref();
    let candidates: &[&str] = match subsystem {
        ControllerType::Cpu => &["cpu,cpuacct", "cpuacct,cpu", "cpu"],
        ControllerType::CpuAcct => &["cpu,cpuacct", "cpuacct,cpu", "cpuacct"],
        ControllerType::NetworkClassifier => &["net_cls,net_prio", "net_prio,net_cls", "net_cls"],
        ControllerType::NetworkPriority => &["net_cls,net_prio", "net_prio,net_cls", "net_prio"],
        _ => std::slice::from_ref(&name),
    };

    candidates.iter().find_map(|candidate| {
        mount_points
            .iter()
            .find(|m| m.file_name().map(|f| f == *candidate).unwrap_or(false))
            .cloned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_mount_point_handles_comounts() {
        let mounts = vec![
            PathBuf::from("/sys/fs/cgroup/cpu,cpuacct"),
            PathBuf::from("/sys/fs/cgroup/net_cls,net_prio"),
            PathBuf::from("/sys/fs/cgroup/memory"),
            PathBuf::from("/sys/fs/cgroup/cpuset"),
        ];

        assert_eq!(
            find_mount_point(&mounts, &ControllerType::Cpu),
            Some(PathBuf::from("/sys/fs/cgroup/cpu,cpuacct"))
        );
        assert_eq!(
            find_mount_point(&mounts, &ControllerType::CpuAcct),
            Some(PathBuf::from("/sys/fs/cgroup/cpu,cpuacct"))
        );
        assert_eq!(
            find_mount_point(&mounts, &ControllerType::NetworkPriority),
            Some(PathBuf::from("/sys/fs/cgroup/net_cls,net_prio"))
        );
        assert_eq!(
            find_mount_point(&mounts, &ControllerType::CpuSet),
            Some(PathBuf::from("/sys/fs/cgroup/cpuset"))
        );
        assert_eq!(find_mount_point(&mounts, &ControllerType::Pids), None);
    }
}
