use std::collections::BTreeSet;
use std::fs::{canonicalize, create_dir_all, OpenOptions};
use std::path::{Path, PathBuf};

use libcgroups::common::{CgroupSetup, DEFAULT_CGROUP_ROOT};
use nix::mount::MsFlags;
use oci_spec::runtime::{Mount as SpecMount, MountBuilder as SpecMountBuilder};
use procfs::process::{MountInfo, MountOptFields, Process};

use super::utils::{is_bind_mount, parse_mount, MountOptionConfig};
use crate::syscall::linux::AT_RECURSIVE;
use crate::syscall::syscall::create_syscall;
use crate::syscall::{Syscall, SyscallError};
use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("no source in mount spec")]
    NoSource,
    #[error("failed to prepare mount target {path:?}")]
    Target {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to resolve mount source {path:?}")]
    Source {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to mount {destination:?}")]
    Syscall {
        destination: PathBuf,
        source: SyscallError,
    },
    #[error("failed to read mount information")]
    Procfs(#[from] procfs::ProcError),
    #[error("failed to determine cgroup setup")]
    CgroupSetup(#[from] libcgroups::common::GetCgroupSetupError),
    #[error("failed to list cgroup subsystems")]
    CgroupMountPoints(#[from] libcgroups::v1::util::V1MountPointError),
    #[error("failed to build mount entry")]
    Spec(#[from] oci_spec::OciSpecError),
    #[error("no mount point contains {0:?}")]
    NoParentMount(PathBuf),
}

type Result<T> = std::result::Result<T, MountError>;

pub struct Mount {
    syscall: Box<dyn Syscall>,
}

impl Default for Mount {
    fn default() -> Self {
        Self::new()
    }
}

impl Mount {
    pub fn new() -> Mount {
        Mount {
            syscall: create_syscall(),
        }
    }

    #[cfg(test)]
    pub(super) fn syscall(&self) -> &dyn Syscall {
        self.syscall.as_ref()
    }

    /// Mounts one spec entry under `rootfs`.
    pub fn setup_mount(&self, mount: &SpecMount, rootfs: &Path) -> Result<()> {
        tracing::debug!(?mount, "mounting");
        let mut config = parse_mount(mount);

        if mount.typ().as_deref() == Some("cgroup") {
            return match libcgroups::common::get_cgroup_setup()? {
                CgroupSetup::Unified => self.mount_cgroup_v2(mount, rootfs),
                CgroupSetup::Legacy | CgroupSetup::Hybrid => self.mount_cgroup_v1(mount, rootfs),
            };
        }

        if *mount.destination() == PathBuf::from("/dev") {
            config.flags &= !MsFlags::MS_RDONLY;
        }

        self.mount_into_container(mount, rootfs, &config)
    }

    // The unified hierarchy is bound from the host as a whole.
    fn mount_cgroup_v2(&self, cgroup_mount: &SpecMount, rootfs: &Path) -> Result<()> {
        tracing::debug!("mounting cgroup v2 hierarchy");
        let bind = SpecMountBuilder::default()
            .typ("bind")
            .source(DEFAULT_CGROUP_ROOT)
            .destination(cgroup_mount.destination())
            .options(vec!["rbind".to_string()])
            .build()?;
        self.mount_into_container(&bind, rootfs, &parse_mount(&bind))
    }

    // A tmpfs with every host subsystem hierarchy bound into it.
    fn mount_cgroup_v1(&self, cgroup_mount: &SpecMount, rootfs: &Path) -> Result<()> {
        tracing::debug!("mounting cgroup v1 hierarchies");
        let tmpfs = SpecMountBuilder::default()
            .source("tmpfs")
            .typ("tmpfs")
            .destination(cgroup_mount.destination())
            .options(
                ["noexec", "nosuid", "nodev", "mode=755"]
                    .iter()
                    .map(|o| o.to_string())
                    .collect::<Vec<String>>(),
            )
            .build()?;
        self.mount_into_container(&tmpfs, rootfs, &parse_mount(&tmpfs))?;

        // co-mounted subsystems share a mount point
        let host_mounts: BTreeSet<PathBuf> = libcgroups::v1::util::list_supported_mount_points()?
            .into_values()
            .collect();

        for host_mount in host_mounts {
            let Some(name) = host_mount.file_name() else {
                continue;
            };
            let bind = SpecMountBuilder::default()
                .typ("bind")
                .source(&host_mount)
                .destination(cgroup_mount.destination().join(name))
                .options(vec!["rbind".to_string()])
                .build()?;
            self.mount_into_container(&bind, rootfs, &parse_mount(&bind))?;
        }

        Ok(())
    }

    /// Make parent mount of rootfs private if it was shared, which is required by pivot_root.
    /// It also makes sure following bind mount does not propagate in other namespaces.
    pub fn make_parent_mount_private(&self, rootfs: &Path) -> Result<()> {
        let mount_infos = Process::myself()?.mountinfo()?;
        let parent_mount = find_parent_mount(rootfs, mount_infos.into_iter().collect())?;

        if parent_mount
            .opt_fields
            .iter()
            .any(|field| matches!(field, MountOptFields::Shared(_)))
        {
            self.syscall
                .mount(
                    None,
                    &parent_mount.mount_point,
                    None,
                    MsFlags::MS_PRIVATE,
                    None,
                )
                .map_err(|err| MountError::Syscall {
                    destination: parent_mount.mount_point.clone(),
                    source: err,
                })?;
        }

        Ok(())
    }

    fn mount_into_container(
        &self,
        m: &SpecMount,
        rootfs: &Path,
        config: &MountOptionConfig,
    ) -> Result<()> {
        let typ = m.typ().as_deref();
        let dest = utils::secure_join(rootfs, m.destination()).map_err(|err| {
            tracing::error!(?rootfs, destination = ?m.destination(), %err, "failed to join mount destination");
            MountError::Target {
                path: m.destination().clone(),
                source: err,
            }
        })?;
        let source = m.source().as_ref().ok_or(MountError::NoSource)?;
        let target_err = |err| MountError::Target {
            path: dest.clone(),
            source: err,
        };

        let bind = is_bind_mount(m);
        let src = if bind {
            let src = canonicalize(source).map_err(|err| MountError::Source {
                path: source.clone(),
                source: err,
            })?;
            if src.is_file() {
                if let Some(dir) = dest.parent() {
                    create_dir_all(dir).map_err(target_err)?;
                }
                // the target may be a dangling symlink inside the rootfs
                if dest.is_symlink() {
                    std::fs::remove_file(&dest).map_err(target_err)?;
                }
                OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&dest)
                    .map_err(target_err)?;
            } else {
                create_dir_all(&dest).map_err(target_err)?;
            }
            src
        } else {
            create_dir_all(&dest).map_err(target_err)?;
            source.clone()
        };

        let syscall_err = |err| {
            tracing::error!(?dest, %err, "mount failed");
            MountError::Syscall {
                destination: m.destination().clone(),
                source: err,
            }
        };

        self.syscall
            .mount(
                Some(src.as_path()),
                &dest,
                typ,
                config.flags,
                Some(config.data.as_str()),
            )
            .map_err(syscall_err)?;

        // flags other than these are ignored by the kernel on the first bind
        if bind
            && config.flags.intersects(
                !(MsFlags::MS_REC
                    | MsFlags::MS_REMOUNT
                    | MsFlags::MS_BIND
                    | MsFlags::MS_PRIVATE
                    | MsFlags::MS_SHARED
                    | MsFlags::MS_SLAVE),
            )
        {
            self.syscall
                .mount(
                    Some(dest.as_path()),
                    &dest,
                    None,
                    config.flags | MsFlags::MS_REMOUNT,
                    None,
                )
                .map_err(syscall_err)?;
        }

        if let Some(propagation) = config.propagation {
            self.syscall
                .mount(None, &dest, None, propagation, None)
                .map_err(syscall_err)?;
        }

        if let Some(mount_attr) = &config.rec_attr {
            self.syscall
                .mount_setattr(
                    -1,
                    &dest,
                    AT_RECURSIVE,
                    mount_attr,
                    std::mem::size_of::<crate::syscall::linux::MountAttr>(),
                )
                .map_err(syscall_err)?;
        }

        Ok(())
    }
}

/// Finds the mount point with the longest prefix of `rootfs`.
pub fn find_parent_mount(rootfs: &Path, mount_infos: Vec<MountInfo>) -> Result<MountInfo> {
    mount_infos
        .into_iter()
        .filter(|mi| rootfs.starts_with(&mi.mount_point))
        .max_by_key(|mi| mi.mount_point.as_os_str().len())
        .ok_or_else(|| MountError::NoParentMount(rootfs.to_path_buf()))
}
