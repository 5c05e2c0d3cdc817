use std::path::{Path, PathBuf};

use nix::mount::MsFlags;
use oci_spec::runtime::{Linux, Mount as SpecMount, MountBuilder, Spec};

use super::device::Device;
use super::mount::Mount;
use super::paths;
use super::symlink::Symlink;
use super::utils::devpts_mount;
use super::{Result, RootfsError};
use crate::error::MissingSpecError;
use crate::syscall::syscall::create_syscall;
use crate::syscall::Syscall;

/// Holds information about rootfs
pub struct RootFS {
    syscall: Box<dyn Syscall>,
}

impl Default for RootFS {
    fn default() -> Self {
        Self::new()
    }
}

fn proc_mount() -> std::result::Result<SpecMount, oci_spec::OciSpecError> {
    MountBuilder::default()
        .destination(PathBuf::from("/proc"))
        .typ("proc")
        .source(PathBuf::from("proc"))
        .options(
            ["nosuid", "noexec", "nodev"]
                .iter()
                .map(|o| o.to_string())
                .collect::<Vec<String>>(),
        )
        .build()
}

/// Spec mounts with `/proc` in front and `/dev/pts` at the end, unless the
/// spec mounts those destinations itself.
fn container_mounts(spec: &Spec) -> Result<Vec<SpecMount>> {
    let spec_mounts = spec.mounts().clone().unwrap_or_default();
    let has = |dest: &str| spec_mounts.iter().any(|m| m.destination() == Path::new(dest));

    let mut mounts = Vec::with_capacity(spec_mounts.len() + 2);
    if !has("/proc") {
        mounts.push(proc_mount()?);
    }
    let needs_devpts = !has("/dev/pts");
    mounts.extend(spec_mounts);
    if needs_devpts {
        mounts.push(devpts_mount()?);
    }
    Ok(mounts)
}

/// Propagation applied to `/` before the rootfs is built. Shared is applied
/// after the pivot by `adjust_root_mount_propagation`.
fn pre_pivot_propagation(linux: &Linux) -> Result<MsFlags> {
    let flags = match linux.rootfs_propagation().as_deref() {
        Some("private") => MsFlags::MS_PRIVATE,
        Some("shared" | "slave" | "unbindable") | None => MsFlags::MS_SLAVE,
        Some(unknown) => {
            return Err(RootfsError::UnknownRootfsPropagation(unknown.to_string()));
        }
    };
    Ok(MsFlags::MS_REC | flags)
}

impl RootFS {
    pub fn new() -> RootFS {
        RootFS {
            syscall: create_syscall(),
        }
    }

    #[cfg(test)]
    pub(crate) fn syscall(&self) -> &dyn Syscall {
        self.syscall.as_ref()
    }

    fn mount_to_rootfs(&self, linux: &Linux, spec: &Spec, rootfs: &Path) -> Result<()> {
        let flags = pre_pivot_propagation(linux)?;
        self.syscall
            .mount(None, Path::new("/"), None, flags, None)
            .map_err(|err| {
                tracing::error!(
                    ?err,
                    ?flags,
                    "failed to change the mount propagation type of the root"
                );
                err
            })?;

        let mounter = Mount::new();
        mounter.make_parent_mount_private(rootfs)?;

        tracing::debug!(?rootfs, "mount root fs");
        self.syscall
            .mount(
                Some(rootfs),
                rootfs,
                None,
                MsFlags::MS_BIND | MsFlags::MS_REC,
                None,
            )
            .map_err(|err| {
                tracing::error!(?rootfs, ?err, "failed to bind mount rootfs");
                err
            })?;

        for mount in container_mounts(spec)? {
            mounter.setup_mount(&mount, rootfs)?;
        }
        Ok(())
    }

    /// Builds the mount tree, devices and symlinks under `rootfs` while the
    /// host root is still reachable.
    #[tracing::instrument(level = "trace", skip(self, spec))]
    pub fn prepare_rootfs(&self, spec: &Spec, rootfs: &Path, bind_devices: bool) -> Result<()> {
        tracing::debug!(?rootfs, "prepare rootfs");
        let linux = spec.linux().as_ref().ok_or(MissingSpecError::Linux)?;

        self.mount_to_rootfs(linux, spec, rootfs)?;

        let symlinker = Symlink::new();
        symlinker.setup_kcore_symlink(rootfs)?;
        symlinker.setup_default_symlinks(rootfs)?;

        Device::new().create_spec_and_default_devices(
            rootfs,
            linux.devices().as_ref(),
            bind_devices,
        )?;

        symlinker.setup_ptmx(rootfs)?;
        Ok(())
    }

    pub fn pivot_root(&self, rootfs: &Path) -> Result<()> {
        tracing::debug!(?rootfs, "pivot root");
        self.syscall.pivot_rootfs(rootfs)?;
        Ok(())
    }

    /// Masked paths go first so that a readonly ancestor does not block them.
    pub fn apply_masked_and_readonly_paths(&self, linux: &Linux) -> Result<()> {
        let masked = linux.masked_paths().clone().unwrap_or_default();
        let readonly = linux.readonly_paths().clone().unwrap_or_default();
        paths::apply_masked_and_readonly(&masked, &readonly, self.syscall.as_ref())?;
        Ok(())
    }

    /// Change propagation type of rootfs as specified in spec.
    pub fn adjust_root_mount_propagation(&self, linux: &Linux) -> Result<()> {
        let rootfs_propagation = linux.rootfs_propagation().as_deref();
        let flags = match rootfs_propagation {
            Some("shared") => Some(MsFlags::MS_SHARED),
            Some("unbindable") => Some(MsFlags::MS_UNBINDABLE),
            _ => None,
        };

        if let Some(flags) = flags {
            self.syscall
                .mount(None, Path::new("/"), None, flags, None)
                .map_err(|err| {
                    tracing::error!(
                        ?err,
                        ?flags,
                        "failed to adjust the mount propagation type of the root"
                    );
                    err
                })?;
        }

        Ok(())
    }

    pub fn remount_root_readonly(&self) -> Result<()> {
        self.syscall
            .mount(
                None,
                Path::new("/"),
                None,
                MsFlags::MS_RDONLY | MsFlags::MS_REMOUNT | MsFlags::MS_BIND,
                None,
            )
            .map_err(|err| {
                tracing::error!(?err, "failed to remount root readonly");
                err
            })?;
        Ok(())
    }
}
