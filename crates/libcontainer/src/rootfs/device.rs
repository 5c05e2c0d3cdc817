use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use nix::mount::MsFlags;
use nix::sys::stat::{umask, Mode};
use nix::unistd::{Gid, Uid};
use oci_spec::runtime::LinuxDevice;

use super::utils::{default_devices, to_sflag};
use crate::syscall::syscall::create_syscall;
use crate::syscall::Syscall;
use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("{0:?} is not a valid device path")]
    InvalidDevicePath(PathBuf),
    #[error("failed syscall to create device")]
    Syscall(#[from] crate::syscall::SyscallError),
    #[error("failed to prepare {path:?}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to build default devices")]
    Spec(#[from] oci_spec::OciSpecError),
}

type Result<T> = std::result::Result<T, DeviceError>;

pub struct Device {
    syscall: Box<dyn Syscall>,
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

impl Device {
    pub fn new() -> Device {
        Device {
            syscall: create_syscall(),
        }
    }

    #[cfg(test)]
    pub(super) fn syscall(&self) -> &dyn Syscall {
        self.syscall.as_ref()
    }

    /// Creates the spec devices followed by every default device the spec
    /// does not override.
    pub fn create_spec_and_default_devices(
        &self,
        rootfs: &Path,
        spec_devices: Option<&Vec<LinuxDevice>>,
        bind: bool,
    ) -> Result<()> {
        let spec_devices = spec_devices.map(|d| d.as_slice()).unwrap_or_default();
        let overridden: HashSet<&PathBuf> = spec_devices.iter().map(|d| d.path()).collect();
        let defaults = default_devices()?;
        let defaults = defaults.iter().filter(|d| !overridden.contains(d.path()));

        self.create_devices(rootfs, spec_devices.iter().chain(defaults), bind)
    }

    pub fn create_devices<'a, I>(&self, rootfs: &Path, devices: I, bind: bool) -> Result<()>
    where
        I: IntoIterator<Item = &'a LinuxDevice>,
    {
        let old_mode = umask(Mode::from_bits_truncate(0o000));
        let result = devices.into_iter().try_for_each(|dev| {
            if !dev.path().starts_with("/dev") {
                tracing::error!(path = ?dev.path(), "not a valid device path starting with /dev");
                return Err(DeviceError::InvalidDevicePath(dev.path().to_path_buf()));
            }

            if bind {
                self.bind_dev(rootfs, dev)
            } else {
                self.mknod_dev(rootfs, dev)
            }
        });
        umask(old_mode);

        result
    }

    // mknod is not permitted inside a new user namespace
    fn bind_dev(&self, rootfs: &Path, dev: &LinuxDevice) -> Result<()> {
        let full_container_path = create_container_dev_path(rootfs, dev)?;
        tracing::debug!(?full_container_path, "bind device");

        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&full_container_path)
            .map_err(|err| {
                tracing::error!(?full_container_path, %err, "failed to create bind target");
                DeviceError::Io {
                    path: full_container_path.clone(),
                    source: err,
                }
            })?;
        self.syscall
            .mount(
                Some(dev.path()),
                &full_container_path,
                Some("bind"),
                MsFlags::MS_BIND,
                None,
            )
            .map_err(|err| {
                tracing::error!(?err, path = ?full_container_path, "failed to mount bind dev");
                err
            })?;

        Ok(())
    }

    fn mknod_dev(&self, rootfs: &Path, dev: &LinuxDevice) -> Result<()> {
        fn makedev(major: i64, minor: i64) -> u64 {
            ((minor & 0xff)
                | ((major & 0xfff) << 8)
                | ((minor & !0xff) << 12)
                | ((major & !0xfff) << 32)) as u64
        }

        let full_container_path = create_container_dev_path(rootfs, dev)?;

        self.syscall
            .mknod(
                &full_container_path,
                to_sflag(dev.typ()),
                Mode::from_bits_truncate(dev.file_mode().unwrap_or(0o666)),
                makedev(dev.major(), dev.minor()),
            )
            .map_err(|err| {
                tracing::error!(
                    ?err,
                    path = ?full_container_path,
                    major = ?dev.major(),
                    minor = ?dev.minor(),
                    "failed to mknod device"
                );
                err
            })?;
        self.syscall
            .chown(
                &full_container_path,
                dev.uid().map(Uid::from_raw),
                dev.gid().map(Gid::from_raw),
            )
            .map_err(|err| {
                tracing::error!(
                    path = ?full_container_path,
                    ?err,
                    uid = ?dev.uid(),
                    gid = ?dev.gid(),
                    "failed to chown device"
                );
                err
            })?;

        Ok(())
    }
}

fn create_container_dev_path(rootfs: &Path, dev: &LinuxDevice) -> Result<PathBuf> {
    let io_err = |err| DeviceError::Io {
        path: dev.path().clone(),
        source: err,
    };
    let full_container_path = utils::secure_join(rootfs, dev.path()).map_err(io_err)?;
    if let Some(parent) = full_container_path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    Ok(full_container_path)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use anyhow::Result;
    use nix::sys::stat::SFlag;
    use nix::unistd::{Gid, Uid};
    use oci_spec::runtime::{LinuxDeviceBuilder, LinuxDeviceType};

    use super::*;
    use crate::syscall::test::{ChownArgs, MknodArgs, MountArgs, TestHelperSyscall};

    fn helper(device: &Device) -> &TestHelperSyscall {
        device
            .syscall()
            .as_any()
            .downcast_ref::<TestHelperSyscall>()
            .unwrap()
    }

    fn null_device(mode: u32) -> LinuxDevice {
        LinuxDeviceBuilder::default()
            .path(PathBuf::from("/dev/null"))
            .major(1)
            .minor(3)
            .typ(LinuxDeviceType::C)
            .file_mode(mode)
            .uid(1000u32)
            .gid(1000u32)
            .build()
            .unwrap()
    }

    #[test]
    fn test_bind_dev() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let device = Device::new();
        device.create_devices(tmp_dir.path(), &[null_device(0o644)], true)?;

        let want = MountArgs {
            source: Some(PathBuf::from("/dev/null")),
            target: tmp_dir.path().join("dev/null"),
            fstype: Some("bind".to_string()),
            flags: MsFlags::MS_BIND,
            data: None,
        };
        assert_eq!(helper(&device).get_mount_args(), vec![want]);
        assert!(tmp_dir.path().join("dev/null").exists());
        Ok(())
    }

    #[test]
    fn test_mknod_dev() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let device = Device::new();
        device.create_devices(tmp_dir.path(), &[null_device(0o644)], false)?;

        let want_mknod = MknodArgs {
            path: tmp_dir.path().join("dev/null"),
            kind: SFlag::S_IFCHR,
            perm: Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH,
            dev: 259,
        };
        assert_eq!(helper(&device).get_mknod_args(), vec![want_mknod]);

        let want_chown = ChownArgs {
            path: tmp_dir.path().join("dev/null"),
            owner: Some(Uid::from_raw(1000)),
            group: Some(Gid::from_raw(1000)),
        };
        assert_eq!(helper(&device).get_chown_args(), vec![want_chown]);
        Ok(())
    }

    #[test]
    fn test_device_outside_dev_is_rejected() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let device = Device::new();
        let bad = LinuxDeviceBuilder::default()
            .path(PathBuf::from("/etc/null"))
            .typ(LinuxDeviceType::C)
            .build()?;
        assert!(matches!(
            device.create_devices(tmp_dir.path(), &[bad], false),
            Err(DeviceError::InvalidDevicePath(_))
        ));
        assert!(helper(&device).get_mknod_args().is_empty());
        Ok(())
    }

    #[test]
    fn test_spec_device_overrides_default() -> Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let device = Device::new();
        let spec = vec![null_device(0o600)];
        device.create_spec_and_default_devices(tmp_dir.path(), Some(&spec), false)?;

        let nodes = helper(&device).get_mknod_args();
        assert_eq!(nodes.len(), default_devices()?.len());
        let null: Vec<_> = nodes
            .iter()
            .filter(|n| n.path == tmp_dir.path().join("dev/null"))
            .collect();
        assert_eq!(null.len(), 1);
        assert_eq!(null[0].perm, Mode::S_IRUSR | Mode::S_IWUSR);
        Ok(())
    }
}
