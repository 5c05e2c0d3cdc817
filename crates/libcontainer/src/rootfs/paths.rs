//! Masked and readonly paths, applied inside the new root after pivot.
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::mount::MsFlags;

use crate::syscall::{Syscall, SyscallError};

#[derive(Debug, thiserror::Error)]
pub enum PathsError {
    #[error("failed to mask {path:?}")]
    Mask { path: PathBuf, source: SyscallError },
    #[error("failed to make {path:?} readonly")]
    Readonly { path: PathBuf, source: SyscallError },
}

type Result<T> = std::result::Result<T, PathsError>;

/// Masks every path first, then makes the readonly paths readonly. A masked
/// path below a readonly ancestor is mounted while the ancestor is still
/// writable.
pub fn apply_masked_and_readonly<P: AsRef<Path>>(
    masked: &[P],
    readonly: &[P],
    syscall: &dyn Syscall,
) -> Result<()> {
    for path in masked {
        masked_path(path.as_ref(), syscall)?;
    }
    for path in readonly {
        readonly_path(path.as_ref(), syscall)?;
    }
    Ok(())
}

/// Bind mounts `/dev/null` over files and a readonly tmpfs over directories.
/// Paths missing from the root are skipped.
#[tracing::instrument(level = "trace", skip(syscall))]
pub fn masked_path(path: &Path, syscall: &dyn Syscall) -> Result<()> {
    let mask_err = |err| PathsError::Mask {
        path: path.to_path_buf(),
        source: err,
    };

    let Err(err) = syscall.mount(
        Some(Path::new("/dev/null")),
        path,
        None,
        MsFlags::MS_BIND,
        None,
    ) else {
        return Ok(());
    };

    match err.errno() {
        Some(Errno::ENOENT) => {
            tracing::warn!(?path, "masked path does not exist");
            Ok(())
        }
        Some(Errno::ENOTDIR) => syscall
            .mount(
                Some(Path::new("tmpfs")),
                path,
                Some("tmpfs"),
                MsFlags::MS_RDONLY,
                None,
            )
            .map_err(mask_err),
        _ => {
            tracing::error!(?path, %err, "failed to mask path");
            Err(mask_err(err))
        }
    }
}

// The first bind mount ignores every other flag, so the readonly flags
// need a second remount.
#[tracing::instrument(level = "trace", skip(syscall))]
pub fn readonly_path(path: &Path, syscall: &dyn Syscall) -> Result<()> {
    let ro_err = |err| PathsError::Readonly {
        path: path.to_path_buf(),
        source: err,
    };

    if let Err(err) = syscall.mount(
        Some(path),
        path,
        None,
        MsFlags::MS_BIND | MsFlags::MS_REC,
        None,
    ) {
        if err.errno() == Some(Errno::ENOENT) {
            return Ok(());
        }
        tracing::error!(?path, %err, "failed to bind readonly path");
        return Err(ro_err(err));
    }

    syscall
        .mount(
            Some(path),
            path,
            None,
            MsFlags::MS_NOSUID
                | MsFlags::MS_NODEV
                | MsFlags::MS_NOEXEC
                | MsFlags::MS_BIND
                | MsFlags::MS_REMOUNT
                | MsFlags::MS_RDONLY,
            None,
        )
        .map_err(ro_err)?;

    tracing::debug!(?path, "readonly path mounted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::test::{ArgName, Call, MountArgs, TestHelperSyscall};

    fn remount_flags() -> MsFlags {
        MsFlags::MS_NOSUID
            | MsFlags::MS_NODEV
            | MsFlags::MS_NOEXEC
            | MsFlags::MS_BIND
            | MsFlags::MS_REMOUNT
            | MsFlags::MS_RDONLY
    }

    fn null_bind(path: &str) -> MountArgs {
        MountArgs {
            source: Some(PathBuf::from("/dev/null")),
            target: PathBuf::from(path),
            fstype: None,
            flags: MsFlags::MS_BIND,
            data: None,
        }
    }

    #[test]
    fn test_readonly_path() {
        let syscall = TestHelperSyscall::default();
        readonly_path(Path::new("/proc/sys"), &syscall).unwrap();

        let want = vec![
            MountArgs {
                source: Some(PathBuf::from("/proc/sys")),
                target: PathBuf::from("/proc/sys"),
                fstype: None,
                flags: MsFlags::MS_BIND | MsFlags::MS_REC,
                data: None,
            },
            MountArgs {
                source: Some(PathBuf::from("/proc/sys")),
                target: PathBuf::from("/proc/sys"),
                fstype: None,
                flags: remount_flags(),
                data: None,
            },
        ];
        assert_eq!(syscall.get_mount_args(), want);
    }

    #[test]
    fn test_readonly_path_missing_is_skipped() {
        let syscall = TestHelperSyscall::default();
        syscall.set_ret_err(ArgName::Mount, || SyscallError::Nix(Errno::ENOENT));
        readonly_path(Path::new("/proc/missing"), &syscall).unwrap();
        assert!(syscall.get_mount_args().is_empty());
    }

    #[test]
    fn test_readonly_path_other_error_fails() {
        let syscall = TestHelperSyscall::default();
        syscall.set_ret_err(ArgName::Mount, || SyscallError::Nix(Errno::EPERM));
        assert!(matches!(
            readonly_path(Path::new("/proc/sys"), &syscall),
            Err(PathsError::Readonly { .. })
        ));
    }

    #[test]
    fn test_masked_path_file() {
        let syscall = TestHelperSyscall::default();
        masked_path(Path::new("/proc/kcore"), &syscall).unwrap();
        assert_eq!(syscall.get_mount_args(), vec![null_bind("/proc/kcore")]);
    }

    #[test]
    fn test_masked_path_directory_falls_back_to_tmpfs() {
        let syscall = TestHelperSyscall::default();
        syscall.set_ret_err(ArgName::Mount, || SyscallError::Nix(Errno::ENOTDIR));
        masked_path(Path::new("/proc/acpi"), &syscall).unwrap();

        let want = MountArgs {
            source: Some(PathBuf::from("tmpfs")),
            target: PathBuf::from("/proc/acpi"),
            fstype: Some("tmpfs".to_string()),
            flags: MsFlags::MS_RDONLY,
            data: None,
        };
        assert_eq!(syscall.get_mount_args(), vec![want]);
    }

    #[test]
    fn test_masked_path_missing_is_skipped() {
        let syscall = TestHelperSyscall::default();
        syscall.set_ret_err(ArgName::Mount, || SyscallError::Nix(Errno::ENOENT));
        masked_path(Path::new("/proc/missing"), &syscall).unwrap();
        assert!(syscall.get_mount_args().is_empty());
    }

    #[test]
    fn test_masked_path_other_error_fails() {
        let syscall = TestHelperSyscall::default();
        syscall.set_ret_err(ArgName::Mount, || SyscallError::Nix(Errno::EPERM));
        assert!(matches!(
            masked_path(Path::new("/proc/kcore"), &syscall),
            Err(PathsError::Mask { .. })
        ));
    }

    #[test]
    fn test_masked_before_readonly_ancestor() {
        let syscall = TestHelperSyscall::default();
        let masked = vec![PathBuf::from("/proc/sys/kernel/core_pattern")];
        let readonly = vec![PathBuf::from("/proc/sys")];
        apply_masked_and_readonly(&masked, &readonly, &syscall).unwrap();

        let calls = syscall.get_calls();
        let position = |want: &dyn Fn(&MountArgs) -> bool| {
            calls
                .iter()
                .position(|c| matches!(c, Call::Mount(args) if want(args)))
                .unwrap()
        };
        let mask = position(&|a| a.target == Path::new("/proc/sys/kernel/core_pattern"));
        let remount = position(&|a| {
            a.target == Path::new("/proc/sys") && a.flags.contains(MsFlags::MS_REMOUNT)
        });
        assert!(mask < remount);
        assert_eq!(calls.len(), 3);
    }
}
