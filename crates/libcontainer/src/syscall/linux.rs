//! Implements Command trait for Linux systems
use std::any::Any;
use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::fs::symlink;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::str::FromStr;

use caps::{CapSet, CapsHashSet};
use libc::c_char;
use nix::errno::Errno;
use nix::fcntl::{open, OFlag};
use nix::mount::{mount, umount2, MntFlags, MsFlags};
use nix::sched::CloneFlags;
use nix::sys::stat::{mknod, Mode, SFlag};
use nix::unistd::{chdir, chown, fchdir, pivot_root, sethostname, Gid, Uid};
use oci_spec::runtime::PosixRlimit;

use super::{Result, Syscall, SyscallError};

// Flags used in mount_setattr(2).
// see https://man7.org/linux/man-pages/man2/mount_setattr.2.html.
pub const AT_RECURSIVE: u32 = 0x00008000; // Change the mount properties of the entire mount tree.
pub const MOUNT_ATTR__ATIME: u64 = 0x00000070; // Setting on how atime should be updated.
pub const MOUNT_ATTR_RDONLY: u64 = 0x00000001;
const MOUNT_ATTR_NOSUID: u64 = 0x00000002;
const MOUNT_ATTR_NODEV: u64 = 0x00000004;
const MOUNT_ATTR_NOEXEC: u64 = 0x00000008;
const MOUNT_ATTR_RELATIME: u64 = 0x00000000;
const MOUNT_ATTR_NOATIME: u64 = 0x00000010;
const MOUNT_ATTR_STRICTATIME: u64 = 0x00000020;
const MOUNT_ATTR_NODIRATIME: u64 = 0x00000080;
const MOUNT_ATTR_NOSYMFOLLOW: u64 = 0x00200000;

/// Recursive mount options, applied with mount_setattr(2).
/// The boolean is true when the option clears the attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountRecursive {
    /// Mount read-only.
    Rdonly(bool, u64),

    /// Ignore suid and sgid bits.
    Nosuid(bool, u64),

    /// Disallow access to device special files.
    Nodev(bool, u64),

    /// Disallow program execution.
    Noexec(bool, u64),

    /// Setting on how atime should be updated.
    Atime(bool, u64),

    /// Update atime relative to mtime/ctime.
    Relatime(bool, u64),

    /// Do not update access times.
    Noatime(bool, u64),

    /// Always perform atime updates.
    StrictAtime(bool, u64),

    /// Do not update directory access times.
    NoDiratime(bool, u64),

    /// Prevents following symbolic links.
    Nosymfollow(bool, u64),
}

impl MountRecursive {
    pub fn flag(&self) -> (bool, u64) {
        match *self {
            MountRecursive::Rdonly(clear, flag)
            | MountRecursive::Nosuid(clear, flag)
            | MountRecursive::Nodev(clear, flag)
            | MountRecursive::Noexec(clear, flag)
            | MountRecursive::Atime(clear, flag)
            | MountRecursive::Relatime(clear, flag)
            | MountRecursive::Noatime(clear, flag)
            | MountRecursive::StrictAtime(clear, flag)
            | MountRecursive::NoDiratime(clear, flag)
            | MountRecursive::Nosymfollow(clear, flag) => (clear, flag),
        }
    }
}

impl FromStr for MountRecursive {
    type Err = SyscallError;

    fn from_str(option: &str) -> std::result::Result<Self, Self::Err> {
        match option {
            "rro" => Ok(MountRecursive::Rdonly(false, MOUNT_ATTR_RDONLY)),
            "rrw" => Ok(MountRecursive::Rdonly(true, MOUNT_ATTR_RDONLY)),
            "rnosuid" => Ok(MountRecursive::Nosuid(false, MOUNT_ATTR_NOSUID)),
            "rsuid" => Ok(MountRecursive::Nosuid(true, MOUNT_ATTR_NOSUID)),
            "rnodev" => Ok(MountRecursive::Nodev(false, MOUNT_ATTR_NODEV)),
            "rdev" => Ok(MountRecursive::Nodev(true, MOUNT_ATTR_NODEV)),
            "rnoexec" => Ok(MountRecursive::Noexec(false, MOUNT_ATTR_NOEXEC)),
            "rexec" => Ok(MountRecursive::Noexec(true, MOUNT_ATTR_NOEXEC)),
            "rnodiratime" => Ok(MountRecursive::NoDiratime(false, MOUNT_ATTR_NODIRATIME)),
            "rdiratime" => Ok(MountRecursive::NoDiratime(true, MOUNT_ATTR_NODIRATIME)),
            "rrelatime" => Ok(MountRecursive::Relatime(false, MOUNT_ATTR_RELATIME)),
            "rnorelatime" => Ok(MountRecursive::Relatime(true, MOUNT_ATTR_RELATIME)),
            "rnoatime" => Ok(MountRecursive::Noatime(false, MOUNT_ATTR_NOATIME)),
            "ratime" => Ok(MountRecursive::Atime(true, MOUNT_ATTR__ATIME)),
            "rstrictatime" => Ok(MountRecursive::StrictAtime(false, MOUNT_ATTR_STRICTATIME)),
            "rnostrictatime" => Ok(MountRecursive::StrictAtime(true, MOUNT_ATTR_STRICTATIME)),
            "rnosymfollow" => Ok(MountRecursive::Nosymfollow(false, MOUNT_ATTR_NOSYMFOLLOW)),
            "rsymfollow" => Ok(MountRecursive::Nosymfollow(true, MOUNT_ATTR_NOSYMFOLLOW)),
            // No support for MOUNT_ATTR_IDMAP yet (needs UserNS FD)
            _ => Err(SyscallError::UnexpectedMountAttrOption(option.to_string())),
        }
    }
}

/// A structure used as the third argument of mount_setattr(2).
#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountAttr {
    /// Mount properties to set.
    pub attr_set: u64,

    /// Mount properties to clear.
    pub attr_clr: u64,

    /// Mount propagation type.
    pub propagation: u64,

    /// User namespace file descriptor.
    pub userns_fd: u64,
}

/// Argument of sched_setattr(2).
#[repr(C)]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedAttr {
    pub size: u32,
    pub sched_policy: u32,
    pub sched_flags: u64,
    pub sched_nice: i32,
    pub sched_priority: u32,
    pub sched_runtime: u64,
    pub sched_deadline: u64,
    pub sched_period: u64,
    pub sched_util_min: u32,
    pub sched_util_max: u32,
}

/// Empty structure to implement Command trait for
#[derive(Clone)]
pub struct LinuxSyscall;

fn open_dir(path: &Path) -> Result<OwnedFd> {
    let fd = open(path, OFlag::O_DIRECTORY | OFlag::O_RDONLY, Mode::empty())?;
    // SAFETY: the descriptor was just returned by open(2) and is owned by nobody else.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn pivot_err(path: &Path, msg: &str) -> impl FnOnce(Errno) -> SyscallError {
    let path = path.to_path_buf();
    let msg = msg.to_string();
    move |errno| {
        tracing::error!(?errno, ?path, %msg, "pivot root step failed");
        SyscallError::PivotRoot { path, msg, errno }
    }
}

impl Syscall for LinuxSyscall {
    /// To enable dynamic typing,
    /// see <https://doc.rust-lang.org/std/any/index.html> for more information
    fn as_any(&self) -> &dyn Any {
        self
    }

    /// Swaps the root of the mount namespace for `path`. Giving the same
    /// directory for both pivot_root arguments stacks the old root on top of
    /// the new one, so it can be detached without a scratch directory.
    #[tracing::instrument(level = "trace", skip(self))]
    fn pivot_rootfs(&self, path: &Path) -> Result<()> {
        let oldroot = open_dir(Path::new("/")).map_err(|err| {
            tracing::error!(?err, "failed to open the old root");
            err
        })?;
        let newroot = open_dir(path).map_err(|err| {
            tracing::error!(?err, ?path, "failed to open the new root");
            err
        })?;

        fchdir(newroot.as_raw_fd()).map_err(pivot_err(path, "fchdir into new root"))?;
        pivot_root(".", ".").map_err(pivot_err(path, "pivot_root"))?;
        fchdir(oldroot.as_raw_fd()).map_err(pivot_err(path, "fchdir into old root"))?;

        // rslave, not private, so unmount events do not reach the host namespace
        mount(
            None::<&str>,
            ".",
            None::<&str>,
            MsFlags::MS_SLAVE | MsFlags::MS_REC,
            None::<&str>,
        )
        .map_err(pivot_err(path, "make old root rslave"))?;
        umount2(".", MntFlags::MNT_DETACH).map_err(pivot_err(path, "detach old root"))?;
        chdir("/").map_err(pivot_err(path, "chdir to new root"))?;

        Ok(())
    }

    /// Set namespace for process
    fn set_ns(&self, rawfd: RawFd, nstype: CloneFlags) -> Result<()> {
        // SAFETY: the caller keeps the namespace descriptor open for the duration of the call.
        let fd = unsafe { std::os::fd::BorrowedFd::borrow_raw(rawfd) };
        nix::sched::setns(fd, nstype)?;
        Ok(())
    }

    /// set uid and gid for process
    fn set_id(&self, uid: Uid, gid: Gid) -> Result<()> {
        // args : real *id, effective *id, saved set *id respectively
        // SAFETY: the sandbox pipeline runs on the only thread of the process
        if unsafe { libc::syscall(libc::SYS_setresgid, gid, gid, gid) } == -1 {
            let err = Errno::last();
            tracing::error!(?err, ?gid, "failed to set real, effective and saved set gid");
            return Err(err.into());
        }

        // SAFETY: the sandbox pipeline runs on the only thread of the process
        if unsafe { libc::syscall(libc::SYS_setresuid, uid, uid, uid) } == -1 {
            let err = Errno::last();
            tracing::error!(?err, ?uid, "failed to set real, effective and saved set uid");
            return Err(err.into());
        }

        Ok(())
    }

    fn set_keep_capabilities(&self, value: bool) -> Result<()> {
        prctl::set_keep_capabilities(value).map_err(|errno| {
            let errno = Errno::from_raw(errno);
            tracing::error!(?errno, value, "failed to set keep capabilities");
            SyscallError::PrctlSetKeepCapabilities { errno, value }
        })
    }

    fn set_no_new_privileges(&self) -> Result<()> {
        prctl::set_no_new_privileges(true).map_err(|errno| {
            let errno = Errno::from_raw(errno);
            tracing::error!(?errno, "failed to set no new privileges");
            SyscallError::PrctlSetNoNewPrivileges { errno }
        })
    }

    /// Set capabilities for container process
    fn set_capability(&self, cset: CapSet, value: &CapsHashSet) -> Result<()> {
        match cset {
            // caps::set cannot set capabilities in bounding set,
            // so everything outside the wanted set is dropped one by one
            CapSet::Bounding => {
                let all = caps::read(None, CapSet::Bounding)?;
                for c in all.difference(value) {
                    caps::drop(None, CapSet::Bounding, *c)?
                }
            }
            _ => {
                caps::set(None, cset, value)?;
            }
        }
        Ok(())
    }

    /// Sets hostname for process
    fn set_hostname(&self, hostname: &str) -> Result<()> {
        sethostname(hostname)?;
        Ok(())
    }

    /// Sets domainname for process (see
    /// [setdomainname(2)](https://man7.org/linux/man-pages/man2/setdomainname.2.html)).
    fn set_domainname(&self, domainname: &str) -> Result<()> {
        let ptr = domainname.as_bytes().as_ptr() as *const c_char;
        let len = domainname.len();
        // SAFETY: ptr and len describe the borrowed string for the duration of the call
        match unsafe { libc::setdomainname(ptr, len) } {
            0 => Ok(()),
            -1 => Err(Errno::last().into()),
            _ => Err(Errno::UnknownErrno.into()),
        }
    }

    /// Sets resource limit for process
    fn set_rlimit(&self, rlimit: &PosixRlimit) -> Result<()> {
        let rlim = &libc::rlimit {
            rlim_cur: rlimit.soft(),
            rlim_max: rlimit.hard(),
        };

        // Change for musl libc based on seccomp needs
        #[cfg(not(target_env = "musl"))]
        // SAFETY: rlim points to a valid rlimit struct
        let res = unsafe { libc::setrlimit(rlimit.typ() as u32, rlim) };
        #[cfg(target_env = "musl")]
        // SAFETY: rlim points to a valid rlimit struct
        let res = unsafe { libc::setrlimit(rlimit.typ() as i32, rlim) };

        match res {
            0 => Ok(()),
            -1 => Err(Errno::last().into()),
            _ => Err(Errno::UnknownErrno.into()),
        }
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        mount(source, target, fstype, flags, data)?;
        Ok(())
    }

    fn symlink(&self, original: &Path, link: &Path) -> Result<()> {
        symlink(original, link)?;
        Ok(())
    }

    fn mknod(&self, path: &Path, kind: SFlag, perm: Mode, dev: u64) -> Result<()> {
        mknod(path, kind, perm, dev)?;
        Ok(())
    }

    fn chown(&self, path: &Path, owner: Option<Uid>, group: Option<Gid>) -> Result<()> {
        chown(path, owner, group)?;
        Ok(())
    }

    fn set_groups(&self, groups: &[Gid]) -> Result<()> {
        let n_groups = groups.len() as libc::size_t;
        let groups_ptr = groups.as_ptr() as *const libc::gid_t;

        // SAFETY: the sandbox pipeline runs on the only thread of the process
        if unsafe { libc::syscall(libc::SYS_setgroups, n_groups, groups_ptr) } == -1 {
            let err = Errno::last();
            tracing::error!(?err, ?groups, "failed to set groups");
            return Err(err.into());
        }
        Ok(())
    }

    fn mount_setattr(
        &self,
        dirfd: RawFd,
        pathname: &Path,
        flags: u32,
        mount_attr: &MountAttr,
        size: libc::size_t,
    ) -> Result<()> {
        let path_c_string = pathname
            .to_str()
            .and_then(|p| CString::new(p).ok())
            .ok_or_else(|| {
                tracing::error!(path = ?pathname, "failed to convert path to string");
                SyscallError::InvalidPath(pathname.to_path_buf())
            })?;

        // SAFETY: all pointers reference live values for the duration of the call
        match unsafe {
            libc::syscall(
                libc::SYS_mount_setattr,
                dirfd,
                path_c_string.as_ptr(),
                flags,
                mount_attr as *const MountAttr,
                size,
            )
        } {
            0 => Ok(()),
            -1 => Err(Errno::last().into()),
            _ => Err(Errno::UnknownErrno.into()),
        }
    }

    fn set_scheduler(&self, attr: &SchedAttr) -> Result<()> {
        let mut attr = attr.clone();
        attr.size = std::mem::size_of::<SchedAttr>() as u32;
        // SAFETY: attr is a properly sized sched_attr for the calling thread
        match unsafe {
            libc::syscall(
                libc::SYS_sched_setattr,
                0,
                &attr as *const SchedAttr,
                0,
            )
        } {
            0 => Ok(()),
            -1 => Err(Errno::last().into()),
            _ => Err(Errno::UnknownErrno.into()),
        }
    }

    fn set_io_priority(&self, class: i64, priority: i64) -> Result<()> {
        let ioprio_who_process: libc::c_int = 1;
        let ioprio_who_pid = 0;
        let iop = (class << 13) | priority;
        // SAFETY: plain integer arguments
        match unsafe {
            libc::syscall(
                libc::SYS_ioprio_set,
                ioprio_who_process,
                ioprio_who_pid,
                iop as libc::c_ulong,
            )
        } {
            0 => Ok(()),
            -1 => Err(Errno::last().into()),
            _ => Err(Errno::UnknownErrno.into()),
        }
    }
}
