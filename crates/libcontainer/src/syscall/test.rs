use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};

use caps::{CapSet, CapsHashSet};
use nix::mount::MsFlags;
use nix::sched::CloneFlags;
use nix::sys::stat::{Mode, SFlag};
use nix::unistd::{Gid, Uid};
use oci_spec::runtime::PosixRlimit;

use super::linux::{MountAttr, SchedAttr};
use super::{Result, Syscall, SyscallError};

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MountArgs {
    pub source: Option<PathBuf>,
    pub target: PathBuf,
    pub fstype: Option<String>,
    pub flags: MsFlags,
    pub data: Option<String>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MknodArgs {
    pub path: PathBuf,
    pub kind: SFlag,
    pub perm: Mode,
    pub dev: u64,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ChownArgs {
    pub path: PathBuf,
    pub owner: Option<Uid>,
    pub group: Option<Gid>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MountSetattrArgs {
    pub pathname: PathBuf,
    pub flags: u32,
    pub mount_attr: MountAttr,
}

/// A single recorded syscall, in the order it was issued.
#[derive(Clone, Debug)]
pub enum Call {
    PivotRoot(PathBuf),
    SetNs(RawFd, CloneFlags),
    SetId(Uid, Gid),
    KeepCapabilities(bool),
    NoNewPrivileges,
    SetCapability(CapSet, CapsHashSet),
    Hostname(String),
    Domainname(String),
    Rlimit(PosixRlimit),
    Mount(MountArgs),
    Symlink(PathBuf, PathBuf),
    Mknod(MknodArgs),
    Chown(ChownArgs),
    Groups(Vec<Gid>),
    MountSetattr(MountSetattrArgs),
    Scheduler(SchedAttr),
    IoPriority(i64, i64),
}

#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum ArgName {
    PivotRoot,
    Namespace,
    SetId,
    Capability,
    Mount,
    Symlink,
    Mknod,
    Chown,
    Hostname,
    Groups,
    Rlimit,
    MountSetattr,
}

struct Mock {
    ret_err: fn() -> SyscallError,
    ret_err_times: usize,
}

/// Records every call instead of touching the system. Failures can be
/// injected per syscall with `set_ret_err`.
#[derive(Default)]
pub struct TestHelperSyscall {
    calls: RefCell<Vec<Call>>,
    mocks: RefCell<HashMap<ArgName, Mock>>,
}

impl TestHelperSyscall {
    fn act(&self, name: Option<ArgName>, call: Call) -> Result<()> {
        if let Some(name) = name {
            if let Some(mock) = self.mocks.borrow_mut().get_mut(&name) {
                if mock.ret_err_times > 0 {
                    mock.ret_err_times -= 1;
                    return Err((mock.ret_err)());
                }
            }
        }

        self.calls.borrow_mut().push(call);
        Ok(())
    }

    pub fn set_ret_err(&self, name: ArgName, err: fn() -> SyscallError) {
        self.mocks.borrow_mut().insert(
            name,
            Mock {
                ret_err: err,
                ret_err_times: 1,
            },
        );
    }

    pub fn set_ret_err_times(&self, name: ArgName, times: usize) {
        if let Some(mock) = self.mocks.borrow_mut().get_mut(&name) {
            mock.ret_err_times = times;
        }
    }

    /// All recorded calls, in issue order.
    pub fn get_calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn get_setns_args(&self) -> Vec<(RawFd, CloneFlags)> {
        self.filter(|c| match c {
            Call::SetNs(fd, flags) => Some((*fd, *flags)),
            _ => None,
        })
    }

    pub fn get_set_capability_args(&self) -> Vec<(CapSet, CapsHashSet)> {
        self.filter(|c| match c {
            Call::SetCapability(set, caps) => Some((*set, caps.clone())),
            _ => None,
        })
    }

    pub fn get_mount_args(&self) -> Vec<MountArgs> {
        self.filter(|c| match c {
            Call::Mount(args) => Some(args.clone()),
            _ => None,
        })
    }

    pub fn get_symlink_args(&self) -> Vec<(PathBuf, PathBuf)> {
        self.filter(|c| match c {
            Call::Symlink(original, link) => Some((original.clone(), link.clone())),
            _ => None,
        })
    }

    pub fn get_mknod_args(&self) -> Vec<MknodArgs> {
        self.filter(|c| match c {
            Call::Mknod(args) => Some(args.clone()),
            _ => None,
        })
    }

    pub fn get_chown_args(&self) -> Vec<ChownArgs> {
        self.filter(|c| match c {
            Call::Chown(args) => Some(args.clone()),
            _ => None,
        })
    }

    pub fn get_hostname_args(&self) -> Vec<String> {
        self.filter(|c| match c {
            Call::Hostname(hostname) => Some(hostname.clone()),
            _ => None,
        })
    }

    pub fn get_domainname_args(&self) -> Vec<String> {
        self.filter(|c| match c {
            Call::Domainname(domainname) => Some(domainname.clone()),
            _ => None,
        })
    }

    pub fn get_groups_args(&self) -> Vec<Vec<Gid>> {
        self.filter(|c| match c {
            Call::Groups(groups) => Some(groups.clone()),
            _ => None,
        })
    }

    pub fn get_rlimit_args(&self) -> Vec<PosixRlimit> {
        self.filter(|c| match c {
            Call::Rlimit(rlimit) => Some(rlimit.clone()),
            _ => None,
        })
    }

    pub fn get_mount_setattr_args(&self) -> Vec<MountSetattrArgs> {
        self.filter(|c| match c {
            Call::MountSetattr(args) => Some(args.clone()),
            _ => None,
        })
    }

    pub fn get_io_priority_args(&self) -> Vec<(i64, i64)> {
        self.filter(|c| match c {
            Call::IoPriority(class, priority) => Some((*class, *priority)),
            _ => None,
        })
    }

    fn filter<T, F: Fn(&Call) -> Option<T>>(&self, f: F) -> Vec<T> {
        self.calls.borrow().iter().filter_map(f).collect()
    }
}

impl Syscall for TestHelperSyscall {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn pivot_rootfs(&self, path: &Path) -> Result<()> {
        self.act(Some(ArgName::PivotRoot), Call::PivotRoot(path.to_owned()))
    }

    fn set_ns(&self, rawfd: RawFd, nstype: CloneFlags) -> Result<()> {
        self.act(Some(ArgName::Namespace), Call::SetNs(rawfd, nstype))
    }

    fn set_id(&self, uid: Uid, gid: Gid) -> Result<()> {
        self.act(Some(ArgName::SetId), Call::SetId(uid, gid))
    }

    fn set_keep_capabilities(&self, value: bool) -> Result<()> {
        self.act(None, Call::KeepCapabilities(value))
    }

    fn set_no_new_privileges(&self) -> Result<()> {
        self.act(None, Call::NoNewPrivileges)
    }

    fn set_capability(&self, cset: CapSet, value: &CapsHashSet) -> Result<()> {
        self.act(
            Some(ArgName::Capability),
            Call::SetCapability(cset, value.clone()),
        )
    }

    fn set_hostname(&self, hostname: &str) -> Result<()> {
        self.act(Some(ArgName::Hostname), Call::Hostname(hostname.to_owned()))
    }

    fn set_domainname(&self, domainname: &str) -> Result<()> {
        self.act(None, Call::Domainname(domainname.to_owned()))
    }

    fn set_rlimit(&self, rlimit: &PosixRlimit) -> Result<()> {
        self.act(Some(ArgName::Rlimit), Call::Rlimit(rlimit.clone()))
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<()> {
        self.act(
            Some(ArgName::Mount),
            Call::Mount(MountArgs {
                source: source.map(|x| x.to_owned()),
                target: target.to_owned(),
                fstype: fstype.map(|x| x.to_owned()),
                flags,
                data: data.map(|x| x.to_owned()),
            }),
        )
    }

    fn symlink(&self, original: &Path, link: &Path) -> Result<()> {
        self.act(
            Some(ArgName::Symlink),
            Call::Symlink(original.to_path_buf(), link.to_path_buf()),
        )
    }

    fn mknod(&self, path: &Path, kind: SFlag, perm: Mode, dev: u64) -> Result<()> {
        self.act(
            Some(ArgName::Mknod),
            Call::Mknod(MknodArgs {
                path: path.to_path_buf(),
                kind,
                perm,
                dev,
            }),
        )
    }

    fn chown(&self, path: &Path, owner: Option<Uid>, group: Option<Gid>) -> Result<()> {
        self.act(
            Some(ArgName::Chown),
            Call::Chown(ChownArgs {
                path: path.to_path_buf(),
                owner,
                group,
            }),
        )
    }

    fn set_groups(&self, groups: &[Gid]) -> Result<()> {
        self.act(Some(ArgName::Groups), Call::Groups(groups.to_vec()))
    }

    fn mount_setattr(
        &self,
        _dirfd: RawFd,
        pathname: &Path,
        flags: u32,
        mount_attr: &MountAttr,
        _size: libc::size_t,
    ) -> Result<()> {
        self.act(
            Some(ArgName::MountSetattr),
            Call::MountSetattr(MountSetattrArgs {
                pathname: pathname.to_path_buf(),
                flags,
                mount_attr: mount_attr.clone(),
            }),
        )
    }

    fn set_scheduler(&self, attr: &SchedAttr) -> Result<()> {
        self.act(None, Call::Scheduler(attr.clone()))
    }

    fn set_io_priority(&self, class: i64, priority: i64) -> Result<()> {
        self.act(None, Call::IoPriority(class, priority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injected_error_is_returned_once() {
        let syscall = TestHelperSyscall::default();
        syscall.set_ret_err(ArgName::Mount, || {
            SyscallError::Nix(nix::errno::Errno::ENOENT)
        });

        let target = Path::new("/proc");
        assert!(syscall
            .mount(None, target, None, MsFlags::empty(), None)
            .is_err());
        assert!(syscall
            .mount(None, target, None, MsFlags::empty(), None)
            .is_ok());
        assert_eq!(syscall.get_mount_args().len(), 1);
    }

    #[test]
    fn test_calls_keep_issue_order() {
        let syscall = TestHelperSyscall::default();
        syscall.set_hostname("box").unwrap();
        syscall.set_keep_capabilities(true).unwrap();
        syscall.set_groups(&[Gid::from_raw(5)]).unwrap();

        // Call holds a CapSet, which has no PartialEq
        assert_eq!(
            format!("{:?}", syscall.get_calls()),
            format!(
                "{:?}",
                vec![
                    Call::Hostname("box".to_string()),
                    Call::KeepCapabilities(true),
                    Call::Groups(vec![Gid::from_raw(5)]),
                ]
            )
        );
    }
}
