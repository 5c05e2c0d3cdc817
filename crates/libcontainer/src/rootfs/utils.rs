use std::path::PathBuf;
use std::str::FromStr;

use nix::mount::MsFlags;
use nix::sys::stat::SFlag;
use oci_spec::runtime::{LinuxDevice, LinuxDeviceBuilder, LinuxDeviceType, Mount, MountBuilder};

use crate::syscall::linux::{self, MountRecursive};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptionConfig {
    /// Mount Flags.
    pub flags: MsFlags,

    /// Mount data applied to the mount.
    pub data: String,

    /// Propagation change applied with a second mount call after the mount.
    pub propagation: Option<MsFlags>,

    /// RecAttr represents mount properties to be applied recursively.
    pub rec_attr: Option<linux::MountAttr>,
}

// (path, major, minor), all character devices with mode 0666
const DEFAULT_DEVICES: &[(&str, i64, i64)] = &[
    ("/dev/null", 1, 3),
    ("/dev/zero", 1, 5),
    ("/dev/full", 1, 7),
    ("/dev/tty", 5, 0),
    ("/dev/urandom", 1, 9),
    ("/dev/random", 1, 8),
];

pub fn default_devices() -> Result<Vec<LinuxDevice>, oci_spec::OciSpecError> {
    DEFAULT_DEVICES
        .iter()
        .map(|(path, major, minor)| {
            LinuxDeviceBuilder::default()
                .path(PathBuf::from(path))
                .typ(LinuxDeviceType::C)
                .major(*major)
                .minor(*minor)
                .file_mode(0o0666u32)
                .uid(0u32)
                .gid(0u32)
                .build()
        })
        .collect()
}

/// The `/dev/pts` mount every container gets after its spec mounts.
pub fn devpts_mount() -> Result<Mount, oci_spec::OciSpecError> {
    MountBuilder::default()
        .destination(PathBuf::from("/dev/pts"))
        .typ("devpts")
        .source(PathBuf::from("devpts"))
        .options(
            [
                "nosuid",
                "noexec",
                "newinstance",
                "ptmxmode=0666",
                "mode=0620",
                "gid=5",
            ]
            .iter()
            .map(|o| o.to_string())
            .collect::<Vec<String>>(),
        )
        .build()
}

/// Every mount option `parse_mount` turns into flags, propagation or
/// recursive attributes. Anything else is passed to the filesystem as data.
pub const KNOWN_MOUNT_OPTIONS: &[&str] = &[
    "async", "atime", "bind", "defaults", "dev", "diratime", "dirsync", "exec", "iversion",
    "lazytime", "loud", "mand", "noatime", "nodev", "nodiratime", "noexec", "noiversion",
    "nolazytime", "nomand", "norelatime", "nostrictatime", "nosuid", "private", "ratime",
    "rbind", "rdev", "rdiratime", "relatime", "remount", "rexec", "rnoatime", "rnodev",
    "rnodiratime", "rnoexec", "rnorelatime", "rnostrictatime", "rnosuid", "rnosymfollow", "ro",
    "rprivate", "rrelatime", "rro", "rrw", "rshared", "rslave", "rstrictatime", "rsuid",
    "rsymfollow", "runbindable", "rw", "shared", "silent", "slave", "strictatime", "suid",
    "sync", "unbindable",
];

pub fn to_sflag(dev_type: LinuxDeviceType) -> SFlag {
    match dev_type {
        LinuxDeviceType::A => SFlag::S_IFBLK | SFlag::S_IFCHR | SFlag::S_IFIFO,
        LinuxDeviceType::B => SFlag::S_IFBLK,
        LinuxDeviceType::C | LinuxDeviceType::U => SFlag::S_IFCHR,
        LinuxDeviceType::P => SFlag::S_IFIFO,
    }
}

fn propagation_flag(option: &str) -> Option<MsFlags> {
    match option {
        "private" => Some(MsFlags::MS_PRIVATE),
        "rprivate" => Some(MsFlags::MS_PRIVATE | MsFlags::MS_REC),
        "shared" => Some(MsFlags::MS_SHARED),
        "rshared" => Some(MsFlags::MS_SHARED | MsFlags::MS_REC),
        "slave" => Some(MsFlags::MS_SLAVE),
        "rslave" => Some(MsFlags::MS_SLAVE | MsFlags::MS_REC),
        "unbindable" => Some(MsFlags::MS_UNBINDABLE),
        "runbindable" => Some(MsFlags::MS_UNBINDABLE | MsFlags::MS_REC),
        _ => None,
    }
}

/// True for mounts that bind an existing path rather than mount a
/// filesystem.
pub fn is_bind_mount(m: &Mount) -> bool {
    m.typ().as_deref() == Some("bind")
        || m.options()
            .as_ref()
            .map(|opts| opts.iter().any(|o| o == "bind" || o == "rbind"))
            .unwrap_or(false)
}

/// Translates the option strings of a mount into flags, data, a deferred
/// propagation change and recursive attributes. Options that are not flags
/// are passed through as filesystem data.
pub fn parse_mount(m: &Mount) -> MountOptionConfig {
    let mut flags = MsFlags::empty();
    let mut data = Vec::new();
    let mut propagation = None;
    let mut mount_attr: Option<linux::MountAttr> = None;

    for option in m.options().as_deref().unwrap_or_default() {
        if let Ok(mount_attr_option) = MountRecursive::from_str(option.as_str()) {
            // Some options aren't corresponding to the mount flags.
            // These options need `AT_RECURSIVE` options.
            // ref: https://github.com/opencontainers/runtime-spec/blob/main/config.md#linux-mount-options
            let (is_clear, flag) = mount_attr_option.flag();
            let mount_attr = mount_attr.get_or_insert_with(Default::default);
            if is_clear {
                mount_attr.attr_clr |= flag;
            } else {
                mount_attr.attr_set |= flag;
                if flag & linux::MOUNT_ATTR__ATIME == flag {
                    // https://man7.org/linux/man-pages/man2/mount_setattr.2.html
                    // the access-time setting in attr_set also needs
                    // MOUNT_ATTR__ATIME in attr_clr.
                    mount_attr.attr_clr |= linux::MOUNT_ATTR__ATIME;
                }
            }
            if matches!(mount_attr_option, MountRecursive::Rdonly(false, _)) {
                flags |= MsFlags::MS_RDONLY;
            }
            continue;
        }

        if let Some(flag) = propagation_flag(option) {
            propagation = Some(flag);
            continue;
        }

        if let Some((is_clear, flag)) = match option.as_str() {
            "defaults" => Some((false, MsFlags::empty())),
            "ro" => Some((false, MsFlags::MS_RDONLY)),
            "rw" => Some((true, MsFlags::MS_RDONLY)),
            "suid" => Some((true, MsFlags::MS_NOSUID)),
            "nosuid" => Some((false, MsFlags::MS_NOSUID)),
            "dev" => Some((true, MsFlags::MS_NODEV)),
            "nodev" => Some((false, MsFlags::MS_NODEV)),
            "exec" => Some((true, MsFlags::MS_NOEXEC)),
            "noexec" => Some((false, MsFlags::MS_NOEXEC)),
            "sync" => Some((false, MsFlags::MS_SYNCHRONOUS)),
            "async" => Some((true, MsFlags::MS_SYNCHRONOUS)),
            "dirsync" => Some((false, MsFlags::MS_DIRSYNC)),
            "remount" => Some((false, MsFlags::MS_REMOUNT)),
            "mand" => Some((false, MsFlags::MS_MANDLOCK)),
            "nomand" => Some((true, MsFlags::MS_MANDLOCK)),
            "atime" => Some((true, MsFlags::MS_NOATIME)),
            "noatime" => Some((false, MsFlags::MS_NOATIME)),
            "diratime" => Some((true, MsFlags::MS_NODIRATIME)),
            "nodiratime" => Some((false, MsFlags::MS_NODIRATIME)),
            "bind" => Some((false, MsFlags::MS_BIND)),
            "rbind" => Some((false, MsFlags::MS_BIND | MsFlags::MS_REC)),
            "relatime" => Some((false, MsFlags::MS_RELATIME)),
            "norelatime" => Some((true, MsFlags::MS_RELATIME)),
            "strictatime" => Some((false, MsFlags::MS_STRICTATIME)),
            "nostrictatime" => Some((true, MsFlags::MS_STRICTATIME)),
            "iversion" => Some((false, MsFlags::MS_I_VERSION)),
            "noiversion" => Some((true, MsFlags::MS_I_VERSION)),
            "lazytime" => Some((false, MsFlags::MS_LAZYTIME)),
            "nolazytime" => Some((true, MsFlags::MS_LAZYTIME)),
            "silent" => Some((false, MsFlags::MS_SILENT)),
            "loud" => Some((true, MsFlags::MS_SILENT)),
            _ => None,
        } {
            if is_clear {
                flags &= !flag;
            } else {
                flags |= flag;
            }
            continue;
        }

        data.push(option.as_str());
    }

    MountOptionConfig {
        flags,
        data: data.join(","),
        propagation,
        rec_attr: mount_attr,
    }
}
