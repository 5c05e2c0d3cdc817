//! Capability sets of the container process.
//!
//! The bounding set is dropped before the user switch and the remaining
//! sets are applied after it, see `process::container_init_process`.
use caps::{CapSet, Capability as CapsCapability, CapsHashSet};
use oci_spec::runtime::{Capabilities, Capability as SpecCapability, LinuxCapabilities};

use crate::syscall::{Syscall, SyscallError};

/// Converts a list of capability types to capabilities hash set
fn to_set(caps: &Capabilities) -> CapsHashSet {
    caps.iter().map(|c| c.to_cap()).collect()
}

pub trait CapabilityExt {
    /// Convert self to caps::Capability
    fn to_cap(&self) -> caps::Capability;
}

impl CapabilityExt for SpecCapability {
    fn to_cap(&self) -> caps::Capability {
        match self {
            SpecCapability::AuditControl => CapsCapability::CAP_AUDIT_CONTROL,
            SpecCapability::AuditRead => CapsCapability::CAP_AUDIT_READ,
            SpecCapability::AuditWrite => CapsCapability::CAP_AUDIT_WRITE,
            SpecCapability::BlockSuspend => CapsCapability::CAP_BLOCK_SUSPEND,
            SpecCapability::Bpf => CapsCapability::CAP_BPF,
            SpecCapability::CheckpointRestore => CapsCapability::CAP_CHECKPOINT_RESTORE,
            SpecCapability::Chown => CapsCapability::CAP_CHOWN,
            SpecCapability::DacOverride => CapsCapability::CAP_DAC_OVERRIDE,
            SpecCapability::DacReadSearch => CapsCapability::CAP_DAC_READ_SEARCH,
            SpecCapability::Fowner => CapsCapability::CAP_FOWNER,
            SpecCapability::Fsetid => CapsCapability::CAP_FSETID,
            SpecCapability::IpcLock => CapsCapability::CAP_IPC_LOCK,
            SpecCapability::IpcOwner => CapsCapability::CAP_IPC_OWNER,
            SpecCapability::Kill => CapsCapability::CAP_KILL,
            SpecCapability::Lease => CapsCapability::CAP_LEASE,
            SpecCapability::LinuxImmutable => CapsCapability::CAP_LINUX_IMMUTABLE,
            SpecCapability::MacAdmin => CapsCapability::CAP_MAC_ADMIN,
            SpecCapability::MacOverride => CapsCapability::CAP_MAC_OVERRIDE,
            SpecCapability::Mknod => CapsCapability::CAP_MKNOD,
            SpecCapability::NetAdmin => CapsCapability::CAP_NET_ADMIN,
            SpecCapability::NetBindService => CapsCapability::CAP_NET_BIND_SERVICE,
            SpecCapability::NetBroadcast => CapsCapability::CAP_NET_BROADCAST,
            SpecCapability::NetRaw => CapsCapability::CAP_NET_RAW,
            SpecCapability::Perfmon => CapsCapability::CAP_PERFMON,
            SpecCapability::Setgid => CapsCapability::CAP_SETGID,
            SpecCapability::Setfcap => CapsCapability::CAP_SETFCAP,
            SpecCapability::Setpcap => CapsCapability::CAP_SETPCAP,
            SpecCapability::Setuid => CapsCapability::CAP_SETUID,
            SpecCapability::SysAdmin => CapsCapability::CAP_SYS_ADMIN,
            SpecCapability::SysBoot => CapsCapability::CAP_SYS_BOOT,
            SpecCapability::SysChroot => CapsCapability::CAP_SYS_CHROOT,
            SpecCapability::SysModule => CapsCapability::CAP_SYS_MODULE,
            SpecCapability::SysNice => CapsCapability::CAP_SYS_NICE,
            SpecCapability::SysPacct => CapsCapability::CAP_SYS_PACCT,
            SpecCapability::SysPtrace => CapsCapability::CAP_SYS_PTRACE,
            SpecCapability::SysRawio => CapsCapability::CAP_SYS_RAWIO,
            SpecCapability::SysResource => CapsCapability::CAP_SYS_RESOURCE,
            SpecCapability::SysTime => CapsCapability::CAP_SYS_TIME,
            SpecCapability::SysTtyConfig => CapsCapability::CAP_SYS_TTY_CONFIG,
            SpecCapability::Syslog => CapsCapability::CAP_SYSLOG,
            SpecCapability::WakeAlarm => CapsCapability::CAP_WAKE_ALARM,
        }
    }
}

/// True when the configuration asks the process to keep any capability
/// across the user switch.
pub fn retains_any(cs: &LinuxCapabilities) -> bool {
    [cs.effective(), cs.permitted(), cs.inheritable(), cs.ambient()]
        .iter()
        .any(|set| set.as_ref().map(|s| !s.is_empty()).unwrap_or(false))
}

/// Drops every capability outside the configured bounding set. An absent
/// bounding set leaves the inherited one untouched.
pub fn drop_bounding<S: Syscall + ?Sized>(
    cs: &LinuxCapabilities,
    syscall: &S,
) -> Result<(), SyscallError> {
    if let Some(bounding) = cs.bounding() {
        tracing::debug!(?bounding, "dropping bounding capabilities");
        syscall.set_capability(CapSet::Bounding, &to_set(bounding))?;
    }
    Ok(())
}

/// Applies the effective, permitted, inheritable and ambient sets, in that
/// order. Absent sets are cleared.
pub fn apply_sets<S: Syscall + ?Sized>(
    cs: &LinuxCapabilities,
    syscall: &S,
) -> Result<(), SyscallError> {
    let sets = [
        (CapSet::Effective, cs.effective()),
        (CapSet::Permitted, cs.permitted()),
        (CapSet::Inheritable, cs.inheritable()),
    ];
    for (set, caps) in sets {
        let caps = caps.as_ref().map(to_set).unwrap_or_default();
        syscall.set_capability(set, &caps)?;
    }

    // ambient capabilities need kernel 4.3
    let ambient = cs.ambient().as_ref().map(to_set).unwrap_or_default();
    if let Err(err) = syscall.set_capability(CapSet::Ambient, &ambient) {
        tracing::warn!(%err, "failed to set ambient capabilities");
    }

    Ok(())
}
