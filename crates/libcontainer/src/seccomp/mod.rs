use std::num::TryFromIntError;

use libseccomp::{
    ScmpAction, ScmpArch, ScmpArgCompare, ScmpCompareOp, ScmpFilterContext, ScmpSyscall,
};
use oci_spec::runtime::{
    Arch, LinuxSeccomp, LinuxSeccompAction, LinuxSeccompFilterFlag, LinuxSeccompOperator,
};

#[derive(Debug, thiserror::Error)]
pub enum SeccompError {
    #[error("failed to translate trace action due to failed to convert errno {errno} into i16")]
    TraceAction { source: TryFromIntError, errno: i32 },
    #[error("SCMP_ACT_NOTIFY is not supported")]
    NotifyUnsupported,
    #[error("failed to add arch to seccomp")]
    AddArch {
        source: libseccomp::error::SeccompError,
        arch: Arch,
    },
    #[error("failed to load seccomp context")]
    LoadContext {
        source: libseccomp::error::SeccompError,
    },
    #[error("failed to add rule for {name}")]
    AddRule {
        name: String,
        source: libseccomp::error::SeccompError,
    },
    #[error("failed to create new seccomp filter")]
    NewFilter {
        source: libseccomp::error::SeccompError,
        default: LinuxSeccompAction,
    },
    #[error("failed to set filter flag")]
    SetFilterFlag {
        source: libseccomp::error::SeccompError,
        flag: LinuxSeccompFilterFlag,
    },
    #[error("failed to set SCMP_FLTATR_CTL_NNP")]
    SetCtlNnp {
        source: libseccomp::error::SeccompError,
    },
}

type Result<T> = std::result::Result<T, SeccompError>;

fn translate_arch(arch: Arch) -> ScmpArch {
    match arch {
        Arch::ScmpArchNative => ScmpArch::Native,
        Arch::ScmpArchX86 => ScmpArch::X86,
        Arch::ScmpArchX86_64 => ScmpArch::X8664,
        Arch::ScmpArchX32 => ScmpArch::X32,
        Arch::ScmpArchArm => ScmpArch::Arm,
        Arch::ScmpArchAarch64 => ScmpArch::Aarch64,
        Arch::ScmpArchMips => ScmpArch::Mips,
        Arch::ScmpArchMips64 => ScmpArch::Mips64,
        Arch::ScmpArchMips64n32 => ScmpArch::Mips64N32,
        Arch::ScmpArchMipsel => ScmpArch::Mipsel,
        Arch::ScmpArchMipsel64 => ScmpArch::Mipsel64,
        Arch::ScmpArchMipsel64n32 => ScmpArch::Mipsel64N32,
        Arch::ScmpArchPpc => ScmpArch::Ppc,
        Arch::ScmpArchPpc64 => ScmpArch::Ppc64,
        Arch::ScmpArchPpc64le => ScmpArch::Ppc64Le,
        Arch::ScmpArchS390 => ScmpArch::S390,
        Arch::ScmpArchS390x => ScmpArch::S390X,
        Arch::ScmpArchRiscv64 => ScmpArch::Riscv64,
    }
}

fn translate_action(action: LinuxSeccompAction, errno: Option<u32>) -> Result<ScmpAction> {
    let errno = errno.map(|e| e as i32).unwrap_or(libc::EPERM);
    let action = match action {
        LinuxSeccompAction::ScmpActKill => ScmpAction::KillThread,
        LinuxSeccompAction::ScmpActTrap => ScmpAction::Trap,
        LinuxSeccompAction::ScmpActErrno => ScmpAction::Errno(errno),
        LinuxSeccompAction::ScmpActTrace => ScmpAction::Trace(
            errno
                .try_into()
                .map_err(|err| SeccompError::TraceAction { source: err, errno })?,
        ),
        LinuxSeccompAction::ScmpActAllow => ScmpAction::Allow,
        LinuxSeccompAction::ScmpActKillProcess => ScmpAction::KillProcess,
        LinuxSeccompAction::ScmpActNotify => return Err(SeccompError::NotifyUnsupported),
        LinuxSeccompAction::ScmpActLog => ScmpAction::Log,
        LinuxSeccompAction::ScmpActKillThread => ScmpAction::KillThread,
    };

    tracing::trace!(?action, "translated action");
    Ok(action)
}

fn translate_op(op: LinuxSeccompOperator, datum_b: Option<u64>) -> ScmpCompareOp {
    match op {
        LinuxSeccompOperator::ScmpCmpNe => ScmpCompareOp::NotEqual,
        LinuxSeccompOperator::ScmpCmpLt => ScmpCompareOp::Less,
        LinuxSeccompOperator::ScmpCmpLe => ScmpCompareOp::LessOrEqual,
        LinuxSeccompOperator::ScmpCmpEq => ScmpCompareOp::Equal,
        LinuxSeccompOperator::ScmpCmpGe => ScmpCompareOp::GreaterEqual,
        LinuxSeccompOperator::ScmpCmpGt => ScmpCompareOp::Greater,
        LinuxSeccompOperator::ScmpCmpMaskedEq => ScmpCompareOp::MaskedEqual(datum_b.unwrap_or(0)),
    }
}

/// Rules added on top of a profile whose default action is an errno.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workaround {
    /// libc falls back to clone only on ENOSYS, not on the default errno.
    Clone3Enosys,
    /// libc prefers faccessat2 and does not fall back to faccessat on EPERM.
    AllowFaccessat2,
}

impl Workaround {
    fn syscall_name(&self) -> &'static str {
        match self {
            Workaround::Clone3Enosys => "clone3",
            Workaround::AllowFaccessat2 => "faccessat2",
        }
    }

    fn action(&self) -> ScmpAction {
        match self {
            Workaround::Clone3Enosys => ScmpAction::Errno(libc::ENOSYS),
            Workaround::AllowFaccessat2 => ScmpAction::Allow,
        }
    }
}

pub fn workarounds(seccomp: &LinuxSeccomp) -> Vec<Workaround> {
    if seccomp.default_action() != LinuxSeccompAction::ScmpActErrno {
        return vec![];
    }

    let syscalls = seccomp.syscalls().as_deref().unwrap_or_default();
    let names = |action: Option<LinuxSeccompAction>, name: &str| {
        syscalls.iter().any(|sc| {
            action.map_or(true, |a| sc.action() == a) && sc.names().iter().any(|n| n == name)
        })
    };

    let mut extra = vec![];
    if !names(Some(LinuxSeccompAction::ScmpActAllow), "clone3") {
        extra.push(Workaround::Clone3Enosys);
    }
    if names(Some(LinuxSeccompAction::ScmpActAllow), "faccessat") && !names(None, "faccessat2") {
        extra.push(Workaround::AllowFaccessat2);
    }
    extra
}

/// Compiles the profile and loads it into the calling process.
#[tracing::instrument(level = "trace", skip(seccomp))]
pub fn initialize_seccomp(seccomp: &LinuxSeccomp) -> Result<()> {
    tracing::trace!(default_action = ?seccomp.default_action(), errno = ?seccomp.default_errno_ret(), "initializing seccomp");
    let default_action = translate_action(seccomp.default_action(), seccomp.default_errno_ret())?;
    let mut ctx =
        ScmpFilterContext::new_filter(default_action).map_err(|err| SeccompError::NewFilter {
            source: err,
            default: seccomp.default_action(),
        })?;

    if let Some(flags) = seccomp.flags() {
        for flag in flags {
            match flag {
                LinuxSeccompFilterFlag::SeccompFilterFlagLog => ctx.set_ctl_log(true),
                LinuxSeccompFilterFlag::SeccompFilterFlagTsync => ctx.set_ctl_tsync(true),
                LinuxSeccompFilterFlag::SeccompFilterFlagSpecAllow => ctx.set_ctl_ssb(true),
            }
            .map_err(|err| SeccompError::SetFilterFlag {
                source: err,
                flag: *flag,
            })?;
        }
    }

    if let Some(architectures) = seccomp.architectures() {
        for &arch in architectures {
            tracing::trace!(?arch, "adding architecture");
            ctx.add_arch(translate_arch(arch))
                .map_err(|err| SeccompError::AddArch { source: err, arch })?;
        }
    }

    // no_new_privs is set by the init pipeline when the process asks for it,
    // never as a side effect of loading the filter
    ctx.set_ctl_nnp(false)
        .map_err(|err| SeccompError::SetCtlNnp { source: err })?;

    for syscall in seccomp.syscalls().iter().flatten() {
        let action = translate_action(syscall.action(), syscall.errno_ret())?;
        if action == default_action {
            tracing::warn!(?syscall, "seccomp rule repeats the default action, skipping");
            continue;
        }

        for name in syscall.names() {
            let Ok(sc) = ScmpSyscall::from_name(name) else {
                tracing::warn!(?name, "unknown syscall, the kernel likely lacks it");
                continue;
            };
            let add_err = |err| SeccompError::AddRule {
                name: name.clone(),
                source: err,
            };
            match syscall.args() {
                // each argument may be compared only once per rule
                Some(args) => {
                    for arg in args {
                        let cmp = ScmpArgCompare::new(
                            arg.index() as u32,
                            translate_op(arg.op(), arg.value_two()),
                            arg.value(),
                        );
                        tracing::trace!(?name, ?action, ?arg, "add seccomp conditional rule");
                        ctx.add_rule_conditional(action, sc, &[cmp])
                            .map_err(add_err)?;
                    }
                }
                None => {
                    tracing::trace!(?name, ?action, "add seccomp rule");
                    ctx.add_rule(action, sc).map_err(add_err)?;
                }
            }
        }
    }

    for extra in workarounds(seccomp) {
        let name = extra.syscall_name();
        let Ok(sc) = ScmpSyscall::from_name(name) else {
            tracing::debug!(name, "syscall not known to libseccomp, no workaround");
            continue;
        };
        tracing::debug!(?extra, "adding seccomp workaround rule");
        ctx.add_rule(extra.action(), sc)
            .map_err(|err| SeccompError::AddRule {
                name: name.to_string(),
                source: err,
            })?;
    }

    // SECCOMP_SET_MODE_FILTER needs CAP_SYS_ADMIN or no_new_privs
    ctx.load()
        .map_err(|err| SeccompError::LoadContext { source: err })?;

    Ok(())
}
