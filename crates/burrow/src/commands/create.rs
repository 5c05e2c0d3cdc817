//! Handles the creation of a new container
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use libcontainer::container::builder::ContainerBuilder;
use libcontainer::syscall::syscall::SyscallType;
use liboci_cli::{Create, GlobalOpts};

// One thing to note is that in the end, container is just another process in Linux
// it has specific/different control group, namespace, using which program executing in it
// can be given impression that is is running on a complete system, but on the system which
// it is running, it is just another process, and has attributes such as pid, file descriptors, etc.
// associated with it like any other process.
pub fn create(args: Create, root_path: PathBuf, global: &GlobalOpts) -> Result<()> {
    let reexec_args = reexec_args(&root_path, global, &args.container_id);
    ContainerBuilder::new(args.container_id.clone(), SyscallType::default())
        .with_root_path(root_path)?
        .with_pid_file(args.pid_file.as_ref())?
        .with_console_socket(args.console_socket.as_ref())
        .with_reexec_args(reexec_args)
        .as_init(&args.bundle)
        .build()
        .with_context(|| format!("failed to create container {}", args.container_id))?;

    Ok(())
}

// The container process re-enters this binary and must log to the same
// place, in the same format, as the invocation that created it.
pub(super) fn reexec_args(root_path: &Path, global: &GlobalOpts, container_id: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--root".into(), root_path.into()];
    if let Some(log) = &global.log {
        args.push("--log".into());
        args.push(log.into());
    }
    if let Some(format) = &global.log_format {
        args.push("--log-format".into());
        args.push(format.into());
    }
    if global.debug {
        args.push("--debug".into());
    }
    args.push("reexec".into());
    args.push(container_id.into());
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn global() -> GlobalOpts {
        GlobalOpts {
            log: None,
            debug: false,
            log_format: None,
            root: None,
            systemd_cgroup: false,
        }
    }

    #[test]
    fn test_reexec_args_minimal() {
        let args = reexec_args(Path::new("/run/burrow"), &global(), "c1");
        assert_eq!(args, vec!["--root", "/run/burrow", "reexec", "c1"]);
    }

    #[test]
    fn test_reexec_args_forward_logging() {
        let opts = GlobalOpts {
            log: Some(PathBuf::from("/var/log/burrow.log")),
            log_format: Some("json".to_owned()),
            debug: true,
            ..global()
        };
        let args = reexec_args(Path::new("/run/burrow"), &opts, "c1");
        assert_eq!(
            args,
            vec![
                "--root",
                "/run/burrow",
                "--log",
                "/var/log/burrow.log",
                "--log-format",
                "json",
                "--debug",
                "reexec",
                "c1"
            ]
        );
    }
}
