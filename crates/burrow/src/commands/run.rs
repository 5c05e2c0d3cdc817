//! Creates a container and starts it in one step
use std::path::PathBuf;

use anyhow::{Context, Result};
use libcontainer::container::builder::ContainerBuilder;
use libcontainer::syscall::syscall::SyscallType;
use liboci_cli::{GlobalOpts, Run};

use crate::commands::create::reexec_args;

pub fn run(args: Run, root_path: PathBuf, global: &GlobalOpts) -> Result<()> {
    let reexec_args = reexec_args(&root_path, global, &args.container_id);
    let container = ContainerBuilder::new(args.container_id.clone(), SyscallType::default())
        .with_root_path(root_path)?
        .with_pid_file(args.pid_file.as_ref())?
        .with_console_socket(args.console_socket.as_ref())
        .with_reexec_args(reexec_args)
        .as_init(&args.bundle)
        .run()
        .with_context(|| format!("failed to run container {}", args.container_id))?;

    tracing::debug!(id = container.id(), status = ?container.status(), "container is running");
    Ok(())
}
