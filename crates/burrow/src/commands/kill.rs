//! Contains functionality of kill container command
use std::path::PathBuf;

use anyhow::{Context, Result};
use libcontainer::signal::Signal;
use liboci_cli::Kill;

use crate::commands::load_container;

pub fn kill(args: Kill, root_path: PathBuf) -> Result<()> {
    let signal: Signal = args.signal.as_str().try_into()?;
    let mut container = load_container(root_path, &args.container_id)?;
    container
        .kill(signal, args.all)
        .with_context(|| format!("failed to send {signal} to container {}", args.container_id))
}
