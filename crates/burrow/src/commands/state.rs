use std::path::PathBuf;

use anyhow::Result;
use liboci_cli::State;

use crate::commands::load_container;

/// Prints the container state, after reconciling it with the process
pub fn state(args: State, root_path: PathBuf) -> Result<()> {
    let mut container = load_container(root_path, &args.container_id)?;
    let state = container.get_state()?;
    println!("{}", serde_json::to_string_pretty(state)?);
    Ok(())
}
