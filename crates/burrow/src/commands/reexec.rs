//! Entry point of the container process after it re-enters the runtime
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use libcontainer::process::container_init_process::container_init_process;

/// Set up the container from inside its namespaces (internal)
#[derive(Parser, Debug)]
pub struct Reexec {
    #[clap(value_parser = clap::builder::NonEmptyStringValueParser::new(), required = true)]
    pub container_id: String,
}

/// Only returns when the container has no process to run, or on error.
pub fn reexec(args: Reexec, root_path: PathBuf) -> Result<()> {
    let container_dir = root_path.join(&args.container_id);
    container_init_process(&container_dir)
        .with_context(|| format!("failed to initialize container {}", args.container_id))
}
