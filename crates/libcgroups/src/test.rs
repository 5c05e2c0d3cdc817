#![cfg(test)]

use anyhow::{Context, Result};
use std::{
    io::Write,
    path::{Path, PathBuf},
};

/// Writes `val` to `filename` inside `dir`, creating the file as a cgroup
/// interface file stand-in.
pub fn set_fixture(dir: &Path, filename: &str, val: &str) -> Result<PathBuf> {
    let full_path = dir.join(filename);

    std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&full_path)
        .with_context(|| format!("failed to open {full_path:?}"))?
        .write_all(val.as_bytes())
        .with_context(|| format!("failed to write to {full_path:?}"))?;

    Ok(full_path)
}
