use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use libcontainer::container::Container;

pub mod create;
pub mod delete;
pub mod features;
pub mod kill;
pub mod list;
pub mod ps;
pub mod reexec;
pub mod run;
pub mod start;
pub mod state;

fn construct_container_root<P: AsRef<Path>>(root_path: P, container_id: &str) -> Result<PathBuf> {
    // resolves relative paths, symbolic links etc. and get complete path
    let root_path = fs::canonicalize(&root_path).with_context(|| {
        format!(
            "failed to canonicalize {} for container {}",
            root_path.as_ref().display(),
            container_id
        )
    })?;
    // the state of the container is stored in a directory named after the container id
    Ok(root_path.join(container_id))
}

fn load_container<P: AsRef<Path>>(root_path: P, container_id: &str) -> Result<Container> {
    let container_root = construct_container_root(root_path, container_id)?;
    if !container_root.exists() {
        bail!("container {} does not exist", container_id)
    }

    Container::load(container_root)
        .with_context(|| format!("could not load state for container {container_id}"))
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;

    #[test]
    fn test_load_missing_container() -> Result<()> {
        let root = tempfile::tempdir()?;
        let err = load_container(root.path(), "absent").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        Ok(())
    }

    #[test]
    fn test_construct_container_root_resolves_relative() -> Result<()> {
        let root = tempfile::tempdir()?;
        fs::create_dir(root.path().join("nested"))?;
        let path = construct_container_root(root.path().join("nested/.."), "c1")?;
        assert_eq!(path, root.path().canonicalize()?.join("c1"));
        Ok(())
    }
}
