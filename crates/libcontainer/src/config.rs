use std::fs;
use std::path::{Path, PathBuf};

use oci_spec::runtime::{Hooks, Spec};
use serde::{Deserialize, Serialize};

use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to save config to {path:?}")]
    Save {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to read config from {path:?}")]
    Load {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to (de)serialize config")]
    Serde(#[from] serde_json::Error),
}

type Result<T> = std::result::Result<T, ConfigError>;

const BURROW_CONFIG_NAME: &str = "burrow_config.json";

/// The parts of the spec that operations after `create` still need once
/// the bundle may have changed or gone away.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct BurrowConfig {
    pub hooks: Option<Hooks>,
    pub cgroup_path: Option<PathBuf>,
    /// Whether `create` placed the container in a cgroup that `delete` must
    /// remove.
    #[serde(default)]
    pub manage_cgroup: bool,
}

impl BurrowConfig {
    pub fn from_spec(spec: &Spec) -> Self {
        let linux = spec.linux().as_ref();
        BurrowConfig {
            hooks: spec.hooks().clone(),
            cgroup_path: linux.and_then(|l| l.cgroups_path().clone()),
            manage_cgroup: linux.map(|l| l.resources().is_some()).unwrap_or(false),
        }
    }

    pub fn save(&self, container_dir: &Path) -> Result<()> {
        let path = container_dir.join(BURROW_CONFIG_NAME);
        let encoded = serde_json::to_vec(self)?;
        utils::write_file_atomic(&path, encoded).map_err(|err| ConfigError::Save {
            source: err,
            path,
        })
    }

    pub fn load(container_dir: &Path) -> Result<Self> {
        let path = container_dir.join(BURROW_CONFIG_NAME);
        let file = fs::File::open(&path).map_err(|err| ConfigError::Load {
            source: err,
            path: path.clone(),
        })?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use oci_spec::runtime::{HookBuilder, HooksBuilder, LinuxBuilder, SpecBuilder};

    use super::*;

    #[test]
    fn test_config_from_spec() -> Result<()> {
        let hooks = HooksBuilder::default()
            .poststop(vec![HookBuilder::default().path("/bin/true").build()?])
            .build()?;
        let spec = SpecBuilder::default()
            .hooks(hooks.clone())
            .linux(
                LinuxBuilder::default()
                    .cgroups_path(PathBuf::from("system.slice:burrow:c1"))
                    .build()?,
            )
            .build()?;
        let config = BurrowConfig::from_spec(&spec);
        assert_eq!(config.hooks, Some(hooks));
        assert_eq!(
            config.cgroup_path,
            Some(PathBuf::from("system.slice:burrow:c1"))
        );
        Ok(())
    }

    #[test]
    fn test_config_save_and_load() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let config = BurrowConfig {
            hooks: None,
            cgroup_path: Some(PathBuf::from("/burrow/c1")),
            manage_cgroup: true,
        };
        config.save(tmp.path())?;
        assert_eq!(BurrowConfig::load(tmp.path())?, config);
        Ok(())
    }

    #[test]
    fn test_config_load_missing() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            BurrowConfig::load(tmp.path()),
            Err(ConfigError::Load { .. })
        ));
    }
}
