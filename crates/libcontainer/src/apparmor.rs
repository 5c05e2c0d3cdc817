use std::fs;
use std::path::{Path, PathBuf};

use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum AppArmorError {
    #[error("failed to write apparmor profile {profile:?} to {path:?}")]
    Activate {
        path: PathBuf,
        profile: String,
        source: std::io::Error,
    },
    #[error(transparent)]
    EnsureProcfs(#[from] utils::EnsureProcfsError),
}

type Result<T> = std::result::Result<T, AppArmorError>;

const ENABLED_PARAMETER_PATH: &str = "/sys/module/apparmor/parameters/enabled";

// Since Linux 5.8 each LSM has its own attr directory.
const MODULE_ATTR_EXEC: &str = "/proc/self/attr/apparmor/exec";
const LEGACY_ATTR_EXEC: &str = "/proc/self/attr/exec";

pub fn is_enabled() -> std::io::Result<bool> {
    let enabled = fs::read_to_string(ENABLED_PARAMETER_PATH)?;
    Ok(enabled.starts_with('Y'))
}

/// Requests `profile` for the next exec of the calling process.
pub fn apply_profile(profile: &str) -> Result<()> {
    if profile.is_empty() {
        return Ok(());
    }

    match write_exec_attr(Path::new(MODULE_ATTR_EXEC), profile) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::debug!(%err, "apparmor attr dir unavailable, trying legacy interface");
            write_exec_attr(Path::new(LEGACY_ATTR_EXEC), profile)
        }
    }
}

fn exec_payload(profile: &str) -> String {
    format!("exec {profile}")
}

fn write_exec_attr(path: &Path, profile: &str) -> Result<()> {
    utils::ensure_procfs(path)?;
    fs::write(path, exec_payload(profile)).map_err(|err| AppArmorError::Activate {
        path: path.to_owned(),
        profile: profile.to_owned(),
        source: err,
    })
}
