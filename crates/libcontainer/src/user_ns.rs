//! Id mappings for containers that create their own user namespace.
use std::fs;
use std::path::PathBuf;

use nix::unistd::Pid;
use oci_spec::runtime::{Linux, LinuxIdMapping, LinuxNamespaceType, Mount, Spec};

use crate::error::MissingSpecError;
use crate::namespaces::{NamespaceError, Namespaces};

#[derive(Debug, thiserror::Error)]
pub enum UserNamespaceError {
    #[error(transparent)]
    MissingSpec(#[from] MissingSpecError),
    #[error(transparent)]
    Namespaces(#[from] NamespaceError),
    #[error("new user namespace requires uid mappings")]
    NoUIDMappings,
    #[error("new user namespace requires gid mappings")]
    NoGIDMappings,
    #[error("supplementary group {0} is not mapped in the user namespace")]
    GidNotMapped(u32),
    #[error("mount option {option:?} names an id that is not mapped")]
    MountIdNotMapped { option: String },
    #[error("failed to parse id in mount option {option:?}")]
    ParseID {
        option: String,
        source: std::num::ParseIntError,
    },
    #[error("failed to write {path:?}")]
    WriteMapping {
        path: PathBuf,
        source: std::io::Error,
    },
}

type Result<T> = std::result::Result<T, UserNamespaceError>;

/// Writes the mapping files of another process. The proc root is
/// replaceable so tests can point it at a scratch directory.
#[derive(Debug, Clone)]
pub struct IdMapper {
    proc_root: PathBuf,
}

impl Default for IdMapper {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl IdMapper {
    pub fn with_proc_root<P: Into<PathBuf>>(proc_root: P) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    fn file(&self, pid: Pid, name: &str) -> PathBuf {
        self.proc_root.join(pid.to_string()).join(name)
    }

    fn write(&self, pid: Pid, name: &str, content: &str) -> Result<()> {
        let path = self.file(pid, name);
        tracing::debug!(?path, content, "write id mapping");
        fs::write(&path, content).map_err(|err| {
            tracing::error!(?path, %err, "failed to write id mapping");
            UserNamespaceError::WriteMapping { path, source: err }
        })
    }
}

/// Mappings for a container that asks for a new user namespace.
#[derive(Debug, Clone)]
pub struct UserNamespaceConfig {
    uid_mappings: Vec<LinuxIdMapping>,
    gid_mappings: Vec<LinuxIdMapping>,
    mapper: IdMapper,
}

impl UserNamespaceConfig {
    /// Returns `None` unless the spec creates a new user namespace. Joining
    /// an existing one by path needs no mappings.
    pub fn new(spec: &Spec) -> Result<Option<Self>> {
        let linux = spec.linux().as_ref().ok_or(MissingSpecError::Linux)?;
        let namespaces = Namespaces::try_from(linux.namespaces().as_ref())?;
        if !namespaces.is_new(LinuxNamespaceType::User) {
            return Ok(None);
        }

        let config = Self::try_from(linux)?;
        config.validate(spec)?;
        Ok(Some(config))
    }

    pub fn with_mapper(mut self, mapper: IdMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Writes `uid_map`, then `setgroups` as `deny`, then `gid_map` for
    /// `pid`. The kernel refuses `gid_map` from an unprivileged writer
    /// until setgroups is denied.
    pub fn write_mappings(&self, pid: Pid) -> Result<()> {
        self.mapper
            .write(pid, "uid_map", &format_mappings(&self.uid_mappings))?;
        self.mapper.write(pid, "setgroups", "deny")?;
        self.mapper
            .write(pid, "gid_map", &format_mappings(&self.gid_mappings))?;
        Ok(())
    }

    fn validate(&self, spec: &Spec) -> Result<()> {
        if let Some(mounts) = spec.mounts() {
            validate_mounts(mounts, &self.uid_mappings, &self.gid_mappings)?;
        }

        let additional_gids = spec
            .process()
            .as_ref()
            .and_then(|process| process.user().additional_gids().clone())
            .unwrap_or_default();
        for gid in additional_gids {
            if !is_id_mapped(gid, &self.gid_mappings) {
                tracing::error!(gid, "supplementary group is not mapped");
                return Err(UserNamespaceError::GidNotMapped(gid));
            }
        }
        Ok(())
    }
}

impl TryFrom<&Linux> for UserNamespaceConfig {
    type Error = UserNamespaceError;

    fn try_from(linux: &Linux) -> Result<Self> {
        let uid_mappings = linux
            .uid_mappings()
            .clone()
            .filter(|m| !m.is_empty())
            .ok_or(UserNamespaceError::NoUIDMappings)?;
        let gid_mappings = linux
            .gid_mappings()
            .clone()
            .filter(|m| !m.is_empty())
            .ok_or(UserNamespaceError::NoGIDMappings)?;
        Ok(Self {
            uid_mappings,
            gid_mappings,
            mapper: IdMapper::default(),
        })
    }
}

/// One `container host size` line per mapping. All lines must reach the
/// kernel in a single write.
fn format_mappings(mappings: &[LinuxIdMapping]) -> String {
    mappings
        .iter()
        .map(|m| format!("{} {} {}\n", m.container_id(), m.host_id(), m.size()))
        .collect()
}

fn validate_mounts(
    mounts: &[Mount],
    uid_mappings: &[LinuxIdMapping],
    gid_mappings: &[LinuxIdMapping],
) -> Result<()> {
    for option in mounts.iter().flat_map(|m| m.options().iter().flatten()) {
        let (value, mappings) = if let Some(v) = option.strip_prefix("uid=") {
            (v, uid_mappings)
        } else if let Some(v) = option.strip_prefix("gid=") {
            (v, gid_mappings)
        } else {
            continue;
        };

        let id: u32 = value.parse().map_err(|err| UserNamespaceError::ParseID {
            option: option.clone(),
            source: err,
        })?;
        if !is_id_mapped(id, mappings) {
            tracing::error!(?option, "mount option names an unmapped id");
            return Err(UserNamespaceError::MountIdNotMapped {
                option: option.clone(),
            });
        }
    }
    Ok(())
}

fn is_id_mapped(id: u32, mappings: &[LinuxIdMapping]) -> bool {
    mappings
        .iter()
        .any(|m| id >= m.container_id() && id - m.container_id() < m.size())
}
