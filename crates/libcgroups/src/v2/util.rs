use std::path::{Path, PathBuf};

use crate::common::{self, WrappedIoError};

pub const CGROUP_CONTROLLERS: &str = "cgroup.controllers";
pub const CGROUP_SUBTREE_CONTROL: &str = "cgroup.subtree_control";
pub const CGROUP_KILL: &str = "cgroup.kill";

/// Slice that holds containers without an explicit cgroups path.
pub const DEFAULT_SLICE: &str = "/";

#[derive(thiserror::Error, Debug)]
pub enum V2UtilError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("cannot get available controllers. {0} does not exist")]
    DoesNotExist(PathBuf),
    #[error("cgroups path {0:?} is not valid utf-8")]
    NonUtf8(PathBuf),
}

/// Reads the `{root_path}/cgroup.controllers` file to get the list of the controllers that are
/// available in this cgroup
pub fn get_available_controllers<P: AsRef<Path>>(root_path: P) -> Result<Vec<String>, V2UtilError> {
    let root_path = root_path.as_ref();
    let controllers_path = root_path.join(CGROUP_CONTROLLERS);
    if !controllers_path.exists() {
        return Err(V2UtilError::DoesNotExist(controllers_path));
    }

    Ok(common::read_cgroup_file(controllers_path)?
        .split_whitespace()
        .map(str::to_owned)
        .collect())
}

/// Splits a `slice:prefix:name` cgroups path into the slice and the group
/// placed under it.
///
/// An empty slice means `system.slice` and `-` means the root of the
/// hierarchy. The group is `prefix-name.scope`, `name.scope` when no prefix is
/// given, or `name` itself when it already names a slice. Without a cgroups
/// path the container gets its own `{id}.slice` at the root.
pub fn slice_and_group(cgroups_path: &str, container_id: &str) -> (String, String) {
    if !cgroups_path.is_empty() && cgroups_path.contains(':') {
        let mut parts = cgroups_path.splitn(3, ':');
        let slice = match parts.next().unwrap_or_default() {
            "" => "system.slice",
            "-" => "/",
            other => other,
        };
        let prefix = parts.next().unwrap_or_default();
        let name = match parts.next() {
            Some(name) if !name.is_empty() => name,
            _ => container_id,
        };

        if name.ends_with(".slice") {
            return (slice.to_owned(), name.to_owned());
        }

        if !prefix.is_empty() {
            return (slice.to_owned(), format!("{prefix}-{name}.scope"));
        }

        return (slice.to_owned(), format!("{name}.scope"));
    }

    if container_id.is_empty() {
        return ("system.slice".to_owned(), String::new());
    }

    (DEFAULT_SLICE.to_owned(), format!("{container_id}.slice"))
}

/// Resolves the configured cgroups path to a path relative to the root of the
/// unified hierarchy. Absolute paths are taken as they are, everything else
/// goes through [`slice_and_group`].
pub fn resolve_cgroup_path(
    cgroups_path: Option<&Path>,
    container_id: &str,
) -> Result<PathBuf, V2UtilError> {
    match cgroups_path {
        Some(path) if path.is_absolute() => Ok(path.to_path_buf()),
        Some(path) => {
            let raw = path
                .to_str()
                .ok_or_else(|| V2UtilError::NonUtf8(path.to_path_buf()))?;
            let (slice, group) = slice_and_group(raw, container_id);
            Ok(PathBuf::from(slice).join(group))
        }
        None => {
            let (slice, group) = slice_and_group("", container_id);
            Ok(PathBuf::from(slice).join(group))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::set_fixture;
    use anyhow::Result;

    #[test]
    fn test_slice_and_group() {
        let cases = [
            ("", "c1", ("/", "c1.slice")),
            ("plain/path", "c1", ("/", "c1.slice")),
            (":burrow:c1", "ignored", ("system.slice", "burrow-c1.scope")),
            ("-::", "c1", ("/", "c1.scope")),
            ("user.slice::web", "c1", ("user.slice", "web.scope")),
            ("user.slice:pfx", "c1", ("user.slice", "pfx-c1.scope")),
            ("machine.slice::inner.slice", "c1", ("machine.slice", "inner.slice")),
            ("", "", ("system.slice", "")),
        ];

        for (path, id, (slice, group)) in cases {
            assert_eq!(
                slice_and_group(path, id),
                (slice.to_owned(), group.to_owned()),
                "cgroups path {path:?}"
            );
        }
    }

    #[test]
    fn test_resolve_cgroup_path() -> Result<()> {
        assert_eq!(
            resolve_cgroup_path(None, "c1")?,
            PathBuf::from("/c1.slice")
        );
        assert_eq!(
            resolve_cgroup_path(Some(Path::new("/my/group")), "c1")?,
            PathBuf::from("/my/group")
        );
        assert_eq!(
            resolve_cgroup_path(Some(Path::new("system.slice:pfx:name")), "c1")?,
            PathBuf::from("system.slice/pfx-name.scope")
        );
        Ok(())
    }

    #[test]
    fn test_get_available_controllers() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        assert!(matches!(
            get_available_controllers(tmp.path()),
            Err(V2UtilError::DoesNotExist(_))
        ));

        set_fixture(tmp.path(), CGROUP_CONTROLLERS, "cpu io memory pids\n")?;
        assert_eq!(
            get_available_controllers(tmp.path())?,
            vec!["cpu", "io", "memory", "pids"]
        );
        Ok(())
    }
}
