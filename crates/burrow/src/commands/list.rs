//! Contains Functionality of list container command
use std::fmt::Write as _;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::{fs, io};

use anyhow::{bail, Result};
use chrono::{DateTime, Local};
use libcontainer::container::state::State;
use libcontainer::container::Container;
use libcontainer::error::LibcontainerError;
use liboci_cli::List;
use nix::unistd::{Uid, User};
use tabwriter::TabWriter;

/// lists all existing containers
pub fn list(args: List, root_path: PathBuf) -> Result<()> {
    let states = collect_states(&root_path)?;

    if args.quiet {
        for state in &states {
            println!("{}", state.id);
        }
        return Ok(());
    }

    match args.format.as_str() {
        "table" => print_table(&states),
        "json" => {
            println!("{}", serde_json::to_string(&states)?);
            Ok(())
        }
        unknown => bail!("invalid format: {unknown}"),
    }
}

// Every directory holding a state file is a container. Each is reconciled
// through `get_state`; one held by another operation is shown as last saved.
fn collect_states(root_path: &Path) -> Result<Vec<State>> {
    let root_path = fs::canonicalize(root_path)?;
    let mut states = Vec::new();
    for container_dir in fs::read_dir(root_path)? {
        let container_dir = container_dir?.path();
        let state_file = State::file_path(&container_dir);
        if !state_file.exists() {
            continue;
        }

        let mut container = match Container::load(container_dir) {
            Ok(container) => container,
            // deleted between read_dir and load
            Err(LibcontainerError::NoDirectory) => continue,
            Err(err) => return Err(err.into()),
        };
        match container.get_state() {
            Ok(_) => {}
            Err(LibcontainerError::OperationInProgress) => {
                tracing::debug!(id = container.id(), "container is busy, showing saved state");
            }
            Err(err) => return Err(err.into()),
        }
        states.push(container.state);
    }
    states.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(states)
}

fn print_table(states: &[State]) -> Result<()> {
    let mut content = String::new();
    for state in states {
        let pid = if state.pid > 0 {
            state.pid.to_string()
        } else {
            "".to_owned()
        };

        let created = if let Some(utc) = state.created {
            let local: DateTime<Local> = DateTime::from(utc);
            local.to_rfc3339_opts(chrono::SecondsFormat::Secs, false)
        } else {
            "".to_owned()
        };

        let _ = writeln!(
            content,
            "{}\t{}\t{}\t{}\t{}\t{}",
            state.id,
            pid,
            state.status,
            state.bundle.display(),
            created,
            creator_name(state.creator)
        );
    }

    let mut tab_writer = TabWriter::new(io::stdout());
    writeln!(&mut tab_writer, "ID\tPID\tSTATUS\tBUNDLE\tCREATED\tCREATOR")?;
    write!(&mut tab_writer, "{content}")?;
    tab_writer.flush()?;

    Ok(())
}

fn creator_name(uid: Option<u32>) -> String {
    let Some(uid) = uid else {
        return "".to_owned();
    };
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use libcontainer::container::ContainerStatus;

    use super::*;

    fn save_container(root: &Path, id: &str, status: ContainerStatus) -> Result<()> {
        let dir = root.join(id);
        fs::create_dir(&dir)?;
        Container::new(id, status, None, Path::new("/bundle"), &dir).save()?;
        Ok(())
    }

    #[test]
    fn test_collect_states_skips_dirs_without_state() -> Result<()> {
        let root = tempfile::tempdir()?;
        save_container(root.path(), "b", ContainerStatus::Created)?;
        save_container(root.path(), "a", ContainerStatus::Stopped)?;
        fs::create_dir(root.path().join("half-created"))?;

        let states = collect_states(root.path())?;
        let ids: Vec<&str> = states.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        Ok(())
    }

    #[test]
    fn test_collect_states_heals_dead_process() -> Result<()> {
        let root = tempfile::tempdir()?;
        let dir = root.path().join("dead");
        fs::create_dir(&dir)?;
        // pid far above pid_max, never alive
        Container::new("dead", ContainerStatus::Running, Some(i32::MAX), Path::new("/b"), &dir)
            .save()?;

        let states = collect_states(root.path())?;
        assert_eq!(states[0].status, ContainerStatus::Stopped);
        assert_eq!(State::load(&dir)?.status, ContainerStatus::Stopped);
        Ok(())
    }

    #[test]
    fn test_unknown_format() -> Result<()> {
        let root = tempfile::tempdir()?;
        let args = List {
            format: "yaml".to_owned(),
            quiet: false,
        };
        assert!(list(args, root.path().to_path_buf()).is_err());
        Ok(())
    }

    #[test]
    fn test_creator_name_falls_back_to_uid() {
        assert_eq!(creator_name(None), "");
        assert_eq!(creator_name(Some(0)), "root");
        assert_eq!(creator_name(Some(4_000_000_000)), "4000000000");
    }
}
