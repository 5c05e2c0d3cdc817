//! Lists the processes of a container
use std::path::PathBuf;
use std::process::Command;

use anyhow::{bail, Context, Result};
use liboci_cli::Ps;

use crate::commands::load_container;

pub fn ps(args: Ps, root_path: PathBuf) -> Result<()> {
    let mut container = load_container(root_path, &args.container_id)?;
    let pids: Vec<i32> = container
        .processes()
        .with_context(|| format!("failed to list processes of {}", args.container_id))?
        .iter()
        .map(|pid| pid.as_raw())
        .collect();

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string(&pids)?),
        "table" => {
            let ps_options = if args.ps_options.is_empty() {
                vec![String::from("-ef")]
            } else {
                args.ps_options
            };
            let output = Command::new("ps")
                .args(&ps_options)
                .output()
                .context("failed to run ps")?;
            if !output.status.success() {
                bail!("ps failed: {}", String::from_utf8_lossy(&output.stderr));
            }
            for line in filter_ps_output(std::str::from_utf8(&output.stdout)?, &pids)? {
                println!("{line}");
            }
        }
        unknown => bail!("invalid format: {unknown}"),
    }
    Ok(())
}

// Keeps the header and the rows whose PID column belongs to the container.
fn filter_ps_output<'a>(output: &'a str, pids: &[i32]) -> Result<Vec<&'a str>> {
    let mut lines = output.lines();
    let Some(header) = lines.next() else {
        bail!("ps printed nothing");
    };
    let pid_index = header
        .split_whitespace()
        .position(|name| name == "PID")
        .context("couldn't find PID field in ps output")?;

    let mut kept = vec![header];
    for line in lines.filter(|l| !l.is_empty()) {
        let pid = line
            .split_whitespace()
            .nth(pid_index)
            .context("ps row is missing the PID column")?;
        let pid: i32 = pid
            .parse()
            .with_context(|| format!("invalid pid {pid:?} in ps output"))?;
        if pids.contains(&pid) {
            kept.push(line);
        }
    }
    Ok(kept)
}
