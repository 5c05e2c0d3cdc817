use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::os::unix::prelude::CommandExt;
use std::path::PathBuf;
use std::sync::mpsc;
use std::{process, thread, time};

use nix::sys::signal;
use nix::unistd::Pid;
use oci_spec::runtime::Hook;

use crate::container::state::State;
use crate::utils;

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("failed to spawn hook {path:?}")]
    Spawn {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to encode container state")]
    EncodeState(#[source] serde_json::Error),
    #[error("failed to write container state to hook stdin")]
    WriteState(#[source] std::io::Error),
    #[error("failed to wait for hook")]
    Wait(#[source] std::io::Error),
    #[error("hook exited with non-zero status {0}")]
    NonZeroExitCode(i32),
    #[error("hook was killed by a signal")]
    Killed,
    #[error("hook timed out")]
    Timeout,
    #[error("hook {path:?} has non-positive timeout {timeout}")]
    InvalidTimeout { path: PathBuf, timeout: i64 },
}

type Result<T> = std::result::Result<T, HookError>;

/// Runs the hooks of one phase in order, feeding each the container state
/// on stdin. The first failing hook stops the phase.
pub fn run_hooks(hooks: Option<&Vec<Hook>>, state: &State) -> Result<()> {
    let Some(hooks) = hooks else {
        return Ok(());
    };

    for hook in hooks {
        run_hook(hook, state)?;
    }
    Ok(())
}

fn run_hook(hook: &Hook, state: &State) -> Result<()> {
    if let Some(timeout) = hook.timeout().filter(|t| *t <= 0) {
        return Err(HookError::InvalidTimeout {
            path: hook.path().clone(),
            timeout,
        });
    }

    let mut hook_command = process::Command::new(hook.path());
    // args[0] is the program name, which may differ from the path
    if let Some((arg0, args)) = hook.args().as_ref().and_then(|a| a.split_first()) {
        tracing::debug!(?arg0, ?args, "run hook");
        hook_command.arg0(arg0).args(args)
    } else {
        hook_command.arg0(hook.path().display().to_string())
    };

    let envs: HashMap<String, String> = hook
        .env()
        .as_ref()
        .map(|env| utils::parse_env(env))
        .unwrap_or_default();
    tracing::debug!(?envs, "hook environment");

    let mut hook_process = hook_command
        .env_clear()
        .envs(envs)
        .stdin(process::Stdio::piped())
        .spawn()
        .map_err(|err| HookError::Spawn {
            path: hook.path().clone(),
            source: err,
        })?;
    let hook_process_pid = Pid::from_raw(hook_process.id() as i32);

    if let Some(stdin) = &mut hook_process.stdin {
        // A broken pipe means the hook already exited; its status decides.
        let encoded_state = serde_json::to_string(state).map_err(HookError::EncodeState)?;
        if let Err(err) = stdin.write_all(encoded_state.as_bytes()) {
            if err.kind() != ErrorKind::BrokenPipe {
                let _ = signal::kill(hook_process_pid, signal::Signal::SIGKILL);
                return Err(HookError::WriteState(err));
            }
        }
    }
    // close stdin so the hook sees EOF
    drop(hook_process.stdin.take());

    let res = if let Some(timeout_sec) = hook.timeout() {
        // The child handle moves into the waiting thread, so a timed out hook
        // is killed by pid.
        let (s, r) = mpsc::channel();
        thread::spawn(move || {
            let res = hook_process.wait();
            let _ = s.send(res);
        });
        match r.recv_timeout(time::Duration::from_secs(timeout_sec as u64)) {
            Ok(res) => res,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::warn!(path = ?hook.path(), timeout_sec, "hook timed out, killing it");
                let _ = signal::kill(hook_process_pid, signal::Signal::SIGKILL);
                return Err(HookError::Timeout);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return Err(HookError::Wait(std::io::Error::new(
                    ErrorKind::Other,
                    "hook wait thread exited",
                )));
            }
        }
    } else {
        hook_process.wait()
    };

    match res {
        Ok(exit_status) => match exit_status.code() {
            Some(0) => Ok(()),
            Some(exit_code) => Err(HookError::NonZeroExitCode(exit_code)),
            None => Err(HookError::Killed),
        },
        Err(err) => Err(HookError::Wait(err)),
    }
}
