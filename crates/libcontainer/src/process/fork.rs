use nix::sched::{self, CloneFlags};
use nix::sys::signal::Signal;
use nix::unistd::Pid;

// 8 MiB, the usual main thread stack limit
const CHILD_STACK_SIZE: usize = 8 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error("failed to clone process with {flags:?}")]
    Clone {
        flags: CloneFlags,
        source: nix::Error,
    },
}

/// Runs `cb` in a child created with `flags`, in the namespaces those flags
/// ask for. Without `CLONE_VM` the child gets a copy of the address space,
/// so it behaves like fork: `cb` may use anything borrowed here. The child
/// exits with the callback's code, or 255 on error.
pub fn container_clone<F, E>(flags: CloneFlags, cb: F) -> Result<Pid, CloneError>
where
    F: FnOnce() -> Result<i32, E>,
    E: std::fmt::Display,
{
    let mut cb = Some(cb);
    let child_main = Box::new(move || -> isize {
        let Some(cb) = cb.take() else {
            return -1;
        };
        match cb() {
            Ok(code) => code as isize,
            Err(err) => {
                tracing::error!(%err, "container child failed");
                -1
            }
        }
    });

    let mut stack = vec![0u8; CHILD_STACK_SIZE];
    // SAFETY: the child runs on its own copy of memory and only returns
    // through the callback
    unsafe { sched::clone(child_main, &mut stack, flags, Some(Signal::SIGCHLD as i32)) }.map_err(
        |err| {
            tracing::error!(?flags, %err, "failed to clone container process");
            CloneError::Clone { flags, source: err }
        },
    )
}

#[cfg(test)]
mod test {
    use anyhow::{bail, Result};
    use nix::sys::wait::{waitpid, WaitStatus};

    use super::*;

    #[test]
    fn test_container_clone() -> Result<()> {
        let pid = container_clone(CloneFlags::empty(), || Ok::<_, String>(0))?;
        match waitpid(pid, None)? {
            WaitStatus::Exited(p, status) => {
                assert_eq!(pid, p);
                assert_eq!(status, 0);
                Ok(())
            }
            _ => bail!("test failed"),
        }
    }

    #[test]
    fn test_container_err_clone() -> Result<()> {
        let pid = container_clone(CloneFlags::empty(), || Err::<i32, _>("boom"))?;
        match waitpid(pid, None)? {
            WaitStatus::Exited(p, status) => {
                assert_eq!(pid, p);
                assert_eq!(status, 255);
                Ok(())
            }
            _ => bail!("test failed"),
        }
    }

    #[test]
    fn test_container_clone_exit_code() -> Result<()> {
        let pid = container_clone(CloneFlags::empty(), || Ok::<_, String>(7))?;
        assert_eq!(waitpid(pid, None)?, WaitStatus::Exited(pid, 7));
        Ok(())
    }
}
