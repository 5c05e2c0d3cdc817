//! Console handling for containers with `process.terminal` set.

use std::fs::OpenOptions;
use std::io::IoSlice;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use nix::mount::MsFlags;
use nix::sys::socket::{self, UnixAddr};
use nix::unistd::dup2;

use crate::syscall::{Syscall, SyscallError};

#[derive(Debug, Clone, Copy)]
pub enum StdIO {
    Stdin = 0,
    Stdout = 1,
    Stderr = 2,
}

impl From<StdIO> for i32 {
    fn from(value: StdIO) -> Self {
        value as i32
    }
}

impl std::fmt::Display for StdIO {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StdIO::Stdin => write!(f, "stdin"),
            StdIO::Stdout => write!(f, "stdout"),
            StdIO::Stderr => write!(f, "stderr"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TTYError {
    #[error("failed to connect/duplicate {stdio}")]
    ConnectStdIO { source: nix::Error, stdio: StdIO },
    #[error("failed to connect to console socket {path:?}")]
    ConnectConsoleSocket { source: nix::Error, path: PathBuf },
    #[error("invalid console socket path {path:?}")]
    InvalidSocketPath { source: nix::Error, path: PathBuf },
    #[error("failed to create console socket fd")]
    CreateConsoleSocketFd { source: nix::Error },
    #[error("could not create pseudo terminal")]
    CreatePseudoTerminal { source: nix::Error },
    #[error("failed to resolve pty slave name")]
    PtyName { source: nix::Error },
    #[error("failed to send pty master")]
    SendPtyMaster { source: nix::Error },
    #[error("failed to prepare console mount point {path:?}")]
    ConsoleMountPoint { source: std::io::Error, path: PathBuf },
    #[error("failed to bind pty onto {path:?}")]
    BindConsole { source: SyscallError, path: PathBuf },
}

type Result<T> = std::result::Result<T, TTYError>;

/// Connects to the unix stream socket on which the caller expects the pty
/// master. The descriptor is close-on-exec.
pub fn connect_console_socket(path: &Path) -> Result<OwnedFd> {
    let fd = socket::socket(
        socket::AddressFamily::Unix,
        socket::SockType::Stream,
        socket::SockFlag::SOCK_CLOEXEC,
        None,
    )
    .map_err(|err| TTYError::CreateConsoleSocketFd { source: err })?;
    let addr = UnixAddr::new(path).map_err(|err| TTYError::InvalidSocketPath {
        source: err,
        path: path.to_owned(),
    })?;
    socket::connect(fd.as_raw_fd(), &addr).map_err(|err| {
        tracing::error!(?path, %err, "failed to connect to console socket");
        TTYError::ConnectConsoleSocket {
            source: err,
            path: path.to_owned(),
        }
    })?;
    Ok(fd)
}

/// Opens a pty, hands the master to whoever listens on `console_fd` and
/// makes the slave the controlling terminal and stdio of this process.
/// Returns the slave's path so it can be bound onto `/dev/console`.
pub fn setup_console(console_fd: RawFd) -> Result<PathBuf> {
    // SAFETY: the console socket descriptor was handed to this process to own
    let console = unsafe { OwnedFd::from_raw_fd(console_fd) };

    let pty = nix::pty::openpty(None, None)
        .map_err(|err| TTYError::CreatePseudoTerminal { source: err })?;
    let slave_path =
        nix::unistd::ttyname(&pty.slave).map_err(|err| TTYError::PtyName { source: err })?;

    let payload: &[u8] = b"/dev/ptmx";
    let iov = [IoSlice::new(payload)];
    let fds = [pty.master.as_raw_fd()];
    let cmsg = socket::ControlMessage::ScmRights(&fds);
    socket::sendmsg::<UnixAddr>(
        console.as_raw_fd(),
        &iov,
        &[cmsg],
        socket::MsgFlags::empty(),
        None,
    )
    .map_err(|err| TTYError::SendPtyMaster { source: err })?;

    // SAFETY: TIOCSCTTY takes no pointer argument
    if unsafe { libc::ioctl(pty.slave.as_raw_fd(), libc::TIOCSCTTY, 0) } < 0 {
        tracing::warn!("could not TIOCSCTTY");
    };
    let slave = pty.slave.as_raw_fd();
    connect_stdio(slave, slave, slave)?;

    tracing::debug!(?slave_path, "console set up");
    Ok(slave_path)
}

/// Bind mounts the pty slave over `{rootfs}/dev/console`.
pub fn bind_console(rootfs: &Path, slave_path: &Path, syscall: &dyn Syscall) -> Result<()> {
    let console = rootfs.join("dev/console");
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&console)
        .map_err(|err| TTYError::ConsoleMountPoint {
            source: err,
            path: console.clone(),
        })?;

    syscall
        .mount(Some(slave_path), &console, None, MsFlags::MS_BIND, None)
        .map_err(|err| TTYError::BindConsole {
            source: err,
            path: console,
        })
}

fn connect_stdio(stdin: RawFd, stdout: RawFd, stderr: RawFd) -> Result<()> {
    for (fd, stdio) in [
        (stdin, StdIO::Stdin),
        (stdout, StdIO::Stdout),
        (stderr, StdIO::Stderr),
    ] {
        dup2(fd, stdio.into()).map_err(|err| TTYError::ConnectStdIO {
            source: err,
            stdio,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::IoSliceMut;
    use std::os::unix::net::UnixListener;

    use anyhow::Result;
    use nix::sys::socket::{recvmsg, ControlMessageOwned};
    use serial_test::serial;

    use super::*;
    use crate::syscall::test::{MountArgs, TestHelperSyscall};

    #[test]
    fn test_connect_console_socket() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("console.sock");
        let _listener = UnixListener::bind(&path)?;
        let fd = connect_console_socket(&path)?;
        assert!(fd.as_raw_fd() >= 0);
        Ok(())
    }

    #[test]
    fn test_connect_console_socket_missing() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let res = connect_console_socket(&tmp.path().join("absent.sock"));
        assert!(matches!(res, Err(TTYError::ConnectConsoleSocket { .. })));
        Ok(())
    }

    #[test]
    #[serial]
    fn test_setup_console_sends_master() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("console.sock");
        let listener = UnixListener::bind(&path)?;
        let fd = connect_console_socket(&path)?;
        let (receiver, _) = listener.accept()?;

        // setup_console replaces stdio, so keep the originals around
        let old_stdin = nix::unistd::dup(StdIO::Stdin.into())?;
        let old_stdout = nix::unistd::dup(StdIO::Stdout.into())?;
        let old_stderr = nix::unistd::dup(StdIO::Stderr.into())?;

        let status = setup_console(std::os::fd::IntoRawFd::into_raw_fd(fd));

        dup2(old_stdin, StdIO::Stdin.into())?;
        dup2(old_stdout, StdIO::Stdout.into())?;
        dup2(old_stderr, StdIO::Stderr.into())?;

        let slave = status?;
        assert!(slave.starts_with("/dev/pts"));

        let mut buf = [0u8; 64];
        let mut iov = [IoSliceMut::new(&mut buf)];
        let mut cmsg = nix::cmsg_space!([RawFd; 1]);
        let msg = recvmsg::<UnixAddr>(
            receiver.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg),
            socket::MsgFlags::empty(),
        )?;
        let got_fd = msg.cmsgs().any(|c| matches!(c, ControlMessageOwned::ScmRights(fds) if fds.len() == 1));
        assert!(got_fd);
        Ok(())
    }

    #[test]
    fn test_connect_stdio_names_failed_stream() {
        // dup2 of a closed fd fails before stdin is touched
        let res = connect_stdio(-1, -1, -1);
        assert!(matches!(
            res,
            Err(TTYError::ConnectStdIO {
                stdio: StdIO::Stdin,
                ..
            })
        ));
    }

    #[test]
    fn test_bind_console() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        std::fs::create_dir(tmp.path().join("dev"))?;
        let syscall = TestHelperSyscall::default();
        bind_console(tmp.path(), Path::new("/dev/pts/3"), &syscall)?;

        assert!(tmp.path().join("dev/console").exists());
        assert_eq!(
            syscall.get_mount_args(),
            vec![MountArgs {
                source: Some(PathBuf::from("/dev/pts/3")),
                target: tmp.path().join("dev/console"),
                fstype: None,
                flags: MsFlags::MS_BIND,
                data: None,
            }]
        );
        Ok(())
    }
}
