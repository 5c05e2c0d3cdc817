//! Named socket the runtime uses to tell a created container to start.
use std::env;
use std::io::prelude::*;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use nix::unistd;

use crate::channel::Message;

pub const CONTAINER_SOCKET: &str = "container.sock";

#[derive(Debug, thiserror::Error)]
pub enum ContainerSocketError {
    #[error("failed to chdir {path:?} while handling the container socket")]
    Chdir { source: nix::Error, path: PathBuf },
    #[error("invalid path: {0:?}")]
    InvalidPath(PathBuf),
    #[error("failed to bind container socket: {name}")]
    Bind {
        source: std::io::Error,
        name: String,
    },
    #[error("failed to connect to container socket: {name}")]
    Connect {
        source: std::io::Error,
        name: String,
    },
    #[error("failed to get cwd")]
    GetCwd(#[source] std::io::Error),
    #[error("failed to accept on container socket")]
    Accept(#[source] std::io::Error),
    #[error("failed to read container socket")]
    Read(#[source] std::io::Error),
    #[error("failed to send start")]
    SendStart(#[source] std::io::Error),
    #[error("expected {expected}, got {got:?}")]
    UnexpectedMessage { expected: Message, got: String },
}

type Result<T> = std::result::Result<T, ContainerSocketError>;

// Unix domain socket paths are limited to 108 bytes, and the state root can
// be deep. Run `f` with the socket's directory as cwd and hand it the bare
// file name.
fn in_socket_dir<T>(
    socket_path: &Path,
    f: impl FnOnce(&str) -> Result<T>,
) -> Result<T> {
    let workdir = socket_path
        .parent()
        .ok_or_else(|| ContainerSocketError::InvalidPath(socket_path.to_owned()))?;
    let socket_name = socket_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ContainerSocketError::InvalidPath(socket_path.to_owned()))?;
    let cwd = env::current_dir().map_err(ContainerSocketError::GetCwd)?;
    unistd::chdir(workdir).map_err(|e| ContainerSocketError::Chdir {
        source: e,
        path: workdir.to_owned(),
    })?;
    let result = f(socket_name);
    unistd::chdir(&cwd).map_err(|e| ContainerSocketError::Chdir {
        source: e,
        path: cwd,
    })?;
    result
}

/// Listening side, owned by the container process until the start message.
pub struct ContainerListener {
    socket: UnixListener,
}

impl ContainerListener {
    pub fn new(socket_path: &Path) -> Result<Self> {
        let socket = in_socket_dir(socket_path, |name| {
            UnixListener::bind(name).map_err(|e| ContainerSocketError::Bind {
                source: e,
                name: name.to_owned(),
            })
        })?;

        Ok(Self { socket })
    }

    /// Accepts exactly one connection and requires it to carry `start`.
    /// The listener is consumed, so no further connection is accepted.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn wait_for_container_start(self) -> Result<()> {
        let (mut stream, _) = self.socket.accept().map_err(|err| {
            tracing::error!(?err, "failed to accept on container socket");
            ContainerSocketError::Accept(err)
        })?;
        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .map_err(ContainerSocketError::Read)?;
        tracing::debug!(?response, "received on container socket");

        if response != Message::Start.as_str() {
            return Err(ContainerSocketError::UnexpectedMessage {
                expected: Message::Start,
                got: response,
            });
        }

        Ok(())
    }
}

/// Connecting side, used by the runtime on `start`.
pub struct ContainerSocket {
    path: PathBuf,
}

impl ContainerSocket {
    pub fn new<P: Into<PathBuf>>(socket_path: P) -> Self {
        Self {
            path: socket_path.into(),
        }
    }

    /// Connects and writes `start`. Returns once the write is complete and
    /// the connection is shut down.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn notify_container_start(&self) -> Result<()> {
        tracing::debug!(path = ?self.path, "notify container start");
        let mut stream = in_socket_dir(&self.path, |name| {
            UnixStream::connect(name).map_err(|e| ContainerSocketError::Connect {
                source: e,
                name: name.to_owned(),
            })
        })?;
        stream
            .write_all(Message::Start.as_str().as_bytes())
            .map_err(ContainerSocketError::SendStart)?;
        stream
            .shutdown(std::net::Shutdown::Write)
            .map_err(ContainerSocketError::SendStart)?;
        tracing::debug!("sent start");
        Ok(())
    }
}
