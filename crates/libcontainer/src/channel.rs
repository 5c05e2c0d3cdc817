//! Rendezvous channel between the runtime and the process it spawns.
//!
//! The channel is a `SOCK_SEQPACKET` socketpair, so every send is delivered
//! as exactly one message. Only literal tokens travel over it. The child end
//! survives the re-exec because its descriptor number is handed over in the
//! environment.
//!
//! Creation exchanges two tokens, in this order:
//!
//! 1. `mapped`, runtime to child. Sent once the runtime has written the
//!    child's uid/gid maps and moved it into its cgroup. The child blocks on
//!    it before it unshares the cgroup namespace or re-execs, so nothing it
//!    does runs unmapped or outside the cgroup.
//! 2. `ready`, child to runtime. Sent after the pre-pivot setup, once the
//!    child listens on the container socket.
//!
//! `start` is not sent here; it travels over the container socket.

use std::fmt;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

use nix::sys::socket::{self, MsgFlags};

const MAX_MESSAGE_LEN: usize = 32;

/// Tokens exchanged during container creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    /// Child finished the pre-pivot setup and listens on the container socket.
    Ready,
    /// Runtime asks the child to run the user program.
    Start,
    /// Runtime finished placing the child (id mappings and cgroup).
    Mapped,
}

impl Message {
    pub fn as_str(&self) -> &'static str {
        match self {
            Message::Ready => "ready",
            Message::Start => "start",
            Message::Mapped => "mapped",
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("failed to create socketpair")]
    Create(#[source] nix::Error),
    #[error("failed to send {message}")]
    Send {
        message: Message,
        source: nix::Error,
    },
    #[error("failed to receive {expected}")]
    Receive {
        expected: Message,
        source: nix::Error,
    },
    #[error("channel closed while waiting for {0}")]
    BrokenChannel(Message),
    #[error("expected {expected}, got {got:?}")]
    UnexpectedMessage { expected: Message, got: String },
    #[error("failed to clear close-on-exec on fd {fd}")]
    Inherit { fd: RawFd, source: nix::Error },
}

type Result<T> = std::result::Result<T, ChannelError>;

/// One end of the socketpair.
#[derive(Debug)]
pub struct Endpoint {
    fd: OwnedFd,
}

impl Endpoint {
    /// Takes ownership of an inherited descriptor.
    ///
    /// # Safety
    /// `fd` must be an open socket end not owned by anything else.
    pub unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Self {
            fd: OwnedFd::from_raw_fd(fd),
        }
    }

    #[tracing::instrument(level = "trace", skip(self))]
    pub fn send(&self, message: Message) -> Result<()> {
        socket::send(
            self.fd.as_raw_fd(),
            message.as_str().as_bytes(),
            MsgFlags::empty(),
        )
        .map_err(|err| {
            tracing::error!(?err, %message, "failed to send message");
            ChannelError::Send { message, source: err }
        })?;
        tracing::debug!(%message, "sent");
        Ok(())
    }

    /// Blocks for one message and checks that it is `expected`. A closed peer
    /// is reported as a broken channel rather than blocking forever.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn recv(&self, expected: Message) -> Result<()> {
        let mut buf = [0u8; MAX_MESSAGE_LEN];
        let len = loop {
            match socket::recv(self.fd.as_raw_fd(), &mut buf, MsgFlags::empty()) {
                Ok(len) => break len,
                Err(nix::Error::EINTR) => continue,
                Err(err) => {
                    tracing::error!(?err, %expected, "failed to receive message");
                    return Err(ChannelError::Receive {
                        expected,
                        source: err,
                    });
                }
            }
        };

        if len == 0 {
            tracing::error!(%expected, "peer closed the channel");
            return Err(ChannelError::BrokenChannel(expected));
        }

        let got = String::from_utf8_lossy(&buf[..len]).into_owned();
        if got != expected.as_str() {
            tracing::error!(%expected, ?got, "unexpected message");
            return Err(ChannelError::UnexpectedMessage { expected, got });
        }

        tracing::debug!(message = %expected, "received");
        Ok(())
    }

    /// Clears close-on-exec so the descriptor survives execve.
    pub fn inheritable(&self) -> Result<RawFd> {
        let fd = self.fd.as_raw_fd();
        nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_SETFD(nix::fcntl::FdFlag::empty()))
            .map_err(|err| ChannelError::Inherit { fd, source: err })?;
        Ok(fd)
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    pub fn into_raw_fd(self) -> RawFd {
        self.fd.into_raw_fd()
    }
}

/// Creates a connected pair; both ends are close-on-exec.
pub fn channel() -> Result<(Endpoint, Endpoint)> {
    let (parent, child) = socket::socketpair(
        socket::AddressFamily::Unix,
        socket::SockType::SeqPacket,
        None,
        socket::SockFlag::SOCK_CLOEXEC,
    )
    .map_err(ChannelError::Create)?;

    Ok((Endpoint { fd: parent }, Endpoint { fd: child }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_ready_round_trip() -> Result<()> {
        let (parent, child) = channel()?;
        child.send(Message::Ready)?;
        parent.recv(Message::Ready)?;
        Ok(())
    }

    #[test]
    fn test_unexpected_message_is_protocol_error() -> Result<()> {
        let (parent, child) = channel()?;
        child.send(Message::Start)?;
        match parent.recv(Message::Ready) {
            Err(ChannelError::UnexpectedMessage { expected, got }) => {
                assert_eq!(expected, Message::Ready);
                assert_eq!(got, "start");
            }
            other => panic!("expected protocol error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_closed_peer_is_broken_channel() -> Result<()> {
        let (parent, child) = channel()?;
        drop(child);
        assert!(matches!(
            parent.recv(Message::Ready),
            Err(ChannelError::BrokenChannel(Message::Ready))
        ));
        Ok(())
    }

    #[test]
    fn test_child_without_mapped_never_reports_ready() -> Result<()> {
        let (parent, child) = channel()?;
        let handle = std::thread::spawn(move || -> std::result::Result<(), ChannelError> {
            child.recv(Message::Mapped)?;
            child.send(Message::Ready)
        });
        // runtime gave up before placing the child
        drop(parent);
        let res = handle.join().expect("thread panicked");
        assert!(matches!(
            res,
            Err(ChannelError::BrokenChannel(Message::Mapped))
        ));
        Ok(())
    }

    #[test]
    fn test_messages_across_threads() -> Result<()> {
        let (parent, child) = channel()?;
        let handle = std::thread::spawn(move || -> std::result::Result<(), ChannelError> {
            child.recv(Message::Mapped)?;
            child.send(Message::Ready)
        });
        parent.send(Message::Mapped)?;
        parent.recv(Message::Ready)?;
        handle.join().expect("thread panicked")?;
        Ok(())
    }
}
