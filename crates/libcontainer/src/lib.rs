#[cfg(test)]
#[macro_use]
extern crate quickcheck;

pub mod apparmor;
pub mod capabilities;
pub mod channel;
pub mod config;
pub mod container;
pub mod container_socket;
pub mod error;
pub mod hooks;
pub mod namespaces;
pub mod process;
pub mod rootfs;
pub mod signal;
pub mod syscall;
pub mod tty;
pub mod user_ns;
pub mod utils;

#[cfg(feature = "libseccomp")]
pub mod seccomp;
