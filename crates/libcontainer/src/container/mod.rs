//! Container management
/// This module owns the container lifecycle. A builder validates the
/// bundle and creates the container process; the returned `Container`
/// then drives start, kill and delete against the state persisted under
/// the runtime root, each operation holding the per-container lock.
pub mod builder;
mod builder_impl;
#[allow(clippy::module_inception)]
mod container;
mod container_delete;
mod container_kill;
mod container_ps;
mod container_start;
pub mod init_builder;
pub mod lock;
pub mod state;
pub use container::Container;
pub use state::{ContainerStatus, State};
