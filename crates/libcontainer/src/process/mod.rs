//! The container process is started in two steps. The runtime clones a
//! child into the new namespaces, places it (id mappings and cgroup) and
//! lets it re-exec the runtime binary. The re-executed binary builds the
//! sandbox and finally execs the user program.

pub mod args;
pub mod container_init_process;
pub mod container_main_process;
pub mod fork;
