use std::path::PathBuf;

use clap::Parser;

/// Create a container and immediately start it
#[derive(Parser, Debug)]
pub struct Run {
    /// Path to the bundle directory, containing config.json and root filesystem
    #[clap(short, long, default_value = ".")]
    pub bundle: PathBuf,
    /// Unix socket (file) path , which will receive file descriptor of the writing end of the pseudoterminal
    #[clap(short, long)]
    pub console_socket: Option<PathBuf>,
    /// File to write pid of the container created
    #[clap(short, long)]
    pub pid_file: Option<PathBuf>,
    /// name of the container instance to be started
    #[clap(value_parser = clap::builder::NonEmptyStringValueParser::new(), required = true)]
    pub container_id: String,
}
