use clap::Parser;

/// Send the specified signal to the container
#[derive(Parser, Debug)]
pub struct Kill {
    #[clap(value_parser = clap::builder::NonEmptyStringValueParser::new(), required = true)]
    pub container_id: String,
    /// Signal name (TERM, SIGTERM) or number
    #[clap(default_value = "SIGTERM")]
    pub signal: String,
    /// Send the signal to every process in the container's cgroup
    #[clap(short, long)]
    pub all: bool,
}
