use clap::Parser;

/// Print the runtime features document
/// Documented at
/// https://github.com/opencontainers/runtime-spec/blob/main/features-linux.md
#[derive(Parser, Debug)]
pub struct Features {}
