use clap::Parser;

/// List created containers
#[derive(Parser, Debug)]
pub struct List {
    /// Specify the format (table or json)
    #[clap(long, short, default_value = "table")]
    pub format: String,

    /// Only display container IDs
    #[clap(long, short)]
    pub quiet: bool,
}
