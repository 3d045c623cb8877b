//! Command line arguments for the core's boot-check binary

use clap::Parser;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(version, author)]
pub struct Args {
    /// The path to the config file to use
    #[clap(short, long, default_value = "core.yml")]
    pub config: String,
}
