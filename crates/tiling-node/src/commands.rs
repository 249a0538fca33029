//! CLI command definitions.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Join the cluster and run cache jobs until interrupted
    Serve {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Print the JSON schema of the cluster event protocol
    Schema,

    /// Print the effective node configuration
    Config {
        #[command(flatten)]
        overrides: ConfigOverrides,
    },
}

/// Settings that take precedence over the configuration file.
#[derive(clap::Args, Debug, Default)]
pub struct ConfigOverrides {
    /// Path to the node configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Identity of this instance in the cluster
    #[arg(long)]
    pub instance_id: Option<String>,

    /// NATS server URL, replacing the configured ones
    #[arg(long)]
    pub nats_url: Option<String>,

    /// Use an in-process bus instead of NATS (standalone node)
    #[arg(long)]
    pub memory: bool,
}
