//! tiling-node entrypoint.

use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

mod commands;
mod config;
mod handlers;

use commands::Commands;
use config::NodeConfig;

#[derive(Parser)]
#[command(name = "tiling-node")]
#[command(author, version, about = "Tile cache job cluster node", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

fn init_logging(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match cli.command {
        Commands::Serve { overrides } => handlers::serve(NodeConfig::load(&overrides)?).await?,
        Commands::Schema => handlers::schema()?,
        Commands::Config { overrides } => handlers::show_config(NodeConfig::load(&overrides)?)?,
    }

    Ok(())
}
