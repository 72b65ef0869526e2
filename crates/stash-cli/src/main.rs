//! Stash CLI entrypoint.

use clap::Parser;
use std::path::PathBuf;

mod commands;
mod config;
mod handlers;

use commands::{Commands, ConfigCommands, PartitionCommands};
use config::StashConfig;

#[derive(Parser)]
#[command(name = "stash")]
#[command(author, version, about = "Offline-first caching proxy", long_about = None)]
struct Cli {
    /// Configuration file (overrides STASH_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let path = StashConfig::resolve_path(cli.config.as_deref())?;
    let config = StashConfig::load(&path)?;
    stash_trace::init_tracer(&config.tracing)?;

    match cli.command {
        Commands::Serve { listen, origin } => handlers::serve(config, listen, origin).await?,
        Commands::Install => handlers::install(&config).await?,
        Commands::Partitions { command } => match command {
            PartitionCommands::List => handlers::list_partitions(&config).await?,
            PartitionCommands::Clear { prefix } => {
                handlers::clear_partitions(&config, prefix).await?
            }
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show => handlers::show_config(&config, &path)?,
            ConfigCommands::Set { key, value } => handlers::set_config(&path, &key, &value)?,
        },
    }

    stash_trace::shutdown_tracer();
    Ok(())
}
