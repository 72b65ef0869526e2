//! CLI command definitions.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the caching proxy in front of the origin
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        listen: Option<String>,

        /// Origin base URL
        #[arg(short, long)]
        origin: Option<String>,
    },

    /// Populate the current partitions and sweep old ones
    Install,

    /// Inspect stored partitions
    Partitions {
        #[command(subcommand)]
        command: PartitionCommands,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum PartitionCommands {
    /// List partitions and their entry counts
    List,

    /// Delete partitions
    Clear {
        /// Only partitions whose name starts with this prefix
        #[arg(short, long)]
        prefix: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,

        /// Configuration value
        value: String,
    },
}
