use clap::{Parser, Subcommand};

mod commands;
use commands::{
    handle_config_command, handle_peers_command, handle_snapshot_command, handle_stats_command,
    ConfigCommands, SnapshotCommands,
};

#[derive(Parser)]
#[command(name = "relay-cli")]
#[command(about = "Relay CLI - configuration, live stats and data file tooling for the explorer relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration Management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Show cache, gateway, tracker and hub counters of a running server
    Stats {
        /// Server base URL
        #[arg(short, long, env = "RELAY_URL", default_value = "http://127.0.0.1:5001")]
        url: String,

        /// Print the raw JSON document
        #[arg(long)]
        json: bool,

        /// Request timeout in seconds
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Lifecycle snapshot tooling
    #[command(subcommand)]
    Snapshot(SnapshotCommands),

    /// Summarize a node peers.dat file
    Peers {
        /// Path to peers.dat
        path: String,

        /// Print the JSON summary with every unique address
        #[arg(long)]
        json: bool,

        /// List every unique address after the summary
        #[arg(long)]
        list: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Config(config_command) => handle_config_command(config_command).await?,
        Commands::Stats { url, json, timeout } => handle_stats_command(&url, json, timeout).await?,
        Commands::Snapshot(snapshot_command) => handle_snapshot_command(snapshot_command).await?,
        Commands::Peers { path, json, list } => handle_peers_command(&path, json, list).await?,
    }

    Ok(())
}
