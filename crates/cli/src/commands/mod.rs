pub mod config;
pub mod peers;
pub mod snapshot;
pub mod stats;
pub mod utils;

pub use config::{handle_config_command, ConfigCommands};
pub use peers::handle_peers_command;
pub use snapshot::{handle_snapshot_command, SnapshotCommands};
pub use stats::handle_stats_command;
