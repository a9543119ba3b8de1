use clap::Subcommand;
use prettytable::{row, Table};
use relay_core::persistence::{SnapshotFile, SnapshotStore};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::utils::{format_unix, print_info, short_hash, CliResult};

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Print the contents of a lifecycle snapshot file
    Inspect {
        /// Snapshot path (defaults to the persistence default)
        #[arg(default_value = "data/lifecycle-snapshot.json")]
        path: String,

        /// Number of blocks to list
        #[arg(short, long, default_value = "10")]
        blocks: usize,
    },
}

pub async fn handle_snapshot_command(command: SnapshotCommands) -> CliResult<()> {
    match command {
        SnapshotCommands::Inspect { path, blocks } => inspect(&path, blocks).await,
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}

async fn inspect(path: &str, block_rows: usize) -> CliResult<()> {
    // Age is reported, not enforced.
    let store = SnapshotStore::new(path, Duration::MAX);
    let file = store.read().await?;

    print_info(&format!("Snapshot {path}"));
    summary(&file, now_secs()).printstd();

    if !file.lifecycle.blocks.is_empty() {
        println!();
        blocks_table(&file, block_rows).printstd();
    }
    Ok(())
}

pub(crate) fn summary(file: &SnapshotFile, now: u64) -> Table {
    let lifecycle = &file.lifecycle;
    let mut table = Table::new();
    table.add_row(row!["Version", file.version]);
    table.add_row(row!["Saved at", format_unix(file.saved_at)]);
    table.add_row(row!["Age", format!("{}s", file.age_seconds(now))]);
    table.add_row(row!["Blocks", lifecycle.blocks.len()]);
    if let (Some(first), Some(last)) = (lifecycle.blocks.first(), lifecycle.blocks.last()) {
        table.add_row(row!["Heights", format!("{} .. {}", last.height, first.height)]);
    }
    table.add_row(row!["Pending", lifecycle.pending.len()]);
    table.add_row(row!["Recently confirmed", lifecycle.confirmed.len()]);
    table
}

pub(crate) fn blocks_table(file: &SnapshotFile, rows: usize) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Height", "Hash", "Algo", "Pool", "Txs", "Taproot"]);
    for block in file.lifecycle.blocks.iter().take(rows) {
        table.add_row(row![
            block.height,
            short_hash(&block.hash),
            block.algorithm,
            block.pool,
            block.tx_count,
            if block.taproot_signal { "yes" } else { "no" }
        ]);
    }
    table
}
