use prettytable::{row, Table};
use relay_core::peers::{read_peers_file, PeersFile};

use super::utils::{print_info, CliResult};

/// Summarizes a node `peers.dat`, optionally listing every address.
pub async fn handle_peers_command(path: &str, json: bool, list: bool) -> CliResult<()> {
    let peers = read_peers_file(path).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&peers.summary())?);
        return Ok(());
    }

    print_info(&format!("Parsed {path}"));
    header_table(&peers).printstd();

    if list {
        for address in peers.addresses() {
            println!("{address}");
        }
    }
    Ok(())
}

pub(crate) fn header_table(peers: &PeersFile) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Format version", peers.version]);
    table.add_row(row!["Key size", peers.key_size]);
    table.add_row(row!["New table entries", peers.new_count]);
    table.add_row(row!["Tried table entries", peers.tried_count]);
    table.add_row(row!["Unique IPv4", peers.ipv4.len()]);
    table.add_row(row!["Unique IPv6", peers.ipv6.len()]);
    table.add_row(row!["Unique total", peers.total()]);
    table
}
