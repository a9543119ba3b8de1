use prettytable::{row, Table};
use serde_json::Value;
use std::time::Duration;

use super::utils::{print_info, CliError, CliResult};

/// Fetches `/admin/stats` from a running server.
pub async fn fetch_stats(base_url: &str, timeout: Duration) -> CliResult<Value> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let url = format!("{}/admin/stats", base_url.trim_end_matches('/'));

    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        return Err(CliError::Network(format!("{url} returned HTTP {}", response.status())));
    }
    Ok(response.json().await?)
}

fn field(stats: &Value, section: &str, key: &str) -> String {
    stats
        .get(section)
        .and_then(|s| s.get(key))
        .map_or_else(|| "-".to_string(), ToString::to_string)
}

const CACHE_ROWS: &[(&str, &str)] = &[
    ("entries", "Entries"),
    ("capacity", "Capacity"),
    ("hits", "Hits"),
    ("misses", "Misses"),
    ("staleServed", "Stale served"),
];
const GATEWAY_ROWS: &[(&str, &str)] = &[
    ("pending", "Pending"),
    ("priorityPending", "Priority pending"),
    ("inFlight", "In flight"),
    ("dispatchedTotal", "Dispatched"),
    ("timeoutsTotal", "Timeouts"),
];
const TRACKER_ROWS: &[(&str, &str)] = &[
    ("tipHeight", "Tip height"),
    ("blocks", "Window blocks"),
    ("pending", "Pending txs"),
    ("recentConfirmed", "Recent confirmed"),
];
const HUB_ROWS: &[(&str, &str)] =
    &[("subscribers", "Subscribers"), ("publishedTotal", "Published"), ("removedTotal", "Removed")];

pub(crate) fn render(stats: &Value) -> Table {
    let mut table = Table::new();
    table.add_row(row!["Section", "Metric", "Value"]);

    let rows: [(&str, &[(&str, &str)]); 4] = [
        ("cache", CACHE_ROWS),
        ("gateway", GATEWAY_ROWS),
        ("tracker", TRACKER_ROWS),
        ("hub", HUB_ROWS),
    ];

    for (section, keys) in rows {
        for (key, label) in keys {
            table.add_row(row![section, label, field(stats, section, key)]);
        }
    }
    table
}

pub async fn handle_stats_command(url: &str, json: bool, timeout_secs: u64) -> CliResult<()> {
    print_info(&format!("Fetching stats from {url}..."));
    let stats = fetch_stats(url, Duration::from_secs(timeout_secs)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        render(&stats).printstd();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_fills_known_fields() {
        let stats = json!({
            "cache": { "entries": 12, "hits": 40 },
            "gateway": { "inFlight": 3 },
            "tracker": { "tipHeight": 19_000_000 },
            "hub": { "subscribers": 5 }
        });

        let table = render(&stats);
        let text = table.to_string();
        assert!(text.contains("19000000"));
        assert!(text.contains("Subscribers"));
        assert_eq!(field(&stats, "gateway", "timeoutsTotal"), "-");
        assert_eq!(field(&stats, "cache", "hits"), "40");
    }

    #[tokio::test]
    async fn test_fetch_stats_unreachable() {
        let result = fetch_stats("http://127.0.0.1:9", Duration::from_millis(200)).await;
        assert!(matches!(result, Err(CliError::Network(_))));
    }
}
