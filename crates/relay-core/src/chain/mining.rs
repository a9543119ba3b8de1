//! Mining metadata extraction from verbose daemon blocks.
//!
//! Everything here is best effort. Malformed or missing fields degrade to `"Unknown"` and are
//! never reported as errors.
//!
//! [`identify_pool`] is a heuristic: it looks for text miners commonly embed in the coinbase
//! input and returns the first plausible tag. Its output is a display hint, not validated data.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use super::types::{Block, Network, ObservedBlock};

pub const UNKNOWN: &str = "Unknown";

/// Version bit 2 signals taproot readiness.
const TAPROOT_SIGNAL_BIT: i64 = 0b100;

/// Patterns tried in order; the first capture long enough wins.
#[allow(clippy::expect_used)]
static POOL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // [PoolName]
        r"\[([A-Za-z0-9][A-Za-z0-9 ._-]*)\]",
        // /PoolName/
        r"/([A-Za-z0-9][A-Za-z0-9 ._-]*)/",
        // @PoolName
        r"@([A-Za-z0-9][A-Za-z0-9._-]*)",
        // pool.example.com
        r"([A-Za-z0-9][A-Za-z0-9-]*(?:\.[A-Za-z0-9-]+)*\.(?:com|net|org|io|co|cc|info|pro|me))",
        // SomethingPool
        r"([A-Za-z0-9]+[Pp]ool)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("static pool pattern compiles"))
    .collect()
});

/// Maps a DigiByte-style `pow_algo_id` to its algorithm name.
#[must_use]
pub fn algorithm_from_tag(tag: i64) -> &'static str {
    match tag {
        0 => "sha256d",
        1 => "scrypt",
        2 => "groestl",
        3 => "skein",
        4 => "qubit",
        7 => "odo",
        _ => UNKNOWN,
    }
}

fn algorithm_of(block: &Value) -> String {
    if let Some(name) = block.get("pow_algo").and_then(Value::as_str) {
        if !name.is_empty() {
            return name.to_string();
        }
    }
    block
        .get("pow_algo_id")
        .and_then(Value::as_i64)
        .map_or(UNKNOWN, algorithm_from_tag)
        .to_string()
}

fn output_address(output: &Value) -> Option<String> {
    let script = output.get("scriptPubKey")?;
    script
        .get("address")
        .and_then(Value::as_str)
        .or_else(|| script.get("addresses")?.get(0)?.as_str())
        .map(str::to_string)
}

/// Miner payout address: first coinbase output with an address, else the second.
#[must_use]
pub fn miner_address(coinbase_tx: &Value) -> String {
    let outputs = coinbase_tx.get("vout").and_then(Value::as_array);
    outputs
        .and_then(|outs| {
            outs.first().and_then(output_address).or_else(|| outs.get(1).and_then(output_address))
        })
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Raw bytes embedded in the coinbase input, empty when absent or not valid hex.
#[must_use]
pub fn coinbase_bytes(coinbase_tx: &Value) -> Vec<u8> {
    coinbase_tx
        .get("vin")
        .and_then(|vin| vin.get(0))
        .and_then(|input| input.get("coinbase"))
        .and_then(Value::as_str)
        .and_then(|script| hex::decode(script).ok())
        .unwrap_or_default()
}

/// Best-effort pool tag from coinbase bytes, using the mainnet minimum tag length.
#[must_use]
pub fn identify_pool(raw: &[u8]) -> String {
    identify_pool_on(raw, Network::Mainnet)
}

/// Best-effort pool tag from coinbase bytes.
///
/// Testnet accepts single-character tags, mainnet requires at least two characters.
#[must_use]
pub fn identify_pool_on(raw: &[u8], network: Network) -> String {
    let min_len = match network {
        Network::Mainnet => 2,
        Network::Testnet => 1,
    };

    let text: String = String::from_utf8_lossy(raw)
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { ' ' })
        .collect();

    POOL_PATTERNS
        .iter()
        .find_map(|pattern| {
            pattern.captures_iter(&text).find_map(|caps| {
                let tag = caps.get(1)?.as_str().trim();
                (tag.chars().count() >= min_len).then(|| tag.to_string())
            })
        })
        .unwrap_or_else(|| UNKNOWN.to_string())
}

#[must_use]
pub fn signals_taproot(version: i64) -> bool {
    version & TAPROOT_SIGNAL_BIT != 0
}

/// Builds a window block from a `getblock <hash> 2` (or verbosity 1) response.
///
/// Returns `None` only when `hash` or `height` is missing.
#[must_use]
pub fn parse_block(raw: &Value, network: Network) -> Option<ObservedBlock> {
    let hash = raw.get("hash")?.as_str()?.to_string();
    let height = raw.get("height")?.as_u64()?;

    let txs = raw.get("tx").and_then(Value::as_array);
    let txids: Vec<String> = txs
        .map(|txs| {
            txs.iter()
                .filter_map(|tx| {
                    tx.as_str().or_else(|| tx.get("txid").and_then(Value::as_str)).map(str::to_string)
                })
                .collect()
        })
        .unwrap_or_default();

    let coinbase = txs.and_then(|txs| txs.first()).filter(|tx| tx.is_object());
    let (miner, pool) = match coinbase {
        Some(tx) => (miner_address(tx), identify_pool_on(&coinbase_bytes(tx), network)),
        None => (UNKNOWN.to_string(), UNKNOWN.to_string()),
    };

    let version = raw.get("version").and_then(Value::as_i64).unwrap_or(0);
    let tx_count = raw
        .get("nTx")
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(txids.len());

    Some(ObservedBlock {
        block: Block {
            height,
            hash,
            timestamp: raw.get("time").and_then(Value::as_u64).unwrap_or(0),
            difficulty: raw.get("difficulty").and_then(Value::as_f64).unwrap_or(0.0),
            algorithm: algorithm_of(raw),
            tx_count,
            miner_address: miner,
            pool,
            version,
            taproot_signal: signals_taproot(version),
        },
        txids,
    })
}
