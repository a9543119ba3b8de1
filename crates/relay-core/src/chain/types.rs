use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Network the daemon runs on. Only affects pool-identifier heuristics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" | "main" => Ok(Self::Mainnet),
            "testnet" | "test" => Ok(Self::Testnet),
            other => Err(format!("unknown network '{other}'")),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mainnet => write!(f, "mainnet"),
            Self::Testnet => write!(f, "testnet"),
        }
    }
}

/// A block in the recent-blocks window. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub height: u64,
    pub hash: String,
    /// Block header time, unix seconds.
    pub timestamp: u64,
    pub difficulty: f64,
    /// Mining algorithm name, `"Unknown"` when the tag is not recognised.
    #[serde(rename = "algo")]
    pub algorithm: String,
    pub tx_count: usize,
    pub miner_address: String,
    #[serde(rename = "poolIdentifier")]
    pub pool: String,
    pub version: i64,
    pub taproot_signal: bool,
}

/// A block together with the ids of the transactions it carries.
///
/// Transaction ids drive confirmations but are not kept in the window.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedBlock {
    pub block: Block,
    pub txids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxState {
    Pending,
    Confirmed,
}

/// A transaction tracked from first sight in the mempool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub txid: String,
    /// Sum of output values in coins.
    pub value: f64,
    pub fee: f64,
    /// Unix milliseconds when the relay first saw the transaction.
    pub observed_at: u64,
    pub state: TxState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirming_block_height: Option<u64>,
}

impl Transaction {
    #[must_use]
    pub fn pending(txid: impl Into<String>, value: f64, fee: f64, observed_at: u64) -> Self {
        Self {
            txid: txid.into(),
            value,
            fee,
            observed_at,
            state: TxState::Pending,
            confirming_block_height: None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state == TxState::Pending
    }
}
