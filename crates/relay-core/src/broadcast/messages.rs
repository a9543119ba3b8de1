//! Broadcast wire protocol.
//!
//! Every frame is a JSON envelope `{"type": "<camelCase>", "data": ...}`. Both directions are
//! closed enums so that adding a message type is a compile error at every match site.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    chain::{Block, LifecycleDelta, Transaction},
    peers::GeoPeer,
};

/// Blockchain summary sent as `initialData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainSummary {
    pub blockchain_info: Value,
    pub chain_tx_stats: Value,
    pub tx_out_set_info: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedBatch {
    pub block_height: u64,
    pub block_hash: String,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedTransaction {
    pub txid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MempoolSnapshot {
    pub info: Value,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    RecentBlocks(Vec<Block>),
    NewBlock(Block),
    RecentTransactions(Vec<Transaction>),
    TransactionConfirmed(ConfirmedBatch),
    NewTransaction(Transaction),
    RemovedTransaction(RemovedTransaction),
    Mempool(MempoolSnapshot),
    GeoData(Vec<GeoPeer>),
    InitialData(ChainSummary),
}

impl ServerMessage {
    /// The `type` discriminant, for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RecentBlocks(_) => "recentBlocks",
            Self::NewBlock(_) => "newBlock",
            Self::RecentTransactions(_) => "recentTransactions",
            Self::TransactionConfirmed(_) => "transactionConfirmed",
            Self::NewTransaction(_) => "newTransaction",
            Self::RemovedTransaction(_) => "removedTransaction",
            Self::Mempool(_) => "mempool",
            Self::GeoData(_) => "geoData",
            Self::InitialData(_) => "initialData",
        }
    }

    /// # Errors
    ///
    /// Fails only if a payload holds a non-finite float.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<LifecycleDelta> for ServerMessage {
    fn from(delta: LifecycleDelta) -> Self {
        match delta {
            LifecycleDelta::RecentBlocks(blocks) => Self::RecentBlocks(blocks),
            LifecycleDelta::NewBlock(block) => Self::NewBlock(block),
            LifecycleDelta::RecentTransactions(txs) => Self::RecentTransactions(txs),
            LifecycleDelta::TransactionsConfirmed { height, hash, transactions } => {
                Self::TransactionConfirmed(ConfirmedBatch {
                    block_height: height,
                    block_hash: hash,
                    transactions,
                })
            }
            LifecycleDelta::NewTransaction(tx) => Self::NewTransaction(tx),
            LifecycleDelta::RemovedTransaction(txid) => {
                Self::RemovedTransaction(RemovedTransaction { txid })
            }
        }
    }
}

/// Frames accepted from subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Resend the mempool to the requesting subscriber only.
    RequestMempool,
}
