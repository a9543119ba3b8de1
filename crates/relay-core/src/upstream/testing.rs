//! In-memory daemon doubles shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Semaphore;

use super::{UpstreamError, UpstreamTransport};

type Handler = dyn Fn(&str, &[Value]) -> Result<Value, UpstreamError> + Send + Sync;

/// Transport answering from a closure, with optional latency, a release gate and a
/// concurrency probe.
pub(crate) struct ScriptedTransport {
    handler: Box<Handler>,
    latency: Duration,
    gate: Option<Arc<Semaphore>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
}

impl ScriptedTransport {
    pub(crate) fn new(
        handler: impl Fn(&str, &[Value]) -> Result<Value, UpstreamError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            latency: Duration::ZERO,
            gate: None,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Echoes the method name back as the result.
    pub(crate) fn echo() -> Self {
        Self::new(|method, _| Ok(json!(method)))
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Every call waits for one permit of `gate` before answering.
    pub(crate) fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls.lock().clone()
    }

    pub(crate) fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(m, _)| m == method).count()
    }

    pub(crate) fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamTransport for ScriptedTransport {
    async fn invoke(&self, method: &str, params: &[Value]) -> Result<Value, UpstreamError> {
        self.calls.lock().push((method.to_string(), params.to_vec()));
        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(current, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        (self.handler)(method, params)
    }
}

/// Deterministic 64-hex block hash for a height on a given fork.
pub(crate) fn fake_hash(height: u64, fork: u8) -> String {
    format!("{fork:02x}{height:062x}")
}

/// Coinbase script bytes announcing a pool the way miners commonly do.
pub(crate) fn coinbase_hex(tag: &str) -> String {
    let mut bytes = vec![0x03, 0x10, 0x27, 0x00];
    bytes.extend_from_slice(tag.as_bytes());
    hex::encode(bytes)
}

/// A `getblock <hash> 2` shaped block.
pub(crate) fn fake_block(height: u64, fork: u8, txids: &[&str]) -> Value {
    let mut txs = vec![json!({
        "txid": format!("coinbase-{fork}-{height}"),
        "vin": [{ "coinbase": coinbase_hex("/DigiHash/"), "sequence": 4294967295u64 }],
        "vout": [
            { "value": 277.0, "n": 0, "scriptPubKey": { "address": "DMinerAddress1", "type": "pubkeyhash" } },
            { "value": 0.0, "n": 1, "scriptPubKey": { "type": "nulldata" } }
        ]
    })];
    txs.extend(txids.iter().map(|id| json!({ "txid": id, "vin": [], "vout": [] })));

    json!({
        "hash": fake_hash(height, fork),
        "height": height,
        "time": 1_700_000_000 + height * 15,
        "difficulty": 1234.5,
        "pow_algo_id": height % 5,
        "nTx": txs.len(),
        "version": 0x2000_0204,
        "previousblockhash": fake_hash(height.saturating_sub(1), fork),
        "tx": txs,
    })
}

#[derive(Default)]
struct FakeState {
    blocks: Vec<Value>,
    mempool: BTreeMap<String, (f64, f64)>,
    failing: HashSet<String>,
}

/// A small in-memory chain answering the daemon methods the tracker uses.
#[derive(Default)]
pub(crate) struct FakeDaemon {
    state: Mutex<FakeState>,
    calls: Mutex<Vec<String>>,
}

impl FakeDaemon {
    /// Chain with blocks `0..=tip`, none of them carrying user transactions.
    pub(crate) fn with_chain(tip: u64) -> Self {
        let daemon = Self::default();
        daemon.state.lock().blocks = (0..=tip).map(|h| fake_block(h, 0, &[])).collect();
        daemon
    }

    /// Mines a block carrying `txids` and drops them from the mempool. Returns its hash.
    pub(crate) fn mine(&self, txids: &[&str]) -> String {
        let mut state = self.state.lock();
        let height = state.blocks.len() as u64;
        let block = fake_block(height, 0, txids);
        let hash = block["hash"].as_str().unwrap_or_default().to_string();
        state.blocks.push(block);
        for id in txids {
            state.mempool.remove(*id);
        }
        hash
    }

    pub(crate) fn add_mempool_tx(&self, txid: &str, value: f64, fee: f64) {
        self.state.lock().mempool.insert(txid.to_string(), (value, fee));
    }

    pub(crate) fn drop_mempool_tx(&self, txid: &str) {
        self.state.lock().mempool.remove(txid);
    }

    pub(crate) fn fail(&self, method: &str) {
        self.state.lock().failing.insert(method.to_string());
    }

    pub(crate) fn heal(&self, method: &str) {
        self.state.lock().failing.remove(method);
    }

    pub(crate) fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|m| *m == method).count()
    }

    fn answer(&self, method: &str, params: &[Value]) -> Result<Value, UpstreamError> {
        let state = self.state.lock();
        if state.failing.contains(method) {
            return Err(UpstreamError::Transport("injected failure".into()));
        }
        let not_found = || UpstreamError::Rpc { code: -5, message: "not found".into() };
        let tip = state.blocks.len().saturating_sub(1) as u64;

        match method {
            "getblockcount" => Ok(json!(tip)),
            "getbestblockhash" => Ok(json!(fake_hash(tip, 0))),
            "getblockchaininfo" => Ok(json!({
                "chain": "main",
                "blocks": tip,
                "bestblockhash": fake_hash(tip, 0),
            })),
            "getblockhash" => {
                let height = params.first().and_then(Value::as_u64).ok_or_else(not_found)?;
                state
                    .blocks
                    .get(usize::try_from(height).map_err(|_| not_found())?)
                    .map(|b| b["hash"].clone())
                    .ok_or_else(not_found)
            }
            "getblock" => {
                let hash = params.first().and_then(Value::as_str).ok_or_else(not_found)?;
                state.blocks.iter().find(|b| b["hash"] == hash).cloned().ok_or_else(not_found)
            }
            "getrawmempool" => {
                let entries: serde_json::Map<String, Value> = state
                    .mempool
                    .iter()
                    .map(|(id, (_, fee))| (id.clone(), json!({ "fees": { "base": fee } })))
                    .collect();
                Ok(Value::Object(entries))
            }
            "getrawtransaction" => {
                let txid = params.first().and_then(Value::as_str).ok_or_else(not_found)?;
                let (value, _) = state.mempool.get(txid).ok_or_else(not_found)?;
                Ok(json!({ "txid": txid, "vout": [{ "value": value, "n": 0 }] }))
            }
            "decoderawtransaction" => {
                let raw = params.first().and_then(Value::as_str).ok_or_else(not_found)?;
                Ok(json!({ "txid": format!("decoded-{raw}"), "vout": [{ "value": 1.5, "n": 0 }] }))
            }
            "getmempoolinfo" => Ok(json!({ "size": state.mempool.len(), "bytes": 0 })),
            _ => Err(UpstreamError::Rpc { code: -32601, message: "Method not found".into() }),
        }
    }
}

#[async_trait]
impl UpstreamTransport for FakeDaemon {
    async fn invoke(&self, method: &str, params: &[Value]) -> Result<Value, UpstreamError> {
        self.calls.lock().push(method.to_string());
        tokio::task::yield_now().await;
        self.answer(method, params)
    }
}
