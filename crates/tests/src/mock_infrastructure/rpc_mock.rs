//! Daemon mock for bitcoind-style JSON-RPC 1.0 testing
//!
//! Wraps mockito with helpers for the calls the relay makes: chain info, block hashes, verbose
//! blocks, mempool queries and the daemon's error envelope.

use mockito::{Matcher, Mock, Server, ServerGuard};
use serde_json::{json, Value};

/// Deterministic 64-hex block hash for a height.
#[must_use]
pub fn block_hash(height: u64) -> String {
    format!("{height:064x}")
}

/// Builder for creating mock daemon responses.
///
/// Every request is a `POST /` whose body is matched against the method name (and, for the
/// block helpers, its first positional parameter).
pub struct DaemonMockBuilder {
    server: ServerGuard,
    mocks: Vec<Mock>,
    expectations: Vec<Mock>,
    authorization: Option<String>,
}

impl DaemonMockBuilder {
    /// Creates a new daemon mock with a fresh mockito server.
    pub async fn new() -> Self {
        Self {
            server: Server::new_async().await,
            mocks: Vec::new(),
            expectations: Vec::new(),
            authorization: None,
        }
    }

    /// Returns the URL of the mock server.
    #[must_use]
    pub fn url(&self) -> String {
        self.server.url()
    }

    /// Mocks created after this call only answer requests carrying this `Authorization` header.
    pub fn require_authorization(&mut self, header: &str) -> &mut Self {
        self.authorization = Some(header.to_string());
        self
    }

    fn method_pattern(method: &str) -> String {
        format!(r#""method"\s*:\s*"{method}""#)
    }

    fn params_pattern(method: &str, first_param: &str) -> String {
        format!(r#""method"\s*:\s*"{method}".*"params"\s*:\s*\[{first_param}"#)
    }

    fn build_mock(&mut self, pattern: String, status: usize, body: String) -> Mock {
        let authorization = self.authorization.clone();
        let mut mock = self.server.mock("POST", "/").match_body(Matcher::Regex(pattern));
        if let Some(header) = authorization {
            mock = mock.match_header("authorization", header.as_str());
        }
        mock.with_status(status).with_header("content-type", "application/json").with_body(body)
    }

    fn push(&mut self, pattern: String, status: usize, body: String) -> &mut Self {
        let mock = self.build_mock(pattern, status, body).create();
        self.mocks.push(mock);
        self
    }

    fn envelope(result: &Value) -> String {
        json!({ "result": result, "error": null, "id": 1 }).to_string()
    }

    /// Mocks a method with a successful result.
    pub fn mock_method(&mut self, method: &str, result: &Value) -> &mut Self {
        self.push(Self::method_pattern(method), 200, Self::envelope(result))
    }

    /// Mocks a method that must be called exactly `hits` times; see
    /// [`assert_expectations`](Self::assert_expectations).
    pub fn mock_method_times(&mut self, method: &str, result: &Value, hits: usize) -> &mut Self {
        let mock = self
            .build_mock(Self::method_pattern(method), 200, Self::envelope(result))
            .expect(hits)
            .create();
        self.expectations.push(mock);
        self
    }

    /// Mocks `getblockchaininfo` reporting `tip` as the best height.
    pub fn mock_blockchain_info(&mut self, tip: u64) -> &mut Self {
        let info = json!({
            "chain": "main",
            "blocks": tip,
            "headers": tip,
            "bestblockhash": block_hash(tip),
            "difficulty": 1234.5,
            "initialblockdownload": false,
        });
        self.mock_method("getblockchaininfo", &info)
    }

    /// Mocks `getblockhash <height>`.
    pub fn mock_block_hash(&mut self, height: u64, hash: &str) -> &mut Self {
        let pattern = Self::params_pattern("getblockhash", &format!("{height}\\]"));
        self.push(pattern, 200, Self::envelope(&json!(hash)))
    }

    /// Mocks `getblock <hash> ...` with the given verbose block body.
    pub fn mock_block(&mut self, block: &Value) -> &mut Self {
        let hash = block.get("hash").and_then(Value::as_str).unwrap_or_default();
        let pattern = Self::params_pattern("getblock", &format!("\"{hash}\""));
        self.push(pattern, 200, Self::envelope(block))
    }

    /// Mocks a chain whose last `depth` blocks are fetchable, plus `getblockchaininfo`,
    /// `getbestblockhash` and an empty mempool.
    pub fn mock_chain(&mut self, tip: u64, depth: u64) -> &mut Self {
        self.mock_blockchain_info(tip);
        self.mock_method("getbestblockhash", &json!(block_hash(tip)));
        self.mock_method("getrawmempool", &json!({}));
        for height in tip.saturating_sub(depth.saturating_sub(1))..=tip {
            self.mock_block_hash(height, &block_hash(height));
            self.mock_block(&BlockResponseBuilder::new(height).build());
        }
        self
    }

    /// Mocks the daemon's RPC error envelope, delivered with HTTP 500 like bitcoind does.
    pub fn mock_rpc_error(&mut self, method: &str, code: i32, message: &str) -> &mut Self {
        let body = json!({
            "result": null,
            "error": { "code": code, "message": message },
            "id": 1
        });
        self.push(Self::method_pattern(method), 500, body.to_string())
    }

    /// Mocks a server error (500) with a non-JSON body.
    pub fn mock_server_error(&mut self, method: &str) -> &mut Self {
        let mock = self
            .server
            .mock("POST", "/")
            .match_body(Matcher::Regex(Self::method_pattern(method)))
            .with_status(500)
            .with_body("Internal Server Error")
            .create();

        self.mocks.push(mock);
        self
    }

    /// Mocks a 200 response whose body is not JSON.
    pub fn mock_garbage(&mut self, method: &str) -> &mut Self {
        self.push(Self::method_pattern(method), 200, "<html>proxy login</html>".to_string())
    }

    /// Returns a reference to the underlying mockito server for advanced mocking.
    pub fn get_server(&mut self) -> &mut ServerGuard {
        &mut self.server
    }

    /// Verifies all plain mocks were called at least once.
    #[must_use]
    pub fn verify_all_called(&self) -> bool {
        self.mocks.iter().all(Mock::matched)
    }

    /// Panics unless every [`mock_method_times`](Self::mock_method_times) mock saw its exact
    /// hit count.
    pub async fn assert_expectations(&self) {
        for mock in &self.expectations {
            mock.assert_async().await;
        }
    }
}

/// Builder for `getblock <hash> 2` responses.
pub struct BlockResponseBuilder {
    height: u64,
    hash: String,
    pool_tag: String,
    miner: String,
    algo_id: i64,
    version: i64,
    transactions: Vec<String>,
}

impl BlockResponseBuilder {
    /// Creates a block at `height` hashed with [`block_hash`].
    #[must_use]
    pub fn new(height: u64) -> Self {
        Self {
            height,
            hash: block_hash(height),
            pool_tag: "/DigiHash/".to_string(),
            miner: "DMinerAddress1".to_string(),
            algo_id: 0,
            version: 0x2000_0204,
            transactions: Vec::new(),
        }
    }

    /// Sets a custom block hash.
    #[must_use]
    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = hash.into();
        self
    }

    /// Sets the text embedded in the coinbase script.
    #[must_use]
    pub fn with_pool_tag(mut self, tag: impl Into<String>) -> Self {
        self.pool_tag = tag.into();
        self
    }

    /// Sets the coinbase payout address.
    #[must_use]
    pub fn with_miner(mut self, address: impl Into<String>) -> Self {
        self.miner = address.into();
        self
    }

    /// Sets the numeric proof-of-work algorithm tag.
    #[must_use]
    pub fn with_algo_id(mut self, algo_id: i64) -> Self {
        self.algo_id = algo_id;
        self
    }

    /// Sets the header version.
    #[must_use]
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }

    /// Adds non-coinbase transactions by id.
    #[must_use]
    pub fn with_transactions<I, S>(mut self, txids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transactions.extend(txids.into_iter().map(Into::into));
        self
    }

    /// Builds the block response JSON.
    #[must_use]
    pub fn build(self) -> Value {
        let mut script = vec![0x03, 0x10, 0x27, 0x00];
        script.extend_from_slice(self.pool_tag.as_bytes());

        let mut txs = vec![json!({
            "txid": format!("coinbase-{}", self.height),
            "vin": [{ "coinbase": hex::encode(script), "sequence": 4_294_967_295u64 }],
            "vout": [{
                "value": 277.0,
                "n": 0,
                "scriptPubKey": { "address": self.miner, "type": "pubkeyhash" }
            }]
        })];
        txs.extend(self.transactions.iter().map(|txid| json!({ "txid": txid, "vin": [], "vout": [] })));

        json!({
            "hash": self.hash,
            "height": self.height,
            "time": 1_700_000_000 + self.height * 15,
            "difficulty": 1234.5,
            "pow_algo_id": self.algo_id,
            "nTx": txs.len(),
            "version": self.version,
            "previousblockhash": block_hash(self.height.saturating_sub(1)),
            "tx": txs,
        })
    }
}
