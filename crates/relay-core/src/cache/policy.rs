use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Freshness class of a daemon method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodClass {
    /// Changes with every block or mempool update.
    Volatile,
    /// Everything not listed elsewhere.
    Default,
    /// Addressed by hash or height of already mined data.
    Immutable,
    /// Aggregate computations that take the daemon minutes to answer.
    Expensive,
}

impl MethodClass {
    #[must_use]
    pub fn of(method: &str) -> Self {
        match method {
            "getmempoolinfo" | "getrawmempool" | "getbestblockhash" | "getblockcount" => {
                Self::Volatile
            }
            "getblock" |
            "getblockhash" |
            "getblockheader" |
            "getrawtransaction" |
            "decoderawtransaction" => Self::Immutable,
            "gettxoutsetinfo" => Self::Expensive,
            _ => Self::Default,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Volatile => "volatile",
            Self::Default => "default",
            Self::Immutable => "immutable",
            Self::Expensive => "expensive",
        }
    }
}

/// Static method → TTL table with per-method overrides.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub volatile_ttl: Duration,
    pub default_ttl: Duration,
    pub immutable_ttl: Duration,
    pub expensive_ttl: Duration,
    /// Timeout budget for [`MethodClass::Expensive`] calls.
    pub expensive_timeout: Duration,
    pub overrides: AHashMap<String, Duration>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            volatile_ttl: Duration::from_secs(10),
            default_ttl: Duration::from_secs(60),
            immutable_ttl: Duration::from_secs(3600),
            expensive_ttl: Duration::from_secs(3600),
            expensive_timeout: Duration::from_secs(300),
            overrides: AHashMap::new(),
        }
    }
}

impl CachePolicy {
    #[must_use]
    pub fn ttl_for(&self, method: &str) -> Duration {
        if let Some(ttl) = self.overrides.get(method) {
            return *ttl;
        }
        match MethodClass::of(method) {
            MethodClass::Volatile => self.volatile_ttl,
            MethodClass::Default => self.default_ttl,
            MethodClass::Immutable => self.immutable_ttl,
            MethodClass::Expensive => self.expensive_ttl,
        }
    }

    /// Timeout to request from the gateway, `None` for the gateway default.
    #[must_use]
    pub fn timeout_for(&self, method: &str) -> Option<Duration> {
        (MethodClass::of(method) == MethodClass::Expensive).then_some(self.expensive_timeout)
    }
}
