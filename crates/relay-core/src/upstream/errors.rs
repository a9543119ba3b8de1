use thiserror::Error;

/// Classification of daemon RPC error codes.
///
/// Bitcoind-family daemons use small negative codes for application errors and the JSON-RPC
/// reserved range for protocol errors. The category drives retry decisions in the retry wrapper;
/// the gateway itself never retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcErrorCategory {
    /// Bad method or parameters. Retrying cannot help.
    ClientError,
    /// The daemon is loading its block index or verifying blocks (`-28`).
    Warmup,
    /// Requested object does not exist (`-5`), e.g. a txid that left the mempool.
    NotFound,
    /// Daemon-side failure (`-1` misc error, `-32603` internal error, anything unknown).
    DaemonError,
}

impl RpcErrorCategory {
    /// Classifies a daemon error code into a category.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            -32700..=-32600 | -8 | -3 => Self::ClientError,
            -28 => Self::Warmup,
            -5 => Self::NotFound,
            _ => Self::DaemonError,
        }
    }

    /// Returns `true` if retrying the same call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Warmup | Self::DaemonError)
    }

    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientError => "client_error",
            Self::Warmup => "warmup",
            Self::NotFound => "not_found",
            Self::DaemonError => "daemon_error",
        }
    }
}

/// Errors surfaced by the upstream call primitive and the dispatch gateway.
///
/// `Timeout`, `Transport` and `Rpc` are the three failure kinds callers must distinguish;
/// the remaining variants describe local conditions around the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum UpstreamError {
    /// No response within the per-call bound.
    #[error("Request timeout")]
    Timeout,

    /// Connection-level failure talking to the daemon (refused, reset, non-JSON HTTP error).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The daemon answered with a structured error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    /// The daemon answered but the body could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The gateway was shut down before the call could be dispatched.
    #[error("Dispatch queue closed")]
    QueueClosed,
}

impl UpstreamError {
    /// Returns the RPC error category if this is an RPC error.
    #[must_use]
    pub fn rpc_category(&self) -> Option<RpcErrorCategory> {
        match self {
            Self::Rpc { code, .. } => Some(RpcErrorCategory::from_code(*code)),
            _ => None,
        }
    }

    /// Returns `true` if this error is transient and the call may be retried by the caller.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Rpc { .. } => self.rpc_category().is_some_and(|cat| cat.is_transient()),
            Self::InvalidResponse(_) | Self::QueueClosed => false,
        }
    }

    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport(_) => "transport",
            Self::Rpc { .. } => "rpc",
            Self::InvalidResponse(_) => "invalid_response",
            Self::QueueClosed => "queue_closed",
        }
    }
}
