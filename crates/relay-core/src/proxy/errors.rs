use crate::upstream::errors::UpstreamError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProxyError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Preserves concrete `UpstreamError` type for retry/fallback decisions.
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

impl ProxyError {
    /// `true` when repeating the call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Upstream(e) => e.is_transient(),
            Self::InvalidRequest(_) | Self::MethodNotAllowed(_) => false,
        }
    }

    /// Returns a static string representation for metrics labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::MethodNotAllowed(_) => "method_not_allowed",
            Self::Upstream(e) => e.kind(),
        }
    }
}
