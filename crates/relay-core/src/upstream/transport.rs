use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::Value;
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use crate::{
    types::{JsonRpcRequest, JsonRpcResponse},
    upstream::UpstreamError,
};

/// The upstream call primitive: one request/response exchange identified by a method name and a
/// positional parameter list.
///
/// Implementations must not enforce concurrency limits or retries; both belong to the layers
/// above. Per-call deadlines are enforced by the gateway, so an implementation only needs a
/// generous hard ceiling of its own.
#[async_trait]
pub trait UpstreamTransport: Send + Sync + 'static {
    /// Issues a single call against the daemon.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::Transport`] when the daemon cannot be reached or answers with a
    ///   non-JSON HTTP failure
    /// - [`UpstreamError::Rpc`] when the daemon returns a structured error
    /// - [`UpstreamError::Timeout`] when the transport's own ceiling elapses
    /// - [`UpstreamError::InvalidResponse`] when the body is not a JSON-RPC response
    async fn invoke(&self, method: &str, params: &[Value]) -> Result<Value, UpstreamError>;
}

/// Configuration for the daemon HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Daemon RPC endpoint, e.g. `http://127.0.0.1:14022`.
    pub url: String,
    /// RPC user for HTTP basic auth. Empty disables auth.
    pub username: String,
    /// RPC password for HTTP basic auth.
    pub password: String,
    /// Hard ceiling for a single HTTP exchange.
    pub request_timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:14022".to_string(),
            username: String::new(),
            password: String::new(),
            request_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// JSON-RPC over HTTP transport for bitcoind-family daemons.
///
/// Keeps at most one idle connection to the single daemon endpoint.
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
    next_id: AtomicU64,
}

// Note: Default is intentionally NOT implemented because HttpTransport::new() can fail.

impl HttpTransport {
    /// Creates a new transport with the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reqwest client fails to build.
    pub fn new(config: HttpTransportConfig) -> Result<Self, UpstreamError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(1)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("relay/", env!("CARGO_PKG_VERSION")))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                UpstreamError::Transport(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self { client, config, next_id: AtomicU64::new(1) })
    }

    /// Returns the configured daemon URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Sanitizes network errors to prevent leaking credentials embedded in URLs.
    fn sanitize_network_error(error: &reqwest::Error) -> String {
        if error.is_connect() {
            "connection refused or unreachable".to_string()
        } else if error.is_request() {
            "request failed".to_string()
        } else if error.is_body() {
            "response body error".to_string()
        } else if error.is_decode() {
            "response decode error".to_string()
        } else if error.is_redirect() {
            "unexpected redirect".to_string()
        } else {
            "network error".to_string()
        }
    }

    /// Interprets a daemon HTTP exchange.
    ///
    /// The daemon reports RPC errors with HTTP 500 and a JSON body, so the body is parsed
    /// before the status code is judged.
    pub(crate) fn parse_response(status: StatusCode, body: &[u8]) -> Result<Value, UpstreamError> {
        match serde_json::from_slice::<JsonRpcResponse>(body) {
            Ok(JsonRpcResponse { error: Some(error), .. }) => {
                Err(UpstreamError::Rpc { code: error.code, message: error.message })
            }
            Ok(JsonRpcResponse { result, .. }) if status.is_success() => {
                Ok(result.unwrap_or(Value::Null))
            }
            Ok(_) => Err(UpstreamError::Transport(format!("HTTP {}", status.as_u16()))),
            Err(e) if status.is_success() => Err(UpstreamError::InvalidResponse(e.to_string())),
            Err(_) => {
                let text = String::from_utf8_lossy(body);
                let sanitized = if text.len() > 256 {
                    format!("{}... (truncated)", text.chars().take(256).collect::<String>())
                } else {
                    text.into_owned()
                };
                Err(UpstreamError::Transport(format!("HTTP {}: {sanitized}", status.as_u16())))
            }
        }
    }
}

#[async_trait]
impl UpstreamTransport for HttpTransport {
    async fn invoke(&self, method: &str, params: &[Value]) -> Result<Value, UpstreamError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params.to_vec(), id);

        let mut builder = self.client.post(&self.config.url).json(&request);
        if !self.config.username.is_empty() {
            builder = builder.basic_auth(&self.config.username, Some(&self.config.password));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Transport(Self::sanitize_network_error(&e))
            }
        })?;

        let status = response.status();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout
            } else {
                UpstreamError::Transport(Self::sanitize_network_error(&e))
            }
        })?;

        tracing::trace!(method = method, id = id, status = status.as_u16(), "daemon call completed");
        Self::parse_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_config_default() {
        let config = HttpTransportConfig::default();
        assert_eq!(config.url, "http://127.0.0.1:14022");
        assert!(config.username.is_empty());
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_http_transport_new() {
        let transport = HttpTransport::new(HttpTransportConfig::default());
        assert!(transport.is_ok(), "HttpTransport::new() should succeed");
    }

    #[test]
    fn test_parse_success() {
        let body = br#"{"result":{"blocks":100},"error":null,"id":1}"#;
        let value = HttpTransport::parse_response(StatusCode::OK, body).unwrap();
        assert_eq!(value, json!({"blocks": 100}));
    }

    #[test]
    fn test_parse_null_result() {
        let body = br#"{"result":null,"error":null,"id":1}"#;
        let value = HttpTransport::parse_response(StatusCode::OK, body).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_parse_rpc_error_on_http_500() {
        let body = br#"{"result":null,"error":{"code":-5,"message":"Block not found"},"id":1}"#;
        let err = HttpTransport::parse_response(StatusCode::INTERNAL_SERVER_ERROR, body)
            .unwrap_err();
        assert_eq!(err, UpstreamError::Rpc { code: -5, message: "Block not found".into() });
    }

    #[test]
    fn test_parse_unauthorized_is_transport_error() {
        let err = HttpTransport::parse_response(StatusCode::UNAUTHORIZED, b"").unwrap_err();
        assert!(matches!(err, UpstreamError::Transport(ref msg) if msg.starts_with("HTTP 401")));
    }

    #[test]
    fn test_parse_garbage_on_success_is_invalid_response() {
        let err = HttpTransport::parse_response(StatusCode::OK, b"<html>").unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidResponse(_)));
    }

    #[test]
    fn test_long_error_body_truncated() {
        let body = "x".repeat(1000);
        let err =
            HttpTransport::parse_response(StatusCode::BAD_GATEWAY, body.as_bytes()).unwrap_err();
        match err {
            UpstreamError::Transport(msg) => assert!(msg.ends_with("(truncated)")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_daemon_is_transport_error() {
        let transport = HttpTransport::new(HttpTransportConfig {
            url: "http://127.0.0.1:1".to_string(),
            connect_timeout: Duration::from_millis(200),
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();

        let err = transport.invoke("getblockcount", &[]).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Transport(_) | UpstreamError::Timeout));
    }
}
