//! Request ID propagation and per-request tracing spans.
//!
//! Every HTTP request gets an `x-request-id` (kept when the caller sent one) that is echoed on
//! the response and recorded on the request span, so log lines from the façade can be tied
//! back to the webhook or `/rpc` call that caused them.

use axum::http::{header::HeaderValue, HeaderName, Request};
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tracing::Span;
use uuid::Uuid;

pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// UUID v4 request IDs for tower-http's request ID middleware.
#[derive(Clone, Copy, Default)]
pub struct UuidRequestIdGenerator;

impl MakeRequestId for UuidRequestIdGenerator {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        Some(RequestId::new(HeaderValue::from_str(&id).ok()?))
    }
}

/// Returns `(set, propagate)`. Apply `propagate` first so it runs after `set`:
///
/// ```ignore
/// let (set_layer, propagate_layer) = create_request_id_layers();
/// let app = Router::new().route("/", get(handler)).layer(propagate_layer).layer(set_layer);
/// ```
#[must_use]
pub fn create_request_id_layers() -> (SetRequestIdLayer<UuidRequestIdGenerator>, PropagateRequestIdLayer)
{
    (
        SetRequestIdLayer::new(X_REQUEST_ID.clone(), UuidRequestIdGenerator),
        PropagateRequestIdLayer::new(X_REQUEST_ID.clone()),
    )
}

/// Span factory for `TraceLayer::make_span_with`.
pub fn request_span<B>(request: &Request<B>) -> Span {
    let request_id = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");

    tracing::info_span!(
        "http",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::ServiceExt;

    fn create_test_app() -> Router {
        let (set_layer, propagate_layer) = create_request_id_layers();
        Router::new().route("/test", get(|| async { "ok" })).layer(propagate_layer).layer(set_layer)
    }

    #[tokio::test]
    async fn test_generates_request_id_when_missing() {
        let response = create_test_app()
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let id = response.headers().get(&X_REQUEST_ID).expect("request id").to_str().unwrap();
        assert!(Uuid::parse_str(id).is_ok(), "generated id should be a UUID, got: {id}");
    }

    #[tokio::test]
    async fn test_preserves_caller_request_id() {
        let response = create_test_app()
            .oneshot(
                Request::builder()
                    .uri("/test")
                    .header(X_REQUEST_ID.clone(), "webhook-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers().get(&X_REQUEST_ID).unwrap(), "webhook-42");
    }
}
