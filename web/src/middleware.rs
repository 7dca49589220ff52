//! Request tracking middleware.
//!
//! Every request carries an `X-Correlation-ID`: the client's, if it sent
//! one, otherwise a fresh UUID v4. The id is recorded on the request's
//! tracing span and echoed back on the response.
//!
//! # Example
//!
//! ```ignore
//! let app = with_request_tracking(Router::new().route("/health", get(health_check)));
//! ```

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    Router,
};
use tower_http::request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Generates UUID v4 correlation ids for requests that arrive without one.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeCorrelationId;

impl MakeRequestId for MakeCorrelationId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Wraps `router` with correlation ids and a per-request tracing span.
#[must_use]
pub fn with_request_tracking<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let header = HeaderName::from_static(CORRELATION_ID_HEADER);

    // Layers run outermost-last: assign the id, open the span, echo the id.
    router
        .layer(PropagateRequestIdLayer::new(header.clone()))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let correlation_id = request
                .headers()
                .get(CORRELATION_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            tracing::info_span!(
                "http_request",
                correlation_id = %correlation_id,
                method = %request.method(),
                uri = %request.uri(),
            )
        }))
        .layer(SetRequestIdLayer::new(header, MakeCorrelationId))
}
