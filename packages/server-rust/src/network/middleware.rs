//! HTTP middleware stack for the stage server.
//!
//! Layers are listed outermost first. They apply to the health endpoints and
//! to WebSocket upgrade requests; upgraded sockets leave the stack once the
//! handshake completes.

use axum::http::header::HeaderName;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

/// The composed Tower layer type produced by [`build_http_layers`].
type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        TraceLayer<
            tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
        >,
        tower::layer::util::Stack<SetRequestIdLayer<MakeRequestUuid>, tower::layer::util::Identity>,
    >,
>;

/// Builds the HTTP-level middleware stack.
///
/// 1. `SetRequestId` assigns an `X-Request-Id` to every request
/// 2. `Tracing` opens a span per request
/// 3. `PropagateRequestId` copies the id onto the response
#[must_use]
pub fn build_http_layers() -> HttpLayers {
    let x_request_id = HeaderName::from_static("x-request-id");

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}
