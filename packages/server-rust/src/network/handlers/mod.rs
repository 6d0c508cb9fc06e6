//! HTTP and WebSocket handlers for the stage server.
//!
//! Defines `AppState`, the shared state carried through axum extractors.

pub mod health;
pub mod stream;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use stream::{batch_stream_handler, event_stream_handler, StreamQuery};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController, StreamRegistry};
use crate::service::{SnapshotHandle, Stage};

/// Shared application state passed to all axum handlers via `State`.
///
/// Everything is behind `Arc` or a cheap handle, so cloning per request is
/// fine.
#[derive(Clone)]
pub struct AppState {
    /// Rule evaluator, enricher, stream pool and metrics sink.
    pub stage: Stage,
    /// Open streams, for health reporting and drain.
    pub streams: Arc<StreamRegistry>,
    pub shutdown: Arc<ShutdownController>,
    /// Latest server-wide totals from the metrics aggregator.
    pub aggregate: SnapshotHandle,
    pub config: Arc<NetworkConfig>,
    /// Used for uptime.
    pub start_time: Instant,
}
