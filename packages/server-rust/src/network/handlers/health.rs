//! Health, liveness, and readiness endpoint handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use sieve_core::WireFormat;

use super::AppState;
use crate::network::HealthState;
use crate::service::StreamMode;

/// Returns detailed health information as JSON.
///
/// Always 200; the `state` field carries the actual health.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let pool = state.stage.pool();
    let totals = state.aggregate.load();

    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "streams": {
            "open": state.streams.count(),
            "event": state.streams.count_by_mode(StreamMode::Event),
            "batch": state.streams.count_by_mode(StreamMode::Batch),
            "msgpack": state.streams.count_by_format(WireFormat::MsgPack),
            "oldest_age_ms": state
                .streams
                .oldest_age()
                .map(|age| u64::try_from(age.as_millis()).unwrap_or(u64::MAX)),
            "active": pool.active(),
            "max_concurrent": pool.capacity(),
        },
        "totals": **totals,
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness probe. Always 200 while the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe. 200 only in the `Ready` state.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
