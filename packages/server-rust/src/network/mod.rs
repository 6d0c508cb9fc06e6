//! Transport: WebSocket stream endpoints, health probes, stream tracking and
//! shutdown control.

pub mod config;
pub mod connection;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use connection::*;
pub use handlers::AppState;
pub use module::{NetworkModule, BATCH_STREAM_PATH, EVENT_STREAM_PATH};
pub use shutdown::*;
