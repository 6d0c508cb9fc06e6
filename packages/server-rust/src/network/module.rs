//! Network module with deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the listener and reports
//! the bound port, `serve()` accepts streams until the shutdown future
//! resolves and then drains. Broker registration happens between `start()`
//! and `serve()`, once the port is known.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::connection::StreamRegistry;
use super::handlers::{
    batch_stream_handler, event_stream_handler, health_handler, liveness_handler,
    readiness_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::{SnapshotHandle, Stage};

pub const EVENT_STREAM_PATH: &str = "/v1/rules";
pub const BATCH_STREAM_PATH: &str = "/v1/rules/batch";

/// Manages the HTTP/WebSocket server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    stage: Stage,
    aggregate: SnapshotHandle,
    streams: Arc<StreamRegistry>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, stage: Stage, aggregate: SnapshotHandle) -> Self {
        Self {
            config,
            listener: None,
            stage,
            aggregate,
            streams: Arc::new(StreamRegistry::new()),
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn streams(&self) -> Arc<StreamRegistry> {
        Arc::clone(&self.streams)
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the router.
    ///
    /// Routes:
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- liveness probe
    /// - `GET /health/ready` -- readiness probe
    /// - `GET /v1/rules` -- event-mode stream (WebSocket upgrade)
    /// - `GET /v1/rules/batch` -- batch-mode stream (WebSocket upgrade)
    pub fn build_router(&self) -> Router {
        let state = AppState {
            stage: self.stage.clone(),
            streams: Arc::clone(&self.streams),
            shutdown: Arc::clone(&self.shutdown),
            aggregate: Arc::clone(&self.aggregate),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route(EVENT_STREAM_PATH, get(event_stream_handler))
            .route(BATCH_STREAM_PATH, get(batch_stream_handler))
            .layer(build_http_layers())
            .with_state(state)
    }

    /// Binds the TCP listener and returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains open streams.
    ///
    /// On shutdown the pool is closed so queued streams are turned away,
    /// running streams stop reading and close once their responses are
    /// flushed, and the module waits up to `drain_timeout` for them.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a fatal
    /// I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();

        let controller = Arc::clone(&self.shutdown);
        let signal = async move {
            shutdown.await;
            controller.trigger_shutdown();
        };

        self.shutdown.set_ready();
        info!("serving rule streams");

        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await?;

        self.drain().await;
        Ok(())
    }

    async fn drain(&self) {
        self.shutdown.trigger_shutdown();
        self.stage.pool().close();

        let open = self.streams.count();
        if open > 0 {
            info!(open, "draining streams");
        }
        if self
            .shutdown
            .wait_for_drain(&self.streams, self.config.drain_timeout)
            .await
        {
            info!("all streams drained");
        } else {
            warn!(open = self.streams.count(), "drain timeout expired with streams open");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use arc_swap::ArcSwap;

    use super::*;
    use crate::network::HealthState;
    use crate::service::{AggregateSnapshot, StageConfig};

    fn module(config: NetworkConfig) -> NetworkModule {
        NetworkModule::new(
            config,
            Stage::new(StageConfig::default(), None),
            Arc::new(ArcSwap::from_pointee(AggregateSnapshot::default())),
        )
    }

    fn ephemeral() -> NetworkConfig {
        NetworkConfig {
            port: 0,
            drain_timeout: Duration::from_millis(200),
            ..NetworkConfig::default()
        }
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = module(NetworkConfig::default());
        assert!(module.listener.is_none());
        assert!(Arc::ptr_eq(&module.streams(), &module.streams()));
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = module(ephemeral());
        let port = module.start().await.unwrap();
        assert!(port > 0);
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    async fn serve_without_start_is_an_error() {
        let module = module(ephemeral());
        assert!(module.serve(std::future::ready(())).await.is_err());
    }

    #[tokio::test]
    async fn serve_drains_and_stops_on_shutdown() {
        let mut module = module(ephemeral());
        module.start().await.unwrap();
        let controller = module.shutdown_controller();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(module.serve(async {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(controller.health_state(), HealthState::Ready);

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        assert_eq!(controller.health_state(), HealthState::Stopped);
    }
}
