//! Process wiring: metrics aggregator, network module and broker
//! registration, started and stopped in order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::discovery::{
    register_best_effort, unregister_best_effort, BrokerClient, DiscoveryConfig, Registrar,
    RegistrationRecord,
};
use crate::network::{NetworkConfig, NetworkModule};
use crate::service::{BackgroundWorker, MetricsAggregator, Stage, StageConfig};

/// All configuration for one server process.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub stage: StageConfig,
    pub network: NetworkConfig,
    pub discovery: DiscoveryConfig,
}

/// A bound, not yet serving, stage server.
pub struct App {
    settings: Settings,
    module: NetworkModule,
    aggregator: BackgroundWorker<MetricsAggregator>,
    registrar: Option<Arc<dyn Registrar>>,
    port: u16,
}

impl App {
    /// Starts the metrics aggregator and binds the listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn bind(settings: Settings) -> anyhow::Result<Self> {
        let aggregator = MetricsAggregator::new(&settings.stage.service_name);
        let snapshot = aggregator.snapshot_handle();
        let tick = Duration::from_millis(settings.stage.report_interval_ms.max(1));
        let mut aggregator = BackgroundWorker::start(aggregator, tick);

        let stage = Stage::new(settings.stage.clone(), aggregator.sender());
        let mut module = NetworkModule::new(settings.network.clone(), stage, snapshot);
        let port = match module.start().await {
            Ok(port) => port,
            Err(e) => {
                aggregator.stop().await;
                return Err(e);
            }
        };

        let registrar = if settings.discovery.enabled {
            match BrokerClient::new(
                &settings.discovery.broker_address,
                settings.discovery.request_timeout,
            ) {
                Ok(client) => Some(Arc::new(client) as Arc<dyn Registrar>),
                Err(e) => {
                    error!(error = %e, "service broker client could not be built");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            settings,
            module,
            aggregator,
            registrar,
            port,
        })
    }

    /// Replaces the broker client.
    #[must_use]
    pub fn with_registrar(mut self, registrar: Arc<dyn Registrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    /// The bound port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Registers with the broker, serves until `shutdown` resolves, then
    /// unregisters and flushes the aggregator.
    ///
    /// # Errors
    ///
    /// Returns an error if the server hits a fatal I/O error.
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let Self {
            settings,
            module,
            mut aggregator,
            registrar,
            port,
        } = self;

        let record = RegistrationRecord::new(&settings.discovery, &settings.network.host, port);
        let registered = match &registrar {
            Some(registrar) => register_best_effort(registrar.as_ref(), &record).await,
            None => {
                info!("service broker registration disabled");
                false
            }
        };

        let served = module.serve(shutdown).await;

        if let (true, Some(registrar)) = (registered, &registrar) {
            unregister_best_effort(registrar.as_ref(), &record).await;
        }
        aggregator.stop().await;
        info!("server stopped");
        served
    }
}
