//! sieve — rules and enrichment stage of the event pipeline.
//!
//! Serves event-mode streams on `/v1/rules` and batch-mode streams on
//! `/v1/rules/batch`, registers with the service broker and runs until
//! Ctrl-C.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use sieve_core::DEFAULT_ITERATIONS;
use sieve_server::discovery::{DEFAULT_BROKER_ADDRESS, DEFAULT_INTERFACE_NAME, DEFAULT_ROLE};
use sieve_server::{App, DiscoveryConfig, NetworkConfig, Settings, StageConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

// ── CLI ─────────────────────────────────────────────────────────────

/// Rules and enrichment stage for the event pipeline.
#[derive(Parser, Debug)]
#[command(name = "sieve", version, about)]
struct Cli {
    /// Address to bind.
    #[arg(long, env = "SIEVE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind. 0 picks a free port.
    #[arg(long, env = "SIEVE_PORT", default_value_t = 6003)]
    port: u16,

    /// Service broker address, `host:port` or URL.
    #[arg(long, env = "SIEVE_BROKER", default_value = DEFAULT_BROKER_ADDRESS)]
    broker: String,

    /// Skip broker registration.
    #[arg(long, env = "SIEVE_NO_BROKER")]
    no_broker: bool,

    /// Interface name advertised to the broker.
    #[arg(long, env = "SIEVE_INTERFACE", default_value = DEFAULT_INTERFACE_NAME)]
    interface: String,

    /// Role advertised to the broker.
    #[arg(long, env = "SIEVE_ROLE", default_value = DEFAULT_ROLE)]
    role: String,

    /// Iterations of the work-item score loop.
    #[arg(long, env = "SIEVE_ITERATIONS", default_value_t = DEFAULT_ITERATIONS)]
    iterations: u32,

    /// Maximum streams processed at once; further streams wait.
    #[arg(long, env = "SIEVE_MAX_STREAMS", default_value_t = 8)]
    max_streams: usize,

    /// Responses buffered per stream before the dispatcher waits.
    #[arg(long, env = "SIEVE_OUTBOUND_CAPACITY", default_value_t = 128)]
    outbound_capacity: usize,

    /// Seconds between aggregate metrics reports.
    #[arg(long, env = "SIEVE_REPORT_INTERVAL", default_value_t = 10)]
    report_interval: u64,

    /// Seconds to wait for open streams on shutdown.
    #[arg(long, env = "SIEVE_DRAIN_TIMEOUT", default_value_t = 30)]
    drain_timeout: u64,

    /// Expose Prometheus metrics on this address.
    #[arg(long, env = "SIEVE_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Emit logs as JSON lines.
    #[arg(long, env = "SIEVE_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        let mut network = NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            drain_timeout: Duration::from_secs(self.drain_timeout),
            ..NetworkConfig::default()
        };
        network.connection.outbound_channel_capacity = self.outbound_capacity;

        Settings {
            stage: StageConfig {
                enrich_iterations: self.iterations,
                max_concurrent_streams: self.max_streams,
                report_interval_ms: self.report_interval.saturating_mul(1000),
                ..StageConfig::default()
            },
            network,
            discovery: DiscoveryConfig {
                enabled: !self.no_broker,
                broker_address: self.broker.clone(),
                interface_name: self.interface.clone(),
                role: self.role.clone(),
                ..DiscoveryConfig::default()
            },
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Some(addr) = cli.metrics_addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        info!(%addr, "prometheus exporter listening");
    }

    let app = App::bind(cli.settings()).await?;
    info!(port = app.port(), iterations = cli.iterations, "sieve starting");
    app.run(ctrl_c()).await
}
