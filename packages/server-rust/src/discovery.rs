//! Service-broker registration.
//!
//! On startup the stage advertises its interface, role and listen address to
//! the pipeline's service broker so upstream stages can find it. Registration
//! is best effort: failures are logged and the server keeps serving.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

pub const DEFAULT_BROKER_ADDRESS: &str = "127.0.0.1:50051";
pub const DEFAULT_INTERFACE_NAME: &str = "pipeline.v1.RulesService";
pub const DEFAULT_ROLE: &str = "default";

const REGISTER_PATH: &str = "/v1/services/register";
const UNREGISTER_PATH: &str = "/v1/services/unregister";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Whether to register with the broker at all.
    pub enabled: bool,
    /// `host:port` or full URL of the broker.
    pub broker_address: String,
    pub interface_name: String,
    pub role: String,
    /// Per-request timeout for broker calls.
    pub request_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            broker_address: DEFAULT_BROKER_ADDRESS.to_string(),
            interface_name: DEFAULT_INTERFACE_NAME.to_string(),
            role: DEFAULT_ROLE.to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

// ---------------------------------------------------------------------------
// Records and errors
// ---------------------------------------------------------------------------

/// What this process advertises to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationRecord {
    pub interface_name: String,
    pub role: String,
    pub host: String,
    pub port: u16,
}

impl RegistrationRecord {
    #[must_use]
    pub fn new(config: &DiscoveryConfig, host: &str, port: u16) -> Self {
        Self {
            interface_name: config.interface_name.clone(),
            role: config.role.clone(),
            host: host.to_string(),
            port,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceInfo<'a> {
    interface_name: &'a str,
    role: &'a str,
}

#[derive(Debug, Serialize)]
struct RegisterBody<'a> {
    info: ServiceInfo<'a>,
    url: &'a str,
    port: u16,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UnregisterBody<'a> {
    interface_name: &'a str,
    role: &'a str,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("broker request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("broker rejected {operation} with status {status}")]
    Rejected { operation: &'static str, status: u16 },
}

// ---------------------------------------------------------------------------
// Registrar
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Registrar: Send + Sync {
    /// Registers `record` with the broker.
    async fn register(&self, record: &RegistrationRecord) -> Result<(), RegistrationError>;

    /// Removes the registration made for `record`.
    async fn unregister(&self, record: &RegistrationRecord) -> Result<(), RegistrationError>;

    /// Where requests go, for log lines.
    fn target(&self) -> &str;
}

/// [`Registrar`] backed by the broker's HTTP/JSON API.
#[derive(Debug, Clone)]
pub struct BrokerClient {
    base_url: String,
    client: reqwest::Client,
}

impl BrokerClient {
    /// Builds a client for `broker_address`. A bare `host:port` gets an
    /// `http://` scheme.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::Http` if the HTTP client cannot be built.
    pub fn new(broker_address: &str, timeout: Duration) -> Result<Self, RegistrationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: broker_base_url(broker_address),
            client,
        })
    }

    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        operation: &'static str,
        body: &B,
    ) -> Result<(), RegistrationError> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RegistrationError::Rejected {
                operation,
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl Registrar for BrokerClient {
    async fn register(&self, record: &RegistrationRecord) -> Result<(), RegistrationError> {
        let body = RegisterBody {
            info: ServiceInfo {
                interface_name: &record.interface_name,
                role: &record.role,
            },
            url: &record.host,
            port: record.port,
        };
        self.post(REGISTER_PATH, "register", &body).await
    }

    async fn unregister(&self, record: &RegistrationRecord) -> Result<(), RegistrationError> {
        let body = UnregisterBody {
            interface_name: &record.interface_name,
            role: &record.role,
        };
        self.post(UNREGISTER_PATH, "unregister", &body).await
    }

    fn target(&self) -> &str {
        &self.base_url
    }
}

fn broker_base_url(address: &str) -> String {
    let address = address.trim().trim_end_matches('/');
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    }
}

/// Registers `record`, logging instead of failing.
///
/// Returns whether the broker accepted the registration.
pub async fn register_best_effort(registrar: &dyn Registrar, record: &RegistrationRecord) -> bool {
    match registrar.register(record).await {
        Ok(()) => {
            info!(
                broker = registrar.target(),
                interface = %record.interface_name,
                role = %record.role,
                host = %record.host,
                port = record.port,
                "registered with service broker"
            );
            true
        }
        Err(e) => {
            error!(
                broker = registrar.target(),
                interface = %record.interface_name,
                error = %e,
                "service broker registration failed; serving unregistered"
            );
            false
        }
    }
}

/// Removes the registration, logging failures.
pub async fn unregister_best_effort(registrar: &dyn Registrar, record: &RegistrationRecord) {
    match registrar.unregister(record).await {
        Ok(()) => info!(
            broker = registrar.target(),
            interface = %record.interface_name,
            "unregistered from service broker"
        ),
        Err(e) => warn!(
            broker = registrar.target(),
            interface = %record.interface_name,
            error = %e,
            "service broker unregistration failed"
        ),
    }
}
