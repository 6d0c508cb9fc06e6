//! Sieve server: the rules and enrichment stage of the event pipeline,
//! served as WebSocket streams.

pub mod app;
pub mod discovery;
pub mod network;
pub mod service;

pub use app::{App, Settings};
pub use discovery::{DiscoveryConfig, Registrar, RegistrationError, RegistrationRecord};
pub use network::NetworkConfig;
pub use service::StageConfig;
