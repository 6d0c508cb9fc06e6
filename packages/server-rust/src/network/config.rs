//! Network configuration types for the stage server.

use std::time::Duration;

/// Top-level network configuration for the server.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Per-stream settings.
    pub connection: ConnectionConfig,
    /// How long shutdown waits for active streams to finish.
    pub drain_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6003,
            connection: ConnectionConfig::default(),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// Per-stream configuration controlling backpressure.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bounded channel capacity between a dispatcher and its socket writer.
    /// A full channel stalls the dispatcher rather than dropping responses.
    pub outbound_channel_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_channel_capacity: 128,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 6003);
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
        assert_eq!(config.connection.outbound_channel_capacity, 128);
    }
}
