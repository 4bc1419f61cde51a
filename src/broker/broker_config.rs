use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::config::{Config, parse_port};
use crate::protocol::DEFAULT_PORT;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;

/// Listener settings, read from the `[Broker]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// How long `stop()` waits for sessions before forcing their sockets closed.
    pub shutdown_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            shutdown_timeout: Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS),
        }
    }
}

impl BrokerConfig {
    pub fn from_config(config: &Config) -> Result<Self, String> {
        let default_port = DEFAULT_PORT.to_string();
        let host = config
            .get_non_empty_or_default("Broker", "host", DEFAULT_HOST)
            .to_string();
        let port = parse_port(config.get_non_empty_or_default("Broker", "port", &default_port))?;

        let timeout_text = config.get_non_empty_or_default("Broker", "shutdown_timeout_ms", "");
        let shutdown_timeout = if timeout_text.is_empty() {
            Duration::from_millis(DEFAULT_SHUTDOWN_TIMEOUT_MS)
        } else {
            let ms: u64 = timeout_text
                .parse()
                .map_err(|_| format!("Invalid shutdown_timeout_ms: {timeout_text}"))?;
            Duration::from_millis(ms)
        };

        Ok(Self {
            host,
            port,
            shutdown_timeout,
        })
    }

    /// Loopback-only broker on `port`; `0` picks an ephemeral port.
    pub fn local(port: u16) -> Self {
        Self {
            host: Ipv4Addr::LOCALHOST.to_string(),
            port,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn bind_addr(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => SocketAddr::new(IpAddr::V6(ip), self.port).to_string(),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}
