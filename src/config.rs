// SPDX-License-Identifier: MIT
//! Service configuration.
//!
//! Handles loading configuration from environment variables with sensible defaults.
use std::net::SocketAddr;

use anyhow::{Context, Result};

use crate::forecast::DEFAULT_UPSTREAM_URL;
use crate::telemetry::TelemetryConfig;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 9090;

/// Service configuration.
///
/// Configuration values can be set via environment variables:
/// - `FORECAST_HOST`: The host address to bind to (default: "0.0.0.0")
/// - `FORECAST_PORT`: The port to listen on (default: 9090)
/// - `FORECAST_UPSTREAM_URL`: Base URL of the forecast provider
///
/// Telemetry settings come from [`TelemetryConfig::default`].
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// The host address to bind to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
    /// Base URL of the upstream forecast provider.
    pub upstream_url: String,
    /// Telemetry export settings.
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `FORECAST_PORT` is set but is not a valid port number.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("FORECAST_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("FORECAST_PORT")
            .ok()
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<u16>())
            .transpose()
            .context("FORECAST_PORT is not a valid port")?
            .unwrap_or(DEFAULT_PORT);

        let upstream_url = std::env::var("FORECAST_UPSTREAM_URL")
            .unwrap_or_else(|_| DEFAULT_UPSTREAM_URL.to_string());

        Ok(Self {
            host,
            port,
            upstream_url,
            telemetry: TelemetryConfig::default(),
        })
    }

    /// Returns the socket address for binding.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9090);
        assert_eq!(config.upstream_url, "https://api.open-meteo.com");
    }

    #[test]
    fn test_config_socket_addr() {
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
            ..AppConfig::default()
        };
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_config_rejects_bad_host() {
        let config = AppConfig {
            host: "not an address".to_string(),
            ..AppConfig::default()
        };
        assert!(config.socket_addr().is_err());
    }
}
