//! Gateway configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (VANTAGE_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use vantage_core::HubConfig;
use vantage_ingest::{IngestConfig, SyntheticConfig};

/// Gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Topic retention configuration.
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Upstream ingestion configuration.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,
}

/// Topic retention configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Retained history for the metrics topic.
    #[serde(default = "default_metrics_capacity")]
    pub metrics_capacity: usize,

    /// Retained history for the anomalies topic.
    #[serde(default = "default_anomalies_capacity")]
    pub anomalies_capacity: usize,

    /// Retained history for topics created on first use.
    #[serde(default = "default_metrics_capacity")]
    pub default_capacity: usize,

    /// Maximum subscriptions per session.
    #[serde(default = "default_max_subscriptions")]
    pub max_subscriptions_per_session: usize,
}

/// Upstream ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Fixed delay between reconnect attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Bound on releasing a subscription at shutdown, in milliseconds.
    #[serde(default = "default_release_timeout_ms")]
    pub release_timeout_ms: u64,

    /// Interval between synthetic batches, in milliseconds.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("VANTAGE_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("VANTAGE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_metrics_capacity() -> usize {
    100
}

fn default_anomalies_capacity() -> usize {
    20
}

fn default_max_subscriptions() -> usize {
    100
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_release_timeout_ms() -> u64 {
    2_000
}

fn default_sample_interval_ms() -> u64 {
    5_000
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            retention: RetentionConfig::default(),
            upstream: UpstreamConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            metrics_capacity: default_metrics_capacity(),
            anomalies_capacity: default_anomalies_capacity(),
            default_capacity: default_metrics_capacity(),
            max_subscriptions_per_session: default_max_subscriptions(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: default_retry_delay_ms(),
            release_timeout_ms: default_release_timeout_ms(),
            sample_interval_ms: default_sample_interval_ms(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "vantage.toml",
            "/etc/vantage/vantage.toml",
            "~/.config/vantage/vantage.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a valid address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address: {}:{}", self.host, self.port))
    }

    /// Hub configuration derived from the retention section.
    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            metrics_capacity: self.retention.metrics_capacity,
            anomalies_capacity: self.retention.anomalies_capacity,
            default_capacity: self.retention.default_capacity,
            max_subscriptions_per_session: self.retention.max_subscriptions_per_session,
        }
    }

    /// Ingestion adapter configuration derived from the upstream section.
    #[must_use]
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            retry_delay: Duration::from_millis(self.upstream.retry_delay_ms),
            release_timeout: Duration::from_millis(self.upstream.release_timeout_ms),
        }
    }

    /// Synthetic source configuration derived from the upstream section.
    #[must_use]
    pub fn synthetic_config(&self) -> SyntheticConfig {
        SyntheticConfig {
            interval: Duration::from_millis(self.upstream.sample_interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.retention.metrics_capacity, 100);
        assert_eq!(config.retention.anomalies_capacity, 20);
        assert_eq!(config.upstream.retry_delay_ms, 5_000);
        assert_eq!(config.transport.websocket_path, "/ws");
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr().unwrap();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [retention]
            metrics_capacity = 500

            [upstream]
            retry_delay_ms = 1000
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.retention.metrics_capacity, 500);
        assert_eq!(config.retention.anomalies_capacity, 20);
        assert_eq!(config.ingest_config().retry_delay, Duration::from_secs(1));
    }
}
