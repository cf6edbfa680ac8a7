// src/config/models.rs
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use url::Url;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("At least one backend must be configured")]
    NoBackends,

    #[error("Backend {0} must use http or https")]
    UnsupportedScheme(String),

    #[error("Backend {0} has no host")]
    MissingHost(String),

    #[error("Backend {0} is listed more than once")]
    DuplicateBackend(String),

    #[error("Invalid backend address {0:?}: {1}")]
    InvalidAddress(String, String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub health_check: HealthCheckConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.bind_address, self.server.port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            let url = &backend.url;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::UnsupportedScheme(url.to_string()));
            }
            if url.host_str().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingHost(url.to_string()));
            }
            if !seen.insert(url.as_str()) {
                return Err(ConfigError::DuplicateBackend(url.to_string()));
            }
        }

        self.retry.validate()?;

        if self.proxy.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "proxy.timeout_secs",
                reason: "must be greater than zero",
            });
        }

        if self.proxy.max_body_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "proxy.max_body_bytes",
                reason: "must be greater than zero",
            });
        }

        if self.health_check.enabled {
            if self.health_check.interval_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "health_check.interval_secs",
                    reason: "must be greater than zero",
                });
            }
            if self.health_check.timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "health_check.timeout_secs",
                    reason: "must be greater than zero",
                });
            }
        }

        if self.metrics.enabled && self.metrics.port == self.server.port {
            return Err(ConfigError::InvalidValue {
                field: "metrics.port",
                reason: "must differ from server.port",
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: Url,
}

impl BackendConfig {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| ConfigError::InvalidAddress(raw.to_string(), e.to_string()))?;
        Ok(Self { url })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Counts failed forwards, not retries: the backend is marked dead on the
    /// `retry_limit`-th failure, so a limit of 3 means one try plus two retries.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Equal to `delay_ms` for a fixed delay; larger values enable doubling.
    #[serde(default = "default_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub jitter: bool,
    /// Ceiling on distinct backend hops for a single request.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.retry_limit",
                reason: "must be at least 1",
            });
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts",
                reason: "must be at least 1",
            });
        }
        if self.max_delay_ms < self.delay_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_delay_ms",
                reason: "must not be smaller than retry.delay_ms",
            });
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_limit: default_retry_limit(),
            delay_ms: default_delay_ms(),
            max_delay_ms: default_delay_ms(),
            jitter: false,
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_timeout_secs")]
    pub timeout_secs: u64,
    /// Largest inbound body buffered for replay; larger requests get 413.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl ProxyConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_proxy_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_health_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_health_timeout_secs")]
    pub timeout_secs: u64,
    /// HTTP path to probe; a plain TCP connect is used when absent.
    #[serde(default)]
    pub path: Option<String>,
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_health_interval_secs(),
            timeout_secs: default_health_timeout_secs(),
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    3030
}

fn default_retry_limit() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_proxy_timeout_secs() -> u64 {
    30
}

fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_health_interval_secs() -> u64 {
    120
}

fn default_health_timeout_secs() -> u64 {
    2
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(urls: &[&str]) -> Config {
        Config {
            backends: urls
                .iter()
                .map(|u| BackendConfig::parse(u).unwrap())
                .collect(),
            ..Config::default()
        }
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.server.port, 3030);
        assert_eq!(config.retry.retry_limit, 3);
        assert_eq!(config.retry.delay(), Duration::from_millis(10));
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.health_check.enabled);
        assert!(config.health_check.path.is_none());
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_empty_backend_list_is_rejected() {
        assert_eq!(Config::default().validate(), Err(ConfigError::NoBackends));
    }

    #[test]
    fn test_valid_backends_pass() {
        let config = config_with(&["http://localhost:3031", "https://10.0.0.2:8443"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        let config = config_with(&["ftp://localhost:21"]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_rejects_duplicates() {
        let config = config_with(&["http://localhost:3031", "http://localhost:3031"]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateBackend(_))
        ));
    }

    #[test]
    fn test_unparseable_address() {
        assert!(matches!(
            BackendConfig::parse("not a url"),
            Err(ConfigError::InvalidAddress(_, _))
        ));
    }

    #[test]
    fn test_rejects_zero_retry_limit_and_shrinking_delay() {
        let mut config = config_with(&["http://localhost:3031"]);
        config.retry.retry_limit = 0;
        assert!(config.validate().is_err());

        let mut config = config_with(&["http://localhost:3031"]);
        config.retry.delay_ms = 50;
        config.retry.max_delay_ms = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_body_limit_defaults_and_rejects_zero() {
        let mut config = config_with(&["http://localhost:3031"]);
        assert_eq!(config.proxy.max_body_bytes, 10 * 1024 * 1024);
        config.proxy.max_body_bytes = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "proxy.max_body_bytes",
                reason: "must be greater than zero",
            })
        );
    }

    #[test]
    fn test_metrics_port_must_differ() {
        let mut config = config_with(&["http://localhost:3031"]);
        config.metrics.enabled = true;
        config.metrics.port = config.server.port;
        assert!(config.validate().is_err());
    }
}
