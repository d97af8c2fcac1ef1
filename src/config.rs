//! Configuration management
//!
//! Layered configuration in the usual order: built-in defaults, then an
//! optional YAML file, then `GATEWAY_`-prefixed environment variables.
//! All durations accept humantime strings (`"10m"`, `"30s"`).

use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::relay::WrapScheme;
use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Cache store configuration
    pub cache: CacheConfig,
    /// Failure tracker configuration
    pub failure: FailureTrackerConfig,
    /// Relay pool configuration
    pub relay: RelayConfig,
}

impl Config {
    /// Load configuration from an optional YAML file plus environment
    /// overrides (`GATEWAY_` prefix, `__` as the section separator)
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed("GATEWAY_").split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints that serde cannot express
    ///
    /// # Errors
    ///
    /// Returns an error for malformed relay URLs, a zero trip threshold, or
    /// any zero duration (windows, timeouts, TTLs, maintenance intervals).
    pub fn validate(&self) -> Result<()> {
        for endpoint in &self.relay.endpoints {
            Url::parse(&endpoint.base_url).map_err(|e| {
                Error::Config(format!(
                    "relay endpoint '{}' has an invalid base URL: {e}",
                    endpoint.name
                ))
            })?;
        }
        Url::parse(&self.relay.probe_target)
            .map_err(|e| Error::Config(format!("invalid relay probe target: {e}")))?;
        if self.failure.threshold == 0 {
            return Err(Error::Config("failure.threshold must be at least 1".into()));
        }
        if self.failure.window.is_zero() {
            return Err(Error::Config("failure.window must be non-zero".into()));
        }
        if self.relay.probe_timeout.is_zero() || self.relay.fetch_timeout.is_zero() {
            return Err(Error::Config("relay timeouts must be non-zero".into()));
        }
        if self.relay.health_check_interval.is_zero() {
            return Err(Error::Config(
                "relay.health_check_interval must be non-zero".into(),
            ));
        }
        for (name, ttl) in [
            ("cache.weather_ttl", self.cache.weather_ttl),
            ("cache.forecast_ttl", self.cache.forecast_ttl),
            ("cache.feed_ttl", self.cache.feed_ttl),
            ("cache.cleanup_horizon", self.cache.cleanup_horizon),
            ("cache.cleanup_interval", self.cache.cleanup_interval),
        ] {
            if ttl.is_zero() {
                return Err(Error::Config(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL for current weather conditions
    #[serde(with = "humantime_serde")]
    pub weather_ttl: Duration,
    /// TTL for forecast data
    #[serde(with = "humantime_serde")]
    pub forecast_ttl: Duration,
    /// TTL for feed articles
    #[serde(with = "humantime_serde")]
    pub feed_ttl: Duration,
    /// Entries older than this are purged regardless of their own TTL,
    /// bounding storage growth
    #[serde(with = "humantime_serde")]
    pub cleanup_horizon: Duration,
    /// How often the opportunistic cleanup pass runs
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            weather_ttl: Duration::from_secs(600),
            forecast_ttl: Duration::from_secs(600),
            feed_ttl: Duration::from_secs(1800),
            cleanup_horizon: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(600),
        }
    }
}

/// Failure tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailureTrackerConfig {
    /// Consecutive failures within the window that trip degraded mode
    pub threshold: u32,
    /// Sliding window bounding the consecutive count
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for FailureTrackerConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            window: Duration::from_secs(300),
        }
    }
}

/// Relay pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Ordered endpoint list; index 0 is the primary
    pub endpoints: Vec<RelayEndpointConfig>,
    /// Interval between scheduled health-check rounds
    #[serde(with = "humantime_serde")]
    pub health_check_interval: Duration,
    /// Per-endpoint probe timeout
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
    /// Known-good target the probes are issued against
    pub probe_target: String,
    /// Timeout for relayed payload fetches
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            health_check_interval: Duration::from_secs(900),
            probe_timeout: Duration::from_secs(10),
            probe_target: "https://example.com/".to_string(),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// A single relay endpoint definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEndpointConfig {
    /// Short name used in logs
    pub name: String,
    /// Base URL of the relay service
    pub base_url: String,
    /// How the target URL is embedded into a relayed request
    pub scheme: WrapScheme,
}

/// Built-in relay pool: each public CORS proxy has its own convention for
/// embedding the target URL, so the wrap scheme is stored per endpoint.
fn default_endpoints() -> Vec<RelayEndpointConfig> {
    vec![
        RelayEndpointConfig {
            name: "allorigins".to_string(),
            base_url: "https://api.allorigins.win/get".to_string(),
            scheme: WrapScheme::JsonEnvelope {
                param: "url".to_string(),
            },
        },
        RelayEndpointConfig {
            name: "corsproxy".to_string(),
            base_url: "https://corsproxy.io/".to_string(),
            scheme: WrapScheme::QueryParam {
                param: "url".to_string(),
            },
        },
        RelayEndpointConfig {
            name: "codetabs".to_string(),
            base_url: "https://api.codetabs.com/v1/proxy".to_string(),
            scheme: WrapScheme::PathAppend,
        },
    ]
}
