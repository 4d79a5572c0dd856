//! Configuration management for Tollgate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, TollgateError};
use crate::ratelimit::Limit;

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests allowed per client per hour
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u64,

    /// Requests allowed per client per minute
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u64,

    /// Maximum number of per-client entries held in the bucket store
    #[serde(default = "default_max_cache_entries")]
    pub max_cache_entries: usize,

    /// Minutes a client entry may sit idle before becoming evictable
    #[serde(default = "default_cache_idle_expiry_minutes")]
    pub cache_idle_expiry_minutes: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests_per_hour: default_requests_per_hour(),
            requests_per_minute: default_requests_per_minute(),
            max_cache_entries: default_max_cache_entries(),
            cache_idle_expiry_minutes: default_cache_idle_expiry_minutes(),
        }
    }
}

fn default_requests_per_hour() -> u64 {
    100
}

fn default_requests_per_minute() -> u64 {
    20
}

fn default_max_cache_entries() -> usize {
    100_000
}

fn default_cache_idle_expiry_minutes() -> u64 {
    10
}

impl RateLimitingConfig {
    /// Build the per-client limit windows from this configuration.
    ///
    /// Every client account carries both windows; a request must pass both.
    /// Fails when any capacity is zero, since a zero-capacity window would
    /// deny all traffic.
    pub fn limits(&self) -> Result<Vec<Limit>> {
        Ok(vec![
            Limit::new(self.requests_per_hour, Duration::from_secs(3600))?,
            Limit::new(self.requests_per_minute, Duration::from_secs(60))?,
        ])
    }

    /// The idle TTL after which an unused client entry may be evicted.
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_idle_expiry_minutes * 60)
    }

    /// Validate the configuration, failing fast on values that would
    /// produce an unserviceable limiter.
    pub fn validate(&self) -> Result<()> {
        self.limits()?;
        if self.max_cache_entries == 0 {
            return Err(TollgateError::Config(
                "max_cache_entries must be greater than zero".to_string(),
            ));
        }
        if self.cache_idle_expiry_minutes == 0 {
            return Err(TollgateError::Config(
                "cache_idle_expiry_minutes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl TollgateConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TollgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| TollgateError::Config(e.to_string()))?;
        config.rate_limiting.validate()?;
        Ok(config)
    }
}
