//! Gateway configuration
//!
//! Read from environment variables:
//! - PORT / BIND_HOST: listen address (default 0.0.0.0:8080)
//! - REDIS_URL: bus for multi-process fanout (unset = single process)
//! - JWT_SECRET: HS256 key for bearer tokens
//! - WS_OUTBOUND_QUEUE: per-connection outbound depth (default 256)
//! - WS_MAX_FRAME_BYTES: largest inbound frame (default 4096)
//! - WS_WRITE_TIMEOUT_SECS: deadline per socket write (default 10)
//! - WS_IDLE_TIMEOUT_SECS: read idle timeout; heartbeat at 90% of it (default 60)

use std::time::Duration;

use tracing::warn;

use crate::hub::DEFAULT_OUTBOUND_CAPACITY;

/// Development fallback, never meant for production
pub const DEV_JWT_SECRET: &str = "dev-secret-change-in-production";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
}

/// Floor for the heartbeat period; a zero tokio interval panics
const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

/// Per-connection transport limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub outbound_capacity: usize,
    pub max_frame_bytes: usize,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
}

impl SessionConfig {
    /// Heartbeat period: 90% of the idle timeout, never zero
    pub fn ping_interval(&self) -> Duration {
        (self.idle_timeout * 9 / 10).max(MIN_PING_INTERVAL)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            max_frame_bytes: 4096,
            write_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_host: String,
    pub port: u16,
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub session: SessionConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 8080,
            redis_url: None,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(host) = get("BIND_HOST") {
            config.bind_host = host;
        }
        if let Some(port) = get("PORT") {
            config.port = parse_number("PORT", &port)?;
        }
        config.redis_url = get("REDIS_URL");

        match get("JWT_SECRET") {
            Some(secret) => config.jwt_secret = secret,
            None => warn!("JWT_SECRET not set, using development secret"),
        }

        if let Some(v) = get("WS_OUTBOUND_QUEUE") {
            config.session.outbound_capacity = parse_number("WS_OUTBOUND_QUEUE", &v)?;
        }
        if let Some(v) = get("WS_MAX_FRAME_BYTES") {
            config.session.max_frame_bytes = parse_number("WS_MAX_FRAME_BYTES", &v)?;
        }
        if let Some(v) = get("WS_WRITE_TIMEOUT_SECS") {
            config.session.write_timeout =
                Duration::from_secs(parse_number("WS_WRITE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("WS_IDLE_TIMEOUT_SECS") {
            config.session.idle_timeout =
                Duration::from_secs(parse_number("WS_IDLE_TIMEOUT_SECS", &v)?);
        }

        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

fn parse_number<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
        assert_eq!(config.redis_url, None);
        assert_eq!(config.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.session.outbound_capacity, 256);
        assert_eq!(config.session.ping_interval(), Duration::from_secs(54));
    }

    #[test]
    fn test_overrides() {
        let config = GatewayConfig::from_lookup(lookup(&[
            ("PORT", "9000"),
            ("REDIS_URL", "redis://cache:6379"),
            ("JWT_SECRET", "s3cret"),
            ("WS_OUTBOUND_QUEUE", "32"),
            ("WS_IDLE_TIMEOUT_SECS", "20"),
        ]))
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.session.outbound_capacity, 32);
        assert_eq!(config.session.ping_interval(), Duration::from_secs(18));
    }

    #[test]
    fn test_empty_redis_url_means_single_process() {
        let config = GatewayConfig::from_lookup(lookup(&[("REDIS_URL", "  ")])).unwrap();
        assert_eq!(config.redis_url, None);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        assert!(GatewayConfig::from_lookup(lookup(&[("PORT", "http")])).is_err());
        assert!(GatewayConfig::from_lookup(lookup(&[("WS_OUTBOUND_QUEUE", "0")])).is_err());
    }

    #[test]
    fn test_ping_interval_never_zero() {
        let session = SessionConfig {
            idle_timeout: Duration::ZERO,
            ..SessionConfig::default()
        };
        assert_eq!(session.ping_interval(), Duration::from_millis(1));
    }
}
