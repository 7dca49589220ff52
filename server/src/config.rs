//! Configuration management for the ride coordination server.
//!
//! Loads configuration from environment variables with sensible defaults.

use rideshare_core::geo::DEFAULT_RADIUS_KM;
use rideshare_web::RealtimeSettings;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Real-time channel configuration
    pub realtime: RealtimeConfig,
    /// Identity configuration
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Real-time channel and search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Server ping interval in seconds
    pub ping_interval: u64,
    /// Idle timeout in seconds
    pub idle_timeout: u64,
    /// Outbound frames buffered per connection
    pub channel_capacity: usize,
    /// Radius for nearby searches that omit one, in kilometres
    pub default_radius_km: f64,
}

/// Identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// JSON token table; without one every credential is rejected
    pub users_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`; unset or unparseable values fall
    /// back to their defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            server: ServerConfig {
                host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(lookup("PORT"), 8080),
                log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
                shutdown_timeout: parse_or(lookup("SHUTDOWN_TIMEOUT"), 30),
            },
            realtime: RealtimeConfig {
                ping_interval: parse_or(lookup("WS_PING_INTERVAL"), 30),
                idle_timeout: parse_or(lookup("WS_IDLE_TIMEOUT"), 300),
                channel_capacity: parse_or(lookup("WS_CHANNEL_CAPACITY"), 64),
                default_radius_km: parse_or(lookup("NEARBY_DEFAULT_RADIUS_KM"), DEFAULT_RADIUS_KM),
            },
            auth: AuthConfig {
                users_file: lookup("AUTH_USERS_FILE")
                    .filter(|path| !path.trim().is_empty())
                    .map(PathBuf::from),
            },
        }
    }

    /// Address to bind, as `host:port`.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Upper bound on draining connections after a shutdown signal.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }

    /// Tunables handed to the web layer.
    #[must_use]
    pub fn realtime_settings(&self) -> RealtimeSettings {
        RealtimeSettings {
            ping_interval: Duration::from_secs(self.realtime.ping_interval.max(1)),
            idle_timeout: Duration::from_secs(self.realtime.idle_timeout.max(1)),
            channel_capacity: self.realtime.channel_capacity.max(1),
            default_radius_km: self.realtime.default_radius_km,
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}
