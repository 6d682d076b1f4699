//! Server configuration
//!
//! Built-in defaults, then an optional `bikehood.toml` (or the file named by
//! `BIKEHOOD_CONFIG`), then `BIKEHOOD__*` environment variables, e.g.
//! `BIKEHOOD__DATABASE__URL=sqlite://data/bikehood.db`.

use crate::rate_limit::RateLimitConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Database selection; the URL `memory` keeps samples in process memory
pub const MEMORY_DATABASE_URL: &str = "memory";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub log: LogConfig,
    pub live: LiveConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/bikehood.db".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url == MEMORY_DATABASE_URL
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins, `*` allows any
    pub origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Seconds between live snapshot pushes on the WebSocket
    pub interval_secs: u64,
    /// Messages buffered per client before relayed events are dropped
    pub channel_capacity: usize,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            channel_capacity: 64,
        }
    }
}

impl LiveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl AppConfig {
    /// Load from `BIKEHOOD_CONFIG` (default `bikehood`) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("BIKEHOOD_CONFIG").unwrap_or_else(|_| "bikehood".to_string());
        Self::load_from(&path)
    }

    /// Load from a config file base name and the environment
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("BIKEHOOD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors.origins"),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.database.max_connections, 5);
        assert!(!config.database.is_memory());
        assert_eq!(config.cors.origins, vec!["*"]);
        assert_eq!(config.live.interval(), Duration::from_secs(10));
        assert!(!config.rate_limit.enabled);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load_from("definitely-not-a-config-file").unwrap();
        assert_eq!(config.log.level, "info");
        assert!(!config.log.json);
    }

    #[test]
    fn test_live_interval_never_zero() {
        let live = LiveConfig {
            interval_secs: 0,
            channel_capacity: 1,
        };
        assert_eq!(live.interval(), Duration::from_secs(1));
    }
}
