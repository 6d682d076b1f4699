//! Rate Limiting Middleware using GCRA Algorithm
//!
//! Per-IP limits via tower_governor. The Generic Cell Rate Algorithm needs
//! no background task to replenish quota.

use governor::middleware::StateInformationMiddleware;
use serde::Deserialize;
use std::sync::Arc;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::PeerIpKeyExtractor;

/// Governor config with X-RateLimit-* headers enabled
pub type DefaultGovernorConfig =
    tower_governor::governor::GovernorConfig<PeerIpKeyExtractor, StateInformationMiddleware>;

/// Rate limiting configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Off by default; the dashboard polls several endpoints per refresh
    pub enabled: bool,
    /// Seconds per replenished request
    pub per_second: u64,
    /// Burst size (max requests that can be made immediately)
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            per_second: 1,
            burst_size: 20,
        }
    }
}

impl RateLimitConfig {
    /// Tighter settings for a publicly exposed deployment
    pub fn strict() -> Self {
        Self {
            enabled: true,
            per_second: 2,
            burst_size: 5,
        }
    }
}

/// Build the governor config for `GovernorLayer`.
///
/// Keys on the peer IP, so the service must be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`. Returns `None`
/// when the settings are rejected (zero period or burst).
pub fn create_governor_config(config: &RateLimitConfig) -> Option<Arc<DefaultGovernorConfig>> {
    GovernorConfigBuilder::default()
        .per_second(config.per_second)
        .burst_size(config.burst_size)
        .use_headers()
        .finish()
        .map(Arc::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.per_second, 1);
        assert_eq!(config.burst_size, 20);
    }

    #[test]
    fn test_create_governor_config() {
        assert!(create_governor_config(&RateLimitConfig::strict()).is_some());
    }

    #[test]
    fn test_zero_burst_rejected() {
        let config = RateLimitConfig {
            burst_size: 0,
            ..RateLimitConfig::default()
        };
        assert!(create_governor_config(&config).is_none());
    }
}
