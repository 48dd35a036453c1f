// ============================================================================
// Identity Config - Centralized configuration management
// ============================================================================
//
// Configuration for the identity consumer processes, loaded from environment
// variables (and an optional .env file) with defaults for everything except
// the connection URLs.
//
// ============================================================================

mod bus;
mod constants;
mod database;
mod liveness;
mod logging;
mod resilience;

pub use bus::{BusConfig, RedeliveryConfig};
pub use database::DbConfig;
pub use liveness::LivenessConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use resilience::ResilienceConfig;

use anyhow::{Context, Result};
use constants::*;
use std::str::FromStr;

/// Main configuration structure for the identity consumer services
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub health_port: u16,

    /// Name reported as the consumer in ErrorEvents and logs
    pub consumer_name: String,

    // Sub-configurations
    pub logging: LoggingConfig,
    pub resilience: ResilienceConfig,
    pub liveness: LivenessConfig,
    pub bus: BusConfig,
    pub db: DbConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            redis_url: std::env::var("REDIS_URL").context("REDIS_URL must be set")?,
            health_port: env_or("HEALTH_PORT", DEFAULT_HEALTH_PORT),
            consumer_name: std::env::var("CONSUMER_NAME")
                .unwrap_or_else(|_| DEFAULT_CONSUMER_NAME.to_string()),
            logging: LoggingConfig::from_env()?,
            resilience: ResilienceConfig::from_env(),
            liveness: LivenessConfig::from_env(),
            bus: BusConfig::from_env(),
            db: DbConfig::from_env(),
        })
    }

    /// Redis URL with credentials masked, for logging
    pub fn redis_url_safe(&self) -> String {
        if let Some(at_pos) = self.redis_url.find('@') {
            let protocol_end = self.redis_url.find("://").map(|p| p + 3).unwrap_or(0);
            format!(
                "{}***{}",
                &self.redis_url[..protocol_end],
                &self.redis_url[at_pos..]
            )
        } else {
            self.redis_url.clone()
        }
    }
}

/// Read and parse an environment variable, falling back to `default` when it is
/// unset or unparsable.
pub(crate) fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(variable = name, value = %raw, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
