// ============================================================================
// Liveness Configuration
// ============================================================================

use crate::constants::*;
use crate::env_or;
use std::time::Duration;

/// Settings for the status/heartbeat keys published to the shared store.
#[derive(Clone, Debug)]
pub struct LivenessConfig {
    /// Namespace prepended to every key, so consumer and API pools don't collide
    pub application_identifier: String,
    /// Field naming the process that owns a per-message key
    pub owner_field: String,
    pub machine_name: String,
    /// TTL of the per-process key, refreshed on every write
    pub key_ttl: Duration,
    /// Safety-net TTL of per-message keys (they are deleted explicitly)
    pub message_ttl: Duration,
    pub heartbeat_interval: Duration,
}

impl LivenessConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            application_identifier: std::env::var("LIVENESS_APPLICATION_IDENTIFIER")
                .unwrap_or_else(|_| DEFAULT_APPLICATION_IDENTIFIER.to_string()),
            owner_field: std::env::var("LIVENESS_OWNER_FIELD")
                .unwrap_or_else(|_| DEFAULT_OWNER_FIELD.to_string()),
            machine_name: std::env::var("MACHINE_NAME")
                .or_else(|_| std::env::var("HOSTNAME"))
                .unwrap_or_else(|_| "unknown".to_string()),
            key_ttl: Duration::from_secs(env_or(
                "LIVENESS_KEY_TTL_SECS",
                DEFAULT_LIVENESS_KEY_TTL_SECS,
            )),
            message_ttl: Duration::from_secs(env_or(
                "LIVENESS_MESSAGE_TTL_SECS",
                DEFAULT_LIVENESS_MESSAGE_TTL_SECS,
            )),
            heartbeat_interval: Duration::from_secs(
                env_or(
                    "LIVENESS_HEARTBEAT_INTERVAL_SECS",
                    DEFAULT_HEARTBEAT_INTERVAL_SECS,
                )
                .max(1),
            ),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            application_identifier: DEFAULT_APPLICATION_IDENTIFIER.to_string(),
            owner_field: DEFAULT_OWNER_FIELD.to_string(),
            machine_name: "unknown".to_string(),
            key_ttl: Duration::from_secs(DEFAULT_LIVENESS_KEY_TTL_SECS),
            message_ttl: Duration::from_secs(DEFAULT_LIVENESS_MESSAGE_TTL_SECS),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
        }
    }
}
