// ============================================================================
// Message Bus Configuration
// ============================================================================

use crate::constants::*;
use crate::env_or;
use std::time::Duration;

/// Broker-side redelivery applied when a message handler keeps failing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedeliveryConfig {
    pub retry_limit: u32,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub interval_delta: Duration,
}

impl Default for RedeliveryConfig {
    fn default() -> Self {
        Self {
            retry_limit: DEFAULT_REDELIVERY_RETRY_LIMIT,
            min_interval: Duration::from_millis(DEFAULT_REDELIVERY_MIN_INTERVAL_MS),
            max_interval: Duration::from_millis(DEFAULT_REDELIVERY_MAX_INTERVAL_MS),
            interval_delta: Duration::from_millis(DEFAULT_REDELIVERY_INTERVAL_DELTA_MS),
        }
    }
}

/// Queue naming and consumer-group settings for the Redis Streams bus
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Prefix of every queue stream: "{queue_prefix}{queue_name}"
    pub queue_prefix: String,
    pub consumer_group: String,
    /// Queue receiving published ErrorEvents
    pub error_event_queue: String,
    /// How long a receive call blocks waiting for new entries
    pub receive_block: Duration,
    /// Idle time after which an unacknowledged delivery is reclaimed
    pub visibility_timeout: Duration,
    pub redelivery: RedeliveryConfig,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_prefix: DEFAULT_QUEUE_PREFIX.to_string(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
            error_event_queue: DEFAULT_ERROR_EVENT_QUEUE.to_string(),
            receive_block: Duration::from_millis(DEFAULT_RECEIVE_BLOCK_MS),
            visibility_timeout: Duration::from_secs(DEFAULT_VISIBILITY_TIMEOUT_SECS),
            redelivery: RedeliveryConfig::default(),
        }
    }
}

impl BusConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            queue_prefix: std::env::var("BUS_QUEUE_PREFIX")
                .unwrap_or_else(|_| DEFAULT_QUEUE_PREFIX.to_string()),
            consumer_group: std::env::var("BUS_CONSUMER_GROUP")
                .unwrap_or_else(|_| DEFAULT_CONSUMER_GROUP.to_string()),
            error_event_queue: std::env::var("BUS_ERROR_EVENT_QUEUE")
                .unwrap_or_else(|_| DEFAULT_ERROR_EVENT_QUEUE.to_string()),
            receive_block: Duration::from_millis(env_or(
                "BUS_RECEIVE_BLOCK_MS",
                DEFAULT_RECEIVE_BLOCK_MS,
            )),
            visibility_timeout: Duration::from_secs(env_or(
                "BUS_VISIBILITY_TIMEOUT_SECS",
                DEFAULT_VISIBILITY_TIMEOUT_SECS,
            )),
            redelivery: RedeliveryConfig {
                retry_limit: env_or("BUS_REDELIVERY_RETRY_LIMIT", DEFAULT_REDELIVERY_RETRY_LIMIT),
                min_interval: Duration::from_millis(env_or(
                    "BUS_REDELIVERY_MIN_INTERVAL_MS",
                    DEFAULT_REDELIVERY_MIN_INTERVAL_MS,
                )),
                max_interval: Duration::from_millis(env_or(
                    "BUS_REDELIVERY_MAX_INTERVAL_MS",
                    DEFAULT_REDELIVERY_MAX_INTERVAL_MS,
                )),
                interval_delta: Duration::from_millis(env_or(
                    "BUS_REDELIVERY_INTERVAL_DELTA_MS",
                    DEFAULT_REDELIVERY_INTERVAL_DELTA_MS,
                )),
            },
        }
    }
}
