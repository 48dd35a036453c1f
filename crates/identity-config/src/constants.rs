// ============================================================================
// Configuration Constants
// ============================================================================

// Default port values
pub(crate) const DEFAULT_HEALTH_PORT: u16 = 8081;

pub(crate) const DEFAULT_CONSUMER_NAME: &str = "identity-consumer-worker";

// Resilience pipeline defaults
pub(crate) const DEFAULT_RESILIENCE_TIMEOUT_MS: u64 = 10_000;
pub(crate) const DEFAULT_RESILIENCE_RETRY_COUNT: u32 = 2;
pub(crate) const DEFAULT_RESILIENCE_RETRY_BASE_DELAY_MS: u64 = 200;
pub(crate) const DEFAULT_RESILIENCE_MAX_CONCURRENCY: usize = 50;
pub(crate) const DEFAULT_CIRCUIT_BREAKER_FAILURE_THRESHOLD: u32 = 10;
pub(crate) const DEFAULT_CIRCUIT_BREAKER_SAMPLING_WINDOW_SECS: u64 = 30;
pub(crate) const DEFAULT_CIRCUIT_BREAKER_FAILURE_RATIO: f64 = 1.0;
pub(crate) const DEFAULT_CIRCUIT_BREAKER_OPEN_DURATION_SECS: u64 = 30;

// Liveness defaults
pub(crate) const DEFAULT_APPLICATION_IDENTIFIER: &str = "identity-consumers:";
pub(crate) const DEFAULT_OWNER_FIELD: &str = "CONSUMERID";
pub(crate) const DEFAULT_LIVENESS_KEY_TTL_SECS: u64 = 60;
pub(crate) const DEFAULT_LIVENESS_MESSAGE_TTL_SECS: u64 = 300;
pub(crate) const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 15;

// Message bus defaults
pub(crate) const DEFAULT_QUEUE_PREFIX: &str = "identity:queue:";
pub(crate) const DEFAULT_CONSUMER_GROUP: &str = "identity-consumers";
pub(crate) const DEFAULT_ERROR_EVENT_QUEUE: &str = "ErrorEvent";
pub(crate) const DEFAULT_RECEIVE_BLOCK_MS: u64 = 1000;
pub(crate) const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 300;

// Redelivery (exponential): 1s base, 30s cap, 5 attempts, +2s delta
pub(crate) const DEFAULT_REDELIVERY_RETRY_LIMIT: u32 = 5;
pub(crate) const DEFAULT_REDELIVERY_MIN_INTERVAL_MS: u64 = 1_000;
pub(crate) const DEFAULT_REDELIVERY_MAX_INTERVAL_MS: u64 = 30_000;
pub(crate) const DEFAULT_REDELIVERY_INTERVAL_DELTA_MS: u64 = 2_000;

// Database pool defaults
pub(crate) const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
pub(crate) const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
pub(crate) const DEFAULT_DB_IDLE_TIMEOUT_SECS: u64 = 600;
