// ============================================================================
// Resilience Configuration
// ============================================================================

use crate::constants::*;
use crate::env_or;
use std::time::Duration;

/// Tuning for the resilience pipelines wrapped around store and bus calls.
#[derive(Clone, Debug, PartialEq)]
pub struct ResilienceConfig {
    /// Per-attempt timeout
    pub timeout: Duration,
    /// Retries after the first attempt
    pub retry_count: u32,
    /// Base delay for exponential backoff (jitter is added on top)
    pub retry_base_delay: Duration,
    /// Concurrent executions allowed; extra callers are rejected, not queued
    pub max_concurrency: usize,
    /// Minimum calls sampled in the window before the breaker may open
    pub circuit_breaker_failure_threshold: u32,
    /// Sliding window over which call outcomes are sampled
    pub circuit_breaker_sampling_window: Duration,
    /// Failure ratio (0.0..=1.0) that opens the breaker
    pub circuit_breaker_failure_ratio: f64,
    /// How long the breaker stays open before admitting a trial call
    pub circuit_breaker_open_duration: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_RESILIENCE_TIMEOUT_MS),
            retry_count: DEFAULT_RESILIENCE_RETRY_COUNT,
            retry_base_delay: Duration::from_millis(DEFAULT_RESILIENCE_RETRY_BASE_DELAY_MS),
            max_concurrency: DEFAULT_RESILIENCE_MAX_CONCURRENCY,
            circuit_breaker_failure_threshold: DEFAULT_CIRCUIT_BREAKER_FAILURE_THRESHOLD,
            circuit_breaker_sampling_window: Duration::from_secs(
                DEFAULT_CIRCUIT_BREAKER_SAMPLING_WINDOW_SECS,
            ),
            circuit_breaker_failure_ratio: DEFAULT_CIRCUIT_BREAKER_FAILURE_RATIO,
            circuit_breaker_open_duration: Duration::from_secs(
                DEFAULT_CIRCUIT_BREAKER_OPEN_DURATION_SECS,
            ),
        }
    }
}

impl ResilienceConfig {
    pub(crate) fn from_env() -> Self {
        let defaults = Self::default();
        let ratio: f64 = env_or(
            "RESILIENCE_CIRCUIT_BREAKER_FAILURE_RATIO",
            defaults.circuit_breaker_failure_ratio,
        );

        Self {
            timeout: Duration::from_millis(env_or(
                "RESILIENCE_TIMEOUT_MS",
                DEFAULT_RESILIENCE_TIMEOUT_MS,
            )),
            retry_count: env_or("RESILIENCE_RETRY_COUNT", defaults.retry_count),
            retry_base_delay: Duration::from_millis(env_or(
                "RESILIENCE_RETRY_BASE_DELAY_MS",
                DEFAULT_RESILIENCE_RETRY_BASE_DELAY_MS,
            )),
            max_concurrency: env_or("RESILIENCE_MAX_CONCURRENCY", defaults.max_concurrency)
                .max(1),
            circuit_breaker_failure_threshold: env_or(
                "RESILIENCE_CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                defaults.circuit_breaker_failure_threshold,
            )
            .max(1),
            circuit_breaker_sampling_window: Duration::from_secs(env_or(
                "RESILIENCE_CIRCUIT_BREAKER_SAMPLING_WINDOW_SECS",
                DEFAULT_CIRCUIT_BREAKER_SAMPLING_WINDOW_SECS,
            )),
            circuit_breaker_failure_ratio: if (0.0..=1.0).contains(&ratio) {
                ratio
            } else {
                tracing::warn!(
                    ratio = ratio,
                    "RESILIENCE_CIRCUIT_BREAKER_FAILURE_RATIO out of range, using default"
                );
                defaults.circuit_breaker_failure_ratio
            },
            circuit_breaker_open_duration: Duration::from_secs(env_or(
                "RESILIENCE_CIRCUIT_BREAKER_OPEN_DURATION_SECS",
                DEFAULT_CIRCUIT_BREAKER_OPEN_DURATION_SECS,
            )),
        }
    }
}
