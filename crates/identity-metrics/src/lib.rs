//! Prometheus metrics for identity consumers
//!
//! Provides centralized metrics collection for monitoring:
//! - Message consumption outcomes and latency
//! - Dead-lettered messages and error-event publishing
//! - Circuit breaker states and resilience rejections

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    opts, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, Encoder, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
    TextEncoder,
};

// ============================================================================
// Consumption Metrics
// ============================================================================

/// Messages handled successfully, by message type
pub static MESSAGES_CONSUMED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "identity_messages_consumed_total",
            "Messages handled successfully"
        ),
        &["message_type"]
    )
    .expect("Failed to register MESSAGES_CONSUMED_TOTAL metric")
});

/// Messages skipped because their id was already recorded
pub static MESSAGES_ALREADY_CONSUMED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "identity_messages_already_consumed_total",
            "Messages skipped as duplicates"
        ),
        &["message_type"]
    )
    .expect("Failed to register MESSAGES_ALREADY_CONSUMED_TOTAL metric")
});

/// Handler failures, by message type
pub static MESSAGES_FAILED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "identity_messages_failed_total",
            "Messages whose handler failed"
        ),
        &["message_type"]
    )
    .expect("Failed to register MESSAGES_FAILED_TOTAL metric")
});

/// Wall time spent handling a message
pub static MESSAGE_PROCESSING_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "identity_message_processing_seconds",
        "Time spent consuming a message",
        &["message_type"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register MESSAGE_PROCESSING_SECONDS metric")
});

// ============================================================================
// Failure Routing Metrics
// ============================================================================

/// Messages moved to a queue's error stream
pub static MESSAGES_DEAD_LETTERED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "identity_messages_dead_lettered_total",
            "Messages moved to the error queue"
        ),
        &["queue"]
    )
    .expect("Failed to register MESSAGES_DEAD_LETTERED_TOTAL metric")
});

/// Error events that could not be published
pub static ERROR_EVENT_PUBLISH_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "identity_error_event_publish_failures_total",
        "Error events that failed to publish"
    ))
    .expect("Failed to register ERROR_EVENT_PUBLISH_FAILURES_TOTAL metric")
});

// ============================================================================
// Resilience Metrics
// ============================================================================

/// Circuit breaker state (0 = closed, 1 = open, 2 = half-open)
pub static CIRCUIT_BREAKER_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        opts!(
            "identity_circuit_breaker_state",
            "Circuit breaker state (0 closed, 1 open, 2 half-open)"
        ),
        &["pipeline"]
    )
    .expect("Failed to register CIRCUIT_BREAKER_STATE metric")
});

/// Calls refused by a pipeline without reaching the operation
pub static RESILIENCE_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "identity_resilience_rejections_total",
            "Calls rejected by a resilience pipeline"
        ),
        &["pipeline", "reason"]
    )
    .expect("Failed to register RESILIENCE_REJECTIONS_TOTAL metric")
});

/// Encode all registered metrics in the Prometheus text format
pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
