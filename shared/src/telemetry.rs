// ============================================================================
// Telemetry
// ============================================================================
//
// Consumption events, exceptions and metrics reported by the consumer
// wrapper. Every record carries at least MessageType and MessageId.
//
// ============================================================================

use identity_error::AppError;
use identity_metrics::{
    MESSAGES_ALREADY_CONSUMED_TOTAL, MESSAGES_CONSUMED_TOTAL, MESSAGES_FAILED_TOTAL,
    MESSAGE_PROCESSING_SECONDS,
};
use std::collections::BTreeMap;

pub type TelemetryProperties = BTreeMap<String, String>;

pub const EVENT_MESSAGE_ALREADY_CONSUMED: &str = "MessageAlreadyConsumed";
pub const EVENT_MESSAGE_CONSUMED: &str = "MessageConsumed";
pub const EVENT_MESSAGE_FAILED: &str = "MessageFailed";
/// Milliseconds
pub const METRIC_MESSAGE_PROCESSING_DURATION: &str = "MessageProcessingDuration";

pub const PROP_MESSAGE_TYPE: &str = "MessageType";
pub const PROP_MESSAGE_ID: &str = "MessageId";
pub const PROP_CORRELATION_ID: &str = "CorrelationId";
pub const PROP_ACTION: &str = "Action";

pub trait Telemetry: Send + Sync {
    fn track_event(&self, name: &str, properties: &TelemetryProperties);
    fn track_exception(&self, error: &AppError, properties: &TelemetryProperties);
    fn track_metric(&self, name: &str, value: f64, properties: &TelemetryProperties);
}

/// Tracing records plus Prometheus counters
#[derive(Debug, Default, Clone)]
pub struct MetricsTelemetry;

impl MetricsTelemetry {
    pub fn new() -> Self {
        Self
    }
}

fn message_type(properties: &TelemetryProperties) -> &str {
    properties
        .get(PROP_MESSAGE_TYPE)
        .map(String::as_str)
        .unwrap_or("unknown")
}

fn message_id(properties: &TelemetryProperties) -> &str {
    properties
        .get(PROP_MESSAGE_ID)
        .map(String::as_str)
        .unwrap_or("")
}

impl Telemetry for MetricsTelemetry {
    fn track_event(&self, name: &str, properties: &TelemetryProperties) {
        let message_type = message_type(properties);

        match name {
            EVENT_MESSAGE_CONSUMED => MESSAGES_CONSUMED_TOTAL
                .with_label_values(&[message_type])
                .inc(),
            EVENT_MESSAGE_ALREADY_CONSUMED => MESSAGES_ALREADY_CONSUMED_TOTAL
                .with_label_values(&[message_type])
                .inc(),
            EVENT_MESSAGE_FAILED => MESSAGES_FAILED_TOTAL
                .with_label_values(&[message_type])
                .inc(),
            _ => {}
        }

        tracing::info!(
            event = name,
            message_type = message_type,
            message_id = message_id(properties),
            properties = ?properties,
            "Telemetry event"
        );
    }

    fn track_exception(&self, error: &AppError, properties: &TelemetryProperties) {
        tracing::error!(
            error = %error,
            error_code = error.error_code(),
            exception_type = %error.type_name(),
            message_type = message_type(properties),
            message_id = message_id(properties),
            properties = ?properties,
            "Telemetry exception"
        );
    }

    fn track_metric(&self, name: &str, value: f64, properties: &TelemetryProperties) {
        if name == METRIC_MESSAGE_PROCESSING_DURATION {
            MESSAGE_PROCESSING_SECONDS
                .with_label_values(&[message_type(properties)])
                .observe(value / 1000.0);
        }

        tracing::debug!(
            metric = name,
            value = value,
            message_type = message_type(properties),
            message_id = message_id(properties),
            "Telemetry metric"
        );
    }
}
