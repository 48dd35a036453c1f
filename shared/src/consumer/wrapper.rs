use super::context::ConsumeContext;
use super::error_events::ErrorEventSink;
use super::handler::CommandHandler;
use crate::deduplication::{ClaimOutcome, DeduplicationStore};
use crate::telemetry::{
    Telemetry, TelemetryProperties, EVENT_MESSAGE_ALREADY_CONSUMED, EVENT_MESSAGE_CONSUMED,
    EVENT_MESSAGE_FAILED, METRIC_MESSAGE_PROCESSING_DURATION, PROP_ACTION, PROP_CORRELATION_ID,
    PROP_MESSAGE_ID, PROP_MESSAGE_TYPE,
};
use chrono::Utc;
use identity_error::{AppError, AppResult};
use identity_metrics::ERROR_EVENT_PUBLISH_FAILURES_TOTAL;
use identity_types::ErrorEvent;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Failure of `consume`, split by whether the message id was claimed
#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    /// Dedup decision failed; the id was not claimed
    #[error("Deduplication failed: {0}")]
    Dedup(#[source] AppError),
    /// Handler failed after the id was claimed
    #[error("{0}")]
    Handler(#[source] AppError),
}

impl ConsumeError {
    pub fn error(&self) -> &AppError {
        match self {
            ConsumeError::Dedup(e) | ConsumeError::Handler(e) => e,
        }
    }

    pub fn into_inner(self) -> AppError {
        match self {
            ConsumeError::Dedup(e) | ConsumeError::Handler(e) => e,
        }
    }

    /// Whether this delivery holds the claim on the message id
    pub fn is_claimed(&self) -> bool {
        matches!(self, ConsumeError::Handler(_))
    }
}

impl From<ConsumeError> for AppError {
    fn from(err: ConsumeError) -> Self {
        err.into_inner()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Handler ran and succeeded
    Consumed,
    /// Id was already recorded; handler not invoked
    AlreadyConsumed,
}

/// Wraps one command handler with dedup, telemetry and error events.
///
/// `consume` records the message id before the handler runs. A handler
/// failure is reported and returned to the caller so the endpoint can
/// redeliver; redelivery within the same delivery goes through `redeliver`,
/// which skips the dedup check since this delivery holds the claim.
pub struct MessageConsumer<H: CommandHandler> {
    consumer_name: String,
    handler: Arc<H>,
    dedup: Arc<DeduplicationStore>,
    telemetry: Arc<dyn Telemetry>,
    error_sink: Arc<dyn ErrorEventSink>,
}

impl<H: CommandHandler> MessageConsumer<H> {
    pub fn new(
        consumer_name: impl Into<String>,
        handler: Arc<H>,
        dedup: Arc<DeduplicationStore>,
        telemetry: Arc<dyn Telemetry>,
        error_sink: Arc<dyn ErrorEventSink>,
    ) -> Self {
        Self {
            consumer_name: consumer_name.into(),
            handler,
            dedup,
            telemetry,
            error_sink,
        }
    }

    pub async fn consume(
        &self,
        ctx: &ConsumeContext<H::Command>,
    ) -> Result<ConsumeOutcome, ConsumeError> {
        let started = Instant::now();
        let properties = Self::properties(ctx);

        let result = match self.dedup.try_claim(&ctx.message_id).await {
            Ok(ClaimOutcome::AlreadyConsumed) => {
                info!(
                    message_id = %ctx.message_id,
                    message_type = %ctx.message_type,
                    "Message already consumed, skipping"
                );
                self.telemetry
                    .track_event(EVENT_MESSAGE_ALREADY_CONSUMED, &properties);
                Ok(ConsumeOutcome::AlreadyConsumed)
            }
            Ok(ClaimOutcome::Claimed) => self
                .run_handler(ctx, &properties)
                .await
                .map(|_| ConsumeOutcome::Consumed)
                .map_err(ConsumeError::Handler),
            Err(e) => {
                warn!(
                    message_id = %ctx.message_id,
                    error = %e,
                    "Deduplication check failed"
                );
                Err(ConsumeError::Dedup(e))
            }
        };

        self.track_duration(started, &properties);
        result
    }

    /// Handle again without the dedup check
    pub async fn redeliver(&self, ctx: &ConsumeContext<H::Command>) -> AppResult<()> {
        let started = Instant::now();
        let properties = Self::properties(ctx);

        let result = self.run_handler(ctx, &properties).await;

        self.track_duration(started, &properties);
        result
    }

    async fn run_handler(
        &self,
        ctx: &ConsumeContext<H::Command>,
        properties: &TelemetryProperties,
    ) -> AppResult<()> {
        match self.handler.handle(&ctx.message).await {
            Ok(()) => {
                self.telemetry.track_event(EVENT_MESSAGE_CONSUMED, properties);
                Ok(())
            }
            Err(error) => {
                self.report_failure(ctx, &error, properties).await;
                Err(error)
            }
        }
    }

    async fn report_failure(
        &self,
        ctx: &ConsumeContext<H::Command>,
        error: &AppError,
        properties: &TelemetryProperties,
    ) {
        let event = ErrorEvent {
            consumer_name: self.consumer_name.clone(),
            action: self.handler.action_name().to_string(),
            message_type: ctx.message_type.clone(),
            message_id: ctx.message_id.clone(),
            correlation_id: ctx.correlation_id.clone(),
            conversation_id: ctx.conversation_id.clone(),
            exception_type: error.type_name(),
            exception_message: error.to_string(),
            stack_trace: error.chain(),
            timestamp: Utc::now(),
            metadata: self.handler.failure_metadata(&ctx.message),
        };

        if let Err(publish_error) = self.error_sink.publish(&event).await {
            ERROR_EVENT_PUBLISH_FAILURES_TOTAL.inc();
            warn!(
                message_id = %ctx.message_id,
                error = %publish_error,
                original_error = %error,
                "Failed to publish error event"
            );
        }

        let mut properties = properties.clone();
        properties.insert(PROP_ACTION.to_string(), event.action);
        self.telemetry.track_exception(error, &properties);
        self.telemetry.track_event(EVENT_MESSAGE_FAILED, &properties);
    }

    fn track_duration(&self, started: Instant, properties: &TelemetryProperties) {
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.telemetry
            .track_metric(METRIC_MESSAGE_PROCESSING_DURATION, elapsed_ms, properties);
    }

    fn properties(ctx: &ConsumeContext<H::Command>) -> TelemetryProperties {
        let mut properties = TelemetryProperties::new();
        properties.insert(PROP_MESSAGE_TYPE.to_string(), ctx.message_type.clone());
        properties.insert(PROP_MESSAGE_ID.to_string(), ctx.message_id.clone());
        if let Some(correlation_id) = &ctx.correlation_id {
            properties.insert(PROP_CORRELATION_ID.to_string(), correlation_id.clone());
        }
        properties
    }
}
