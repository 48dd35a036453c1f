use crate::resilience::ResiliencePipeline;
use crate::transport::MessageTransport;
use async_trait::async_trait;
use identity_error::{AppError, AppResult};
use identity_types::{ErrorEvent, MessageEnvelope};
use std::sync::Arc;
use uuid::Uuid;

/// Message type of published error events
pub const ERROR_EVENT_MESSAGE_TYPE: &str = "ErrorEvent";

/// Destination for error events raised by failed consumptions
#[async_trait]
pub trait ErrorEventSink: Send + Sync {
    async fn publish(&self, event: &ErrorEvent) -> AppResult<()>;
}

/// Publishes error events on the bus through the publish-only pipeline
pub struct TransportErrorEventSink {
    transport: Arc<dyn MessageTransport>,
    pipeline: Arc<ResiliencePipeline>,
    queue: String,
}

impl TransportErrorEventSink {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        pipeline: Arc<ResiliencePipeline>,
        queue: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            pipeline,
            queue: queue.into(),
        }
    }

    fn envelope(event: &ErrorEvent) -> AppResult<MessageEnvelope> {
        Ok(MessageEnvelope {
            message_id: Uuid::new_v4().to_string(),
            message_type: ERROR_EVENT_MESSAGE_TYPE.to_string(),
            correlation_id: event.correlation_id.clone(),
            conversation_id: event.conversation_id.clone(),
            sent_at: event.timestamp,
            payload: serde_json::to_value(event)?,
        })
    }
}

#[async_trait]
impl ErrorEventSink for TransportErrorEventSink {
    async fn publish(&self, event: &ErrorEvent) -> AppResult<()> {
        let envelope = Self::envelope(event)?;
        self.pipeline
            .execute(|| self.transport.publish(&self.queue, &envelope))
            .await
            .map_err(AppError::from)
    }
}
