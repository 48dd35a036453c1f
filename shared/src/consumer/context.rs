use chrono::{DateTime, Utc};
use identity_error::{AppError, AppResult};
use identity_types::{Command, MessageEnvelope};

/// A decoded message ready for its handler
#[derive(Debug, Clone)]
pub struct ConsumeContext<C> {
    pub message_id: String,
    pub message_type: String,
    pub correlation_id: Option<String>,
    pub conversation_id: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub message: C,
}

impl<C: Command> ConsumeContext<C> {
    /// Fails with `Validation` for a foreign message type and `Json` for a
    /// payload that does not decode.
    pub fn from_envelope(envelope: &MessageEnvelope) -> AppResult<Self> {
        if envelope.message_type != C::MESSAGE_TYPE {
            return Err(AppError::validation(format!(
                "Expected message type {}, got {}",
                C::MESSAGE_TYPE,
                envelope.message_type
            )));
        }

        Ok(Self {
            message_id: envelope.message_id.clone(),
            message_type: envelope.message_type.clone(),
            correlation_id: envelope.correlation_id.clone(),
            conversation_id: envelope.conversation_id.clone(),
            sent_at: envelope.sent_at,
            message: envelope.decode::<C>()?,
        })
    }

    pub fn new(message_id: impl Into<String>, message: C) -> Self {
        let message_id = message_id.into();
        Self {
            conversation_id: Some(message_id.clone()),
            message_id,
            message_type: C::MESSAGE_TYPE.to_string(),
            correlation_id: None,
            sent_at: Utc::now(),
            message,
        }
    }
}
