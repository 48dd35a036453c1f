use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::commands::Command;

/// Transport-level wrapper around every message on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Unique per logical message; redeliveries keep the same id
    pub message_id: String,
    /// Command type name, e.g. "CreateOrUpdateUser"
    pub message_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    /// Wrap a command with a fresh message id
    pub fn for_command<C: Command>(command: &C) -> Result<Self, serde_json::Error> {
        Self::with_id(Uuid::new_v4().to_string(), command)
    }

    /// Wrap a command under an explicit message id
    pub fn with_id<C: Command>(
        message_id: impl Into<String>,
        command: &C,
    ) -> Result<Self, serde_json::Error> {
        let message_id = message_id.into();
        Ok(Self {
            conversation_id: Some(message_id.clone()),
            message_id,
            message_type: C::MESSAGE_TYPE.to_string(),
            correlation_id: None,
            sent_at: Utc::now(),
            payload: serde_json::to_value(command)?,
        })
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Deserialize the payload as command `C`
    pub fn decode<C: Command>(&self) -> Result<C, serde_json::Error> {
        C::deserialize(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CreateOrUpdateUser, DeleteGroup};

    #[test]
    fn test_envelope_wire_format() {
        let command = DeleteGroup {
            group_id: "g-1".to_string(),
        };
        let envelope = MessageEnvelope::with_id("m-1", &command)
            .unwrap()
            .with_correlation_id("c-1");

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["messageId"], "m-1");
        assert_eq!(json["messageType"], "DeleteGroup");
        assert_eq!(json["correlationId"], "c-1");
        assert_eq!(json["payload"]["groupId"], "g-1");
    }

    #[test]
    fn test_decode_rejects_mismatched_payload() {
        let envelope = MessageEnvelope::with_id(
            "m-2",
            &DeleteGroup {
                group_id: "g-1".to_string(),
            },
        )
        .unwrap();

        assert!(envelope.decode::<CreateOrUpdateUser>().is_err());
        assert_eq!(envelope.decode::<DeleteGroup>().unwrap().group_id, "g-1");
    }
}
