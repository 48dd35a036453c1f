// ============================================================================
// Message Transport
// ============================================================================
//
// Broker abstraction used by the endpoint runners and the error-event sink.
// Delivery is at-least-once: an entry that is received but never acked is
// handed out again once the broker considers it abandoned.
//
// ============================================================================

mod redis_streams;

pub use redis_streams::RedisStreamsTransport;

use async_trait::async_trait;
use identity_error::AppResult;
use identity_types::MessageEnvelope;
use std::time::Duration;

/// Stream entry field holding the serialized envelope
pub const ENVELOPE_FIELD: &str = "envelope";

/// A message handed to this consumer, not yet acknowledged
#[derive(Debug, Clone)]
pub struct Delivery {
    pub queue: String,
    /// Broker-assigned id used to acknowledge the delivery
    pub delivery_tag: String,
    /// 1 on first delivery, incremented on every broker redelivery
    pub delivery_count: u32,
    /// Raw envelope JSON
    pub body: String,
}

impl Delivery {
    /// Parse the envelope; a body that does not parse is a poison message
    pub fn envelope(&self) -> AppResult<MessageEnvelope> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Create the queue (and its consumer group) if missing
    async fn ensure_queue(&self, queue: &str) -> AppResult<()>;

    async fn publish(&self, queue: &str, envelope: &MessageEnvelope) -> AppResult<()>;

    /// Wait up to `wait` for the next delivery
    async fn receive(&self, queue: &str, wait: Duration) -> AppResult<Option<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> AppResult<()>;

    /// Move the delivery to the queue's error path and acknowledge it
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use identity_types::DeleteUser;

    #[test]
    fn test_delivery_envelope_parsing() {
        let envelope = MessageEnvelope::with_id(
            "m-1",
            &DeleteUser {
                user_id: "u1".to_string(),
            },
        )
        .unwrap();
        let delivery = Delivery {
            queue: "DeleteUser".to_string(),
            delivery_tag: "1-0".to_string(),
            delivery_count: 1,
            body: serde_json::to_string(&envelope).unwrap(),
        };
        assert_eq!(delivery.envelope().unwrap().message_id, "m-1");

        let poison = Delivery {
            body: "not json".to_string(),
            ..delivery
        };
        assert!(poison.envelope().is_err());
    }
}
