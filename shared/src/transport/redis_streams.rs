// ============================================================================
// Redis Streams Transport
// ============================================================================
//
// One stream per queue ({prefix}{queue}) with a shared consumer group so
// that several processes compete for entries.
//
// - receive: reclaim entries idle longer than the visibility timeout
//            (XPENDING + XCLAIM), otherwise XREADGROUP new entries
// - ack:     XACK
// - dead-letter: XADD to {stream}:error with the failure reason, then XACK
//
// XREADGROUP BLOCK runs on a dedicated connection per queue, opened on
// first receive. Everything else shares the client passed to `new`, so a
// pending blocking read never delays acks, publishes or liveness writes.
//
// ============================================================================

use super::{Delivery, MessageTransport, ENVELOPE_FIELD};
use async_trait::async_trait;
use chrono::Utc;
use identity_config::BusConfig;
use identity_error::{AppError, AppResult};
use identity_redis::{RedisClient, StreamEntry, StreamReadOptions};
use identity_types::MessageEnvelope;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Clone)]
pub struct RedisStreamsTransport {
    client: RedisClient,
    queue_prefix: String,
    group: String,
    consumer: String,
    visibility_timeout: Duration,
    /// Blocking-read connections keyed by stream
    readers: Arc<Mutex<HashMap<String, RedisClient>>>,
}

impl RedisStreamsTransport {
    /// `consumer` must be unique per process within the group
    pub fn new(client: RedisClient, bus: &BusConfig, consumer: impl Into<String>) -> Self {
        Self {
            client,
            queue_prefix: bus.queue_prefix.clone(),
            group: bus.consumer_group.clone(),
            consumer: consumer.into(),
            visibility_timeout: bus.visibility_timeout,
            readers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn reader(&self, stream: &str) -> AppResult<RedisClient> {
        let mut readers = self.readers.lock().await;
        if let Some(reader) = readers.get(stream) {
            return Ok(reader.clone());
        }
        let reader = self.client.dedicated().await?;
        debug!(stream = %stream, "Opened blocking-read connection");
        readers.insert(stream.to_string(), reader.clone());
        Ok(reader)
    }

    pub fn stream_key(&self, queue: &str) -> String {
        format!("{}{}", self.queue_prefix, queue)
    }

    pub fn error_stream_key(&self, queue: &str) -> String {
        format!("{}:error", self.stream_key(queue))
    }

    fn to_delivery(queue: &str, entry: StreamEntry, delivery_count: u32) -> Delivery {
        // A missing field leaves an empty body, which fails to parse downstream
        let body = entry.fields.get(ENVELOPE_FIELD).cloned().unwrap_or_default();
        Delivery {
            queue: queue.to_string(),
            delivery_tag: entry.id,
            delivery_count,
            body,
        }
    }
}

#[async_trait]
impl MessageTransport for RedisStreamsTransport {
    async fn ensure_queue(&self, queue: &str) -> AppResult<()> {
        let stream = self.stream_key(queue);
        let mut client = self.client.clone();
        client.xgroup_create(&stream, &self.group).await?;
        info!(stream = %stream, group = %self.group, "Queue ready");
        Ok(())
    }

    async fn publish(&self, queue: &str, envelope: &MessageEnvelope) -> AppResult<()> {
        let stream = self.stream_key(queue);
        let body = serde_json::to_string(envelope)?;
        let mut client = self.client.clone();
        let id = client
            .xadd(
                &stream,
                &[
                    (ENVELOPE_FIELD, body.as_str()),
                    ("messageType", envelope.message_type.as_str()),
                ],
            )
            .await?;
        debug!(
            stream = %stream,
            entry_id = %id,
            message_id = %envelope.message_id,
            "Message published"
        );
        Ok(())
    }

    async fn receive(&self, queue: &str, wait: Duration) -> AppResult<Option<Delivery>> {
        let stream = self.stream_key(queue);
        let mut client = self.client.clone();

        let reclaimed = client
            .claim_idle(&stream, &self.group, &self.consumer, self.visibility_timeout, 1)
            .await?;
        if let Some(claimed) = reclaimed.into_iter().next() {
            info!(
                stream = %stream,
                entry_id = %claimed.entry.id,
                times_delivered = claimed.times_delivered,
                "Reclaimed abandoned delivery"
            );
            let count = u32::try_from(claimed.times_delivered).unwrap_or(u32::MAX);
            return Ok(Some(Self::to_delivery(queue, claimed.entry, count)));
        }

        let mut reader = self.reader(&stream).await?;
        let entries = reader
            .xreadgroup(
                &self.group,
                &self.consumer,
                &[stream.as_str()],
                StreamReadOptions {
                    block: Some(wait.as_millis() as u64),
                    count: Some(1),
                },
            )
            .await?;

        match entries.into_iter().next() {
            Some(entry) => Ok(Some(Self::to_delivery(queue, entry, 1))),
            None => Ok(None),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> AppResult<()> {
        let stream = self.stream_key(&delivery.queue);
        let mut client = self.client.clone();
        let acked = client
            .xack(&stream, &self.group, &delivery.delivery_tag)
            .await?;
        if acked == 0 {
            return Err(AppError::transport(format!(
                "Delivery {} on {} was not pending",
                delivery.delivery_tag, stream
            )));
        }
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> AppResult<()> {
        let error_stream = self.error_stream_key(&delivery.queue);
        let delivery_count = delivery.delivery_count.to_string();
        let failed_at = Utc::now().to_rfc3339();
        let mut client = self.client.clone();

        client
            .xadd(
                &error_stream,
                &[
                    (ENVELOPE_FIELD, delivery.body.as_str()),
                    ("reason", reason),
                    ("sourceEntryId", delivery.delivery_tag.as_str()),
                    ("deliveryCount", delivery_count.as_str()),
                    ("failedAt", failed_at.as_str()),
                ],
            )
            .await?;

        self.ack(delivery).await
    }
}
