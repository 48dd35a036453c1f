// ============================================================================
// Test Utilities for the consumption layer
// ============================================================================
//
// In-memory stand-ins for the broker, the liveness store, the processed
// message ledger, telemetry and error-event sinks, plus a scriptable user
// handler. Redis/PostgreSQL-backed tests live in redis_integration_test.rs.
//
// ============================================================================

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use identity_config::ResilienceConfig;
use identity_error::{AppError, AppResult};
use identity_shared::consumer::{CommandHandler, ErrorEventSink, MessageConsumer};
use identity_shared::deduplication::{DeduplicationStore, ProcessedMessageRepository};
use identity_shared::liveness::LivenessStore;
use identity_shared::resilience::ResiliencePipeline;
use identity_shared::telemetry::{Telemetry, TelemetryProperties};
use identity_shared::transport::{Delivery, MessageTransport};
use identity_types::{CreateOrUpdateUser, ErrorEvent, MessageEnvelope};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TEST_CONSUMER: &str = "test-consumer";

/// Pipeline settings that keep retries fast in tests
pub fn fast_resilience() -> ResilienceConfig {
    ResilienceConfig {
        timeout: Duration::from_secs(2),
        retry_base_delay: Duration::from_millis(1),
        ..ResilienceConfig::default()
    }
}

pub fn user_command(user_id: &str, username: &str) -> CreateOrUpdateUser {
    CreateOrUpdateUser {
        user_id: user_id.to_string(),
        username: username.to_string(),
        email: Some(format!("{}@example.com", username)),
        display_name: None,
        enabled: true,
    }
}

// ============================================================================
// Processed messages
// ============================================================================

#[derive(Default)]
pub struct InMemoryProcessedMessages {
    ids: Mutex<HashSet<String>>,
    pub fail: AtomicBool,
}

impl InMemoryProcessedMessages {
    pub fn contains(&self, message_id: &str) -> bool {
        self.ids.lock().unwrap().contains(message_id)
    }
}

#[async_trait]
impl ProcessedMessageRepository for InMemoryProcessedMessages {
    async fn exists(&self, message_id: &str) -> AppResult<bool> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::validation("ledger unavailable"));
        }
        // Yield so that concurrent callers interleave
        tokio::task::yield_now().await;
        Ok(self.contains(message_id))
    }

    async fn insert(&self, message_id: &str) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::validation("ledger unavailable"));
        }
        tokio::task::yield_now().await;
        self.ids.lock().unwrap().insert(message_id.to_string());
        Ok(())
    }
}

pub fn dedup_store(repository: Arc<InMemoryProcessedMessages>) -> Arc<DeduplicationStore> {
    let pipeline = ResiliencePipeline::full("test-dedup", &fast_resilience());
    Arc::new(DeduplicationStore::new(repository, Arc::new(pipeline)))
}

// ============================================================================
// Telemetry
// ============================================================================

#[derive(Default)]
pub struct RecordingTelemetry {
    pub events: Mutex<Vec<(String, TelemetryProperties)>>,
    pub exceptions: Mutex<Vec<(String, TelemetryProperties)>>,
    pub metrics: Mutex<Vec<(String, f64, TelemetryProperties)>>,
}

impl RecordingTelemetry {
    pub fn event_names(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn metric_count(&self, name: &str) -> usize {
        self.metrics
            .lock()
            .unwrap()
            .iter()
            .filter(|(n, _, _)| n == name)
            .count()
    }
}

impl Telemetry for RecordingTelemetry {
    fn track_event(&self, name: &str, properties: &TelemetryProperties) {
        self.events
            .lock()
            .unwrap()
            .push((name.to_string(), properties.clone()));
    }

    fn track_exception(&self, error: &AppError, properties: &TelemetryProperties) {
        self.exceptions
            .lock()
            .unwrap()
            .push((error.type_name(), properties.clone()));
    }

    fn track_metric(&self, name: &str, value: f64, properties: &TelemetryProperties) {
        self.metrics
            .lock()
            .unwrap()
            .push((name.to_string(), value, properties.clone()));
    }
}

// ============================================================================
// Error event sinks
// ============================================================================

#[derive(Default)]
pub struct RecordingErrorSink {
    pub events: Mutex<Vec<ErrorEvent>>,
}

#[async_trait]
impl ErrorEventSink for RecordingErrorSink {
    async fn publish(&self, event: &ErrorEvent) -> AppResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Always fails to publish
#[derive(Default)]
pub struct FailingErrorSink {
    pub attempts: AtomicU64,
}

#[async_trait]
impl ErrorEventSink for FailingErrorSink {
    async fn publish(&self, _event: &ErrorEvent) -> AppResult<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AppError::transport("error queue unreachable"))
    }
}

// ============================================================================
// Handler
// ============================================================================

/// User handler that records calls and fails with queued errors first
#[derive(Default)]
pub struct ScriptedUserHandler {
    pub calls: Mutex<Vec<CreateOrUpdateUser>>,
    failures: Mutex<VecDeque<AppError>>,
    pub delay: Option<Duration>,
}

impl ScriptedUserHandler {
    pub fn failing_with(errors: Vec<AppError>) -> Self {
        Self {
            failures: Mutex::new(errors.into()),
            ..Self::default()
        }
    }

    /// Succeeds after sleeping `delay` on every call
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandHandler for ScriptedUserHandler {
    type Command = CreateOrUpdateUser;

    fn failure_metadata(&self, command: &CreateOrUpdateUser) -> std::collections::BTreeMap<String, String> {
        std::collections::BTreeMap::from([("UserId".to_string(), command.user_id.clone())])
    }

    async fn handle(&self, command: &CreateOrUpdateUser) -> AppResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(command.clone());
        match self.failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Everything a consumer test needs, wired together
pub struct ConsumerHarness<S: ErrorEventSink + 'static> {
    pub handler: Arc<ScriptedUserHandler>,
    pub processed: Arc<InMemoryProcessedMessages>,
    pub telemetry: Arc<RecordingTelemetry>,
    pub sink: Arc<S>,
    pub consumer: Arc<MessageConsumer<ScriptedUserHandler>>,
}

impl<S: ErrorEventSink + Default + 'static> ConsumerHarness<S> {
    pub fn new(handler: ScriptedUserHandler) -> Self {
        let handler = Arc::new(handler);
        let processed = Arc::new(InMemoryProcessedMessages::default());
        let telemetry = Arc::new(RecordingTelemetry::default());
        let sink = Arc::new(S::default());
        let consumer = Arc::new(MessageConsumer::new(
            TEST_CONSUMER,
            handler.clone(),
            dedup_store(processed.clone()),
            telemetry.clone(),
            sink.clone(),
        ));
        Self {
            handler,
            processed,
            telemetry,
            sink,
            consumer,
        }
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Default)]
pub struct InMemoryTransport {
    queues: Mutex<HashMap<String, VecDeque<Delivery>>>,
    next_tag: AtomicU64,
    pub published: Mutex<Vec<(String, MessageEnvelope)>>,
    pub acked: Mutex<Vec<String>>,
    pub dead_lettered: Mutex<Vec<(Delivery, String)>>,
    pub fail_publish: AtomicBool,
}

impl InMemoryTransport {
    /// Enqueue a raw body, e.g. a poison message
    pub fn push_raw(&self, queue: &str, body: String) -> String {
        let tag = format!("{}-0", self.next_tag.fetch_add(1, Ordering::SeqCst) + 1);
        self.queues
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .push_back(Delivery {
                queue: queue.to_string(),
                delivery_tag: tag.clone(),
                delivery_count: 1,
                body,
            });
        tag
    }

    pub fn push(&self, queue: &str, envelope: &MessageEnvelope) -> String {
        self.push_raw(queue, serde_json::to_string(envelope).unwrap())
    }

    fn pop(&self, queue: &str) -> Option<Delivery> {
        self.queues
            .lock()
            .unwrap()
            .get_mut(queue)
            .and_then(VecDeque::pop_front)
    }

    pub fn pending(&self, queue: &str) -> usize {
        self.queues
            .lock()
            .unwrap()
            .get(queue)
            .map(VecDeque::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn ensure_queue(&self, queue: &str) -> AppResult<()> {
        self.queues
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, envelope: &MessageEnvelope) -> AppResult<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(AppError::transport("publish refused"));
        }
        self.published
            .lock()
            .unwrap()
            .push((queue.to_string(), envelope.clone()));
        Ok(())
    }

    async fn receive(&self, queue: &str, wait: Duration) -> AppResult<Option<Delivery>> {
        if let Some(next) = self.pop(queue) {
            return Ok(Some(next));
        }
        // Blocking read: whatever arrived during the wait is delivered
        tokio::time::sleep(wait).await;
        Ok(self.pop(queue))
    }

    async fn ack(&self, delivery: &Delivery) -> AppResult<()> {
        self.acked
            .lock()
            .unwrap()
            .push(delivery.delivery_tag.clone());
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> AppResult<()> {
        self.dead_lettered
            .lock()
            .unwrap()
            .push((delivery.clone(), reason.to_string()));
        self.ack(delivery).await
    }
}

// ============================================================================
// Liveness store
// ============================================================================

pub struct InMemoryLivenessStore {
    pub hashes: Mutex<HashMap<String, HashMap<String, String>>>,
    pub ttls: Mutex<HashMap<String, Duration>>,
    pub deleted: Mutex<Vec<String>>,
    pub fail: AtomicBool,
    now: DateTime<Utc>,
}

impl Default for InMemoryLivenessStore {
    fn default() -> Self {
        Self {
            hashes: Mutex::default(),
            ttls: Mutex::default(),
            deleted: Mutex::default(),
            fail: AtomicBool::new(false),
            now: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        }
    }
}

impl InMemoryLivenessStore {
    pub fn field(&self, key: &str, field: &str) -> Option<String> {
        self.hashes
            .lock()
            .unwrap()
            .get(key)
            .and_then(|h| h.get(field).cloned())
    }

    pub fn exists(&self, key: &str) -> bool {
        self.hashes.lock().unwrap().contains_key(key)
    }

    pub fn delete_count(&self, key: &str) -> usize {
        self.deleted
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.as_str() == key)
            .count()
    }

    pub fn server_now(&self) -> DateTime<Utc> {
        self.now
    }

    fn check(&self) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            Err(AppError::unavailable("liveness store down"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl LivenessStore for InMemoryLivenessStore {
    async fn set_fields(&self, key: &str, fields: &[(&str, String)]) -> AppResult<()> {
        self.check()?;
        let mut hashes = self.hashes.lock().unwrap();
        let hash = hashes.entry(key.to_string()).or_default();
        for (field, value) in fields {
            hash.insert(field.to_string(), value.clone());
        }
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()> {
        self.check()?;
        self.ttls.lock().unwrap().insert(key.to_string(), ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.deleted.lock().unwrap().push(key.to_string());
        self.hashes.lock().unwrap().remove(key);
        self.ttls.lock().unwrap().remove(key);
        Ok(())
    }

    async fn server_time(&self) -> AppResult<DateTime<Utc>> {
        self.check()?;
        Ok(self.now)
    }
}
