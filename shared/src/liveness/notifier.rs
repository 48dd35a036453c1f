use super::store::{
    LivenessStore, FIELD_LAST_ALIVE, FIELD_MACHINE, FIELD_STATUS, FIELD_STATUS_TIME,
};
use identity_config::LivenessConfig;
use identity_error::AppResult;
use identity_types::WorkerStatus;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct LivenessNotifier {
    store: Arc<dyn LivenessStore>,
    config: LivenessConfig,
    identity: String,
    process_key: String,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    /// Message keys currently held by a `WorkingGuard`, with holder counts
    active: ActiveKeys,
    /// Serializes process STATUS writes against the in-flight check
    status: Mutex<()>,
}

type ActiveKeys = Arc<std::sync::Mutex<HashMap<String, usize>>>;

fn register(active: &ActiveKeys, key: &str) {
    if let Ok(mut keys) = active.lock() {
        *keys.entry(key.to_string()).or_insert(0) += 1;
    }
}

fn unregister(active: &ActiveKeys, key: &str) {
    if let Ok(mut keys) = active.lock() {
        if let Some(count) = keys.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                keys.remove(key);
            }
        }
    }
}

fn active_snapshot(active: &ActiveKeys) -> Vec<String> {
    active
        .lock()
        .map(|keys| keys.keys().cloned().collect())
        .unwrap_or_default()
}

impl LivenessNotifier {
    pub fn new(store: Arc<dyn LivenessStore>, config: LivenessConfig) -> Self {
        let identity = format!("{}@{}", std::process::id(), config.machine_name);
        Self::with_identity(store, config, identity)
    }

    /// Use an explicit process identity instead of `{pid}@{machine}`
    pub fn with_identity(
        store: Arc<dyn LivenessStore>,
        config: LivenessConfig,
        identity: impl Into<String>,
    ) -> Self {
        let identity = identity.into();
        let process_key = format!("{}{}", config.application_identifier, identity);
        Self {
            store,
            config,
            identity,
            process_key,
            heartbeat: Mutex::new(None),
            active: Arc::default(),
            status: Mutex::new(()),
        }
    }

    /// `{pid}@{machine}`
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn process_key(&self) -> &str {
        &self.process_key
    }

    pub fn message_key(&self, message_id: &str) -> String {
        format!("{}working:{}", self.config.application_identifier, message_id)
    }

    /// Report STARTING and start the heartbeat
    pub async fn set_starting(&self) -> AppResult<()> {
        self.write_status(WorkerStatus::Starting).await?;
        self.start_heartbeat().await;
        Ok(())
    }

    /// Report IDLE, unless another endpoint still holds a message
    pub async fn set_idle(&self) -> AppResult<()> {
        let _status = self.status.lock().await;
        let in_flight = self.in_flight();
        if in_flight > 0 {
            debug!(in_flight = in_flight, "Messages still in flight, keeping WORKING");
            return Ok(());
        }
        self.write_status(WorkerStatus::Idle).await
    }

    /// Messages currently marked WORKING by this process
    pub fn in_flight(&self) -> usize {
        self.active
            .lock()
            .map(|keys| keys.values().sum())
            .unwrap_or(0)
    }

    /// Mark `message_id` as being worked on.
    ///
    /// The returned guard deletes the message key when released or dropped.
    /// While any guard is held, `set_idle` leaves the process WORKING and the
    /// heartbeat keeps the message key's TTL fresh.
    pub async fn set_working(&self, message_id: &str) -> AppResult<WorkingGuard> {
        let key = self.message_key(message_id);
        let _status = self.status.lock().await;
        let guard = WorkingGuard::new(self.store.clone(), key.clone(), self.active.clone());

        match self.write_working(&key).await {
            Ok(()) => Ok(guard),
            Err(e) => {
                if let Err(cleanup) = guard.release().await {
                    debug!(key = %key, error = %cleanup, "Failed to clean up message key");
                }
                Err(e)
            }
        }
    }

    /// Stop the heartbeat and remove the process key
    pub async fn stop(&self) -> AppResult<()> {
        if let Some(handle) = self.heartbeat.lock().await.take() {
            handle.abort();
        }
        self.store.delete(&self.process_key).await?;
        info!(key = %self.process_key, "Liveness reporting stopped");
        Ok(())
    }

    async fn write_working(&self, key: &str) -> AppResult<()> {
        let now = self.store.server_time().await?.to_rfc3339();

        self.store
            .set_fields(
                key,
                &[
                    (FIELD_STATUS, WorkerStatus::Working.as_str().to_string()),
                    (FIELD_STATUS_TIME, now.clone()),
                    (self.config.owner_field.as_str(), self.identity.clone()),
                ],
            )
            .await?;
        self.store.expire(key, self.config.message_ttl).await?;

        self.store
            .set_fields(
                &self.process_key,
                &[
                    (FIELD_STATUS, WorkerStatus::Working.as_str().to_string()),
                    (FIELD_STATUS_TIME, now),
                ],
            )
            .await?;
        self.store
            .expire(&self.process_key, self.config.key_ttl)
            .await
    }

    async fn write_status(&self, status: WorkerStatus) -> AppResult<()> {
        let now = self.store.server_time().await?;

        self.store
            .set_fields(
                &self.process_key,
                &[
                    (FIELD_MACHINE, self.config.machine_name.clone()),
                    (FIELD_STATUS, status.as_str().to_string()),
                    (FIELD_STATUS_TIME, now.to_rfc3339()),
                    (self.config.owner_field.as_str(), self.identity.clone()),
                ],
            )
            .await?;
        self.store
            .expire(&self.process_key, self.config.key_ttl)
            .await?;

        debug!(key = %self.process_key, status = %status, "Status reported");
        Ok(())
    }

    async fn start_heartbeat(&self) {
        let mut heartbeat = self.heartbeat.lock().await;
        if heartbeat.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let store = self.store.clone();
        let key = self.process_key.clone();
        let ttl = self.config.key_ttl;
        let active = self.active.clone();
        let message_ttl = self.config.message_ttl;
        let period = self.config.heartbeat_interval.max(Duration::from_millis(10));

        *heartbeat = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately; STARTING was just written
            interval.tick().await;
            loop {
                interval.tick().await;
                if let Err(e) = beat(store.as_ref(), &key, ttl).await {
                    warn!(key = %key, error = %e, "Heartbeat failed");
                }
                for message_key in active_snapshot(&active) {
                    if let Err(e) = store.expire(&message_key, message_ttl).await {
                        warn!(key = %message_key, error = %e, "Failed to refresh message key TTL");
                    }
                }
            }
        }));

        info!(
            key = %self.process_key,
            interval_seconds = period.as_secs(),
            "Heartbeat started"
        );
    }
}

async fn beat(store: &dyn LivenessStore, key: &str, ttl: Duration) -> AppResult<()> {
    let now = store.server_time().await?;
    store
        .set_fields(key, &[(FIELD_LAST_ALIVE, now.to_rfc3339())])
        .await?;
    store.expire(key, ttl).await
}

impl Drop for LivenessNotifier {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.get_mut().take() {
            handle.abort();
        }
    }
}

/// Scoped WORKING marker for one message.
///
/// The message key is deleted exactly once: by `release`, or on drop when
/// the holder exits early (error, panic, cancellation).
pub struct WorkingGuard {
    store: Arc<dyn LivenessStore>,
    key: String,
    active: ActiveKeys,
    released: bool,
}

impl WorkingGuard {
    fn new(store: Arc<dyn LivenessStore>, key: String, active: ActiveKeys) -> Self {
        register(&active, &key);
        Self {
            store,
            key,
            active,
            released: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn release(mut self) -> AppResult<()> {
        self.released = true;
        unregister(&self.active, &self.key);
        self.store.delete(&self.key).await
    }
}

impl Drop for WorkingGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        unregister(&self.active, &self.key);

        let store = self.store.clone();
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = store.delete(&key).await {
                        warn!(key = %key, error = %e, "Failed to delete message key");
                    }
                });
            }
            Err(_) => warn!(key = %key, "No runtime to delete message key, left to expire"),
        }
    }
}
