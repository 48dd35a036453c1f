// ============================================================================
// Message Deduplication
// ============================================================================
//
// Check-then-record of message ids, serialized by a process-wide lock owned
// by the store. The record is durable before the lock is released, so a
// concurrent duplicate delivery in this process observes it.
//
// The lock does NOT exclude other processes. Across instances the
// per-endpoint concurrency limit of 1 on the broker side is what keeps two
// deliveries of the same id apart.
//
// Repository calls go through the full resilience pipeline. Retrying is safe:
// `exists` is read-only and `insert` ignores an id that is already present.
//
// ============================================================================

mod repository;

pub use repository::{PgProcessedMessageRepository, ProcessedMessageRepository};

use crate::resilience::ResiliencePipeline;
use identity_error::{AppError, AppResult};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Result of a dedup decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// First time this id is seen; it is now recorded
    Claimed,
    /// Id was recorded earlier; skip processing
    AlreadyConsumed,
}

pub struct DeduplicationStore {
    repository: Arc<dyn ProcessedMessageRepository>,
    pipeline: Arc<ResiliencePipeline>,
    lock: Mutex<()>,
}

impl DeduplicationStore {
    pub fn new(
        repository: Arc<dyn ProcessedMessageRepository>,
        pipeline: Arc<ResiliencePipeline>,
    ) -> Self {
        Self {
            repository,
            pipeline,
            lock: Mutex::new(()),
        }
    }

    pub async fn has_been_consumed(&self, message_id: &str) -> AppResult<bool> {
        self.pipeline
            .execute(|| self.repository.exists(message_id))
            .await
            .map_err(AppError::from)
    }

    /// Tolerates a duplicate insert raced by another writer
    pub async fn record_consumed(&self, message_id: &str) -> AppResult<()> {
        match self
            .pipeline
            .execute(|| self.repository.insert(message_id))
            .await
            .map_err(AppError::from)
        {
            Err(e) if e.is_conflict() => {
                debug!(message_id = %message_id, "Message id recorded concurrently");
                Ok(())
            }
            other => other,
        }
    }

    /// Check and record under the store lock
    pub async fn try_claim(&self, message_id: &str) -> AppResult<ClaimOutcome> {
        let _guard = self.lock.lock().await;

        if self.has_been_consumed(message_id).await? {
            return Ok(ClaimOutcome::AlreadyConsumed);
        }

        self.record_consumed(message_id).await?;
        Ok(ClaimOutcome::Claimed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use identity_config::ResilienceConfig;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct SlowRepository {
        ids: std::sync::Mutex<HashSet<String>>,
        inserts: AtomicU32,
        conflict_on_insert: bool,
    }

    #[async_trait]
    impl ProcessedMessageRepository for SlowRepository {
        async fn exists(&self, message_id: &str) -> AppResult<bool> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(self.ids.lock().unwrap().contains(message_id))
        }

        async fn insert(&self, message_id: &str) -> AppResult<()> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            if self.conflict_on_insert {
                return Err(AppError::conflict("duplicate key"));
            }
            self.ids.lock().unwrap().insert(message_id.to_string());
            Ok(())
        }
    }

    fn store(repository: Arc<SlowRepository>) -> DeduplicationStore {
        let pipeline = ResiliencePipeline::full("dedup-test", &ResilienceConfig::default());
        DeduplicationStore::new(repository, Arc::new(pipeline))
    }

    #[tokio::test]
    async fn test_claim_then_already_consumed() {
        let repository = Arc::new(SlowRepository::default());
        let store = store(repository.clone());

        assert_eq!(store.try_claim("m-1").await.unwrap(), ClaimOutcome::Claimed);
        assert_eq!(
            store.try_claim("m-1").await.unwrap(),
            ClaimOutcome::AlreadyConsumed
        );
        assert!(store.has_been_consumed("m-1").await.unwrap());
        assert_eq!(repository.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_serialize() {
        let repository = Arc::new(SlowRepository::default());
        let store = Arc::new(store(repository.clone()));

        let a = tokio::spawn({
            let store = store.clone();
            async move { store.try_claim("m-race").await.unwrap() }
        });
        let b = tokio::spawn({
            let store = store.clone();
            async move { store.try_claim("m-race").await.unwrap() }
        });

        let mut outcomes = vec![a.await.unwrap(), b.await.unwrap()];
        outcomes.sort_by_key(|o| *o == ClaimOutcome::AlreadyConsumed);
        assert_eq!(
            outcomes,
            vec![ClaimOutcome::Claimed, ClaimOutcome::AlreadyConsumed]
        );
        assert_eq!(repository.inserts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_conflict_on_insert_is_tolerated() {
        let repository = Arc::new(SlowRepository {
            conflict_on_insert: true,
            ..SlowRepository::default()
        });
        let store = store(repository);

        assert_eq!(store.try_claim("m-2").await.unwrap(), ClaimOutcome::Claimed);
    }
}
