use async_trait::async_trait;
use chrono::Utc;
use identity_db::DbPool;
use identity_error::AppResult;

/// Durable set of consumed message ids
#[async_trait]
pub trait ProcessedMessageRepository: Send + Sync {
    async fn exists(&self, message_id: &str) -> AppResult<bool>;

    /// Record the id. Inserting an id that is already present is not an error.
    async fn insert(&self, message_id: &str) -> AppResult<()>;
}

/// `processed_messages` table in PostgreSQL
#[derive(Clone)]
pub struct PgProcessedMessageRepository {
    pool: DbPool,
}

impl PgProcessedMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProcessedMessageRepository for PgProcessedMessageRepository {
    async fn exists(&self, message_id: &str) -> AppResult<bool> {
        identity_db::processed_message_exists(&self.pool, message_id).await
    }

    async fn insert(&self, message_id: &str) -> AppResult<()> {
        let inserted =
            identity_db::insert_processed_message(&self.pool, message_id, Utc::now()).await?;
        if !inserted {
            tracing::debug!(message_id = %message_id, "Message id already recorded");
        }
        Ok(())
    }
}
