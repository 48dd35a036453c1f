use crate::resilience::ResiliencePipeline;
use async_trait::async_trait;
use identity_db::{DbPool, GroupRecord, UserRecord};
use identity_error::{AppError, AppResult};
use std::sync::Arc;

/// Persistence of directory users and groups.
///
/// `update_*` and `delete_*` fail with `NotFound` when no row matched.
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn update_user(&self, user: &UserRecord) -> AppResult<()>;
    async fn create_user(&self, user: &UserRecord) -> AppResult<()>;
    async fn delete_user(&self, user_id: &str) -> AppResult<()>;

    async fn update_group(&self, group: &GroupRecord) -> AppResult<()>;
    async fn create_group(&self, group: &GroupRecord) -> AppResult<()>;
    async fn delete_group(&self, group_id: &str) -> AppResult<()>;
}

fn require_match(rows: u64, entity: &str, id: &str) -> AppResult<()> {
    if rows == 0 {
        Err(AppError::not_found(entity, "id", id))
    } else {
        Ok(())
    }
}

/// PostgreSQL directory, every call through the full resilience pipeline
pub struct PgDirectoryRepository {
    pool: DbPool,
    pipeline: Arc<ResiliencePipeline>,
}

impl PgDirectoryRepository {
    pub fn new(pool: DbPool, pipeline: Arc<ResiliencePipeline>) -> Self {
        Self { pool, pipeline }
    }
}

#[async_trait]
impl DirectoryRepository for PgDirectoryRepository {
    async fn update_user(&self, user: &UserRecord) -> AppResult<()> {
        let rows = self
            .pipeline
            .execute(|| identity_db::update_user(&self.pool, user))
            .await?;
        require_match(rows, "user", &user.id)
    }

    async fn create_user(&self, user: &UserRecord) -> AppResult<()> {
        Ok(self
            .pipeline
            .execute(|| identity_db::insert_user(&self.pool, user))
            .await?)
    }

    async fn delete_user(&self, user_id: &str) -> AppResult<()> {
        let rows = self
            .pipeline
            .execute(|| identity_db::delete_user(&self.pool, user_id))
            .await?;
        require_match(rows, "user", user_id)
    }

    async fn update_group(&self, group: &GroupRecord) -> AppResult<()> {
        let rows = self
            .pipeline
            .execute(|| identity_db::update_group(&self.pool, group))
            .await?;
        require_match(rows, "group", &group.id)
    }

    async fn create_group(&self, group: &GroupRecord) -> AppResult<()> {
        Ok(self
            .pipeline
            .execute(|| identity_db::insert_group(&self.pool, group))
            .await?)
    }

    async fn delete_group(&self, group_id: &str) -> AppResult<()> {
        let rows = self
            .pipeline
            .execute(|| identity_db::delete_group(&self.pool, group_id))
            .await?;
        require_match(rows, "group", group_id)
    }
}
