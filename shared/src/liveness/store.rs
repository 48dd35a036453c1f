use async_trait::async_trait;
use chrono::{DateTime, Utc};
use identity_error::{AppError, AppResult};
use identity_redis::RedisClient;
use std::time::Duration;

pub const FIELD_STATUS: &str = "STATUS";
pub const FIELD_STATUS_TIME: &str = "STATUS_TIME";
pub const FIELD_MACHINE: &str = "MACHINE";
pub const FIELD_LAST_ALIVE: &str = "LASTALIVE";

/// Shared key-value store that fleet monitors read liveness from
#[async_trait]
pub trait LivenessStore: Send + Sync {
    async fn set_fields(&self, key: &str, fields: &[(&str, String)]) -> AppResult<()>;
    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()>;
    async fn delete(&self, key: &str) -> AppResult<()>;
    /// The store's clock, shared by every machine reporting into it
    async fn server_time(&self) -> AppResult<DateTime<Utc>>;
}

#[derive(Clone)]
pub struct RedisLivenessStore {
    client: RedisClient,
}

impl RedisLivenessStore {
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl LivenessStore for RedisLivenessStore {
    async fn set_fields(&self, key: &str, fields: &[(&str, String)]) -> AppResult<()> {
        let mut client = self.client.clone();
        client.hset_multiple(key, fields).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<()> {
        let mut client = self.client.clone();
        client.expire(key, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let mut client = self.client.clone();
        client.del(key).await?;
        Ok(())
    }

    async fn server_time(&self) -> AppResult<DateTime<Utc>> {
        let mut client = self.client.clone();
        let (secs, micros) = client.server_time().await?;
        DateTime::from_timestamp(secs, micros.saturating_mul(1_000))
            .ok_or_else(|| AppError::internal(format!("Invalid server time {}.{}", secs, micros)))
    }
}
