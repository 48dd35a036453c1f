//! Redis client implementation with connection management

use crate::Result;
use redis::aio::ConnectionManager;

/// Redis client with automatic reconnection
#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisClient {
    /// Connect to Redis server
    ///
    /// Supports both redis:// and rediss:// (TLS) URLs
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn })
    }

    /// Open a separate connection to the same server.
    ///
    /// Clones share one multiplexed connection, on which a blocking command
    /// (`XREADGROUP ... BLOCK`) holds up every command queued behind it.
    /// Blocking readers must use a connection of their own.
    pub async fn dedicated(&self) -> Result<Self> {
        let conn = ConnectionManager::new(self.client.clone()).await?;
        Ok(Self {
            client: self.client.clone(),
            conn,
        })
    }

    pub(crate) fn connection_mut(&mut self) -> &mut ConnectionManager {
        &mut self.conn
    }

    /// PING - Verify the connection is alive
    pub async fn ping(&mut self) -> Result<()> {
        let _: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        Ok(())
    }

    // ============================================================================
    // Key Operations
    // ============================================================================

    /// DEL - Delete a key, returns the number of keys removed
    pub async fn del(&mut self, key: &str) -> Result<i64> {
        redis::cmd("DEL").arg(key).query_async(&mut self.conn).await
    }

    /// EXISTS - Check if key exists
    pub async fn exists(&mut self, key: &str) -> Result<bool> {
        redis::cmd("EXISTS").arg(key).query_async(&mut self.conn).await
    }

    /// EXPIRE - Set expiry time in seconds
    pub async fn expire(&mut self, key: &str, seconds: u64) -> Result<bool> {
        redis::cmd("EXPIRE")
            .arg(key)
            .arg(seconds)
            .query_async(&mut self.conn)
            .await
    }

    // ============================================================================
    // Hash Operations
    // ============================================================================

    /// HSET - Set several hash fields at once
    pub async fn hset_multiple(&mut self, key: &str, fields: &[(&str, String)]) -> Result<()> {
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(*field).arg(value);
        }
        let _: i64 = cmd.query_async(&mut self.conn).await?;
        Ok(())
    }

    /// HGET - Read a single hash field
    pub async fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>> {
        redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut self.conn)
            .await
    }

    // ============================================================================
    // Server
    // ============================================================================

    /// TIME - Server clock as (unix seconds, microseconds)
    pub async fn server_time(&mut self) -> Result<(i64, u32)> {
        redis::cmd("TIME").query_async(&mut self.conn).await
    }
}
