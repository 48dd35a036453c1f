//! # Identity Redis
//!
//! Low-level Redis client shared by the identity consumer processes.
//!
//! - No business logic, pure infrastructure layer
//! - Connection management with automatic reconnection
//! - Hash, expiry and server-clock operations for liveness reporting
//! - Redis Streams with consumer groups for the message bus
//!
//! ```rust,no_run
//! use identity_redis::RedisClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = RedisClient::connect("redis://localhost:6379").await?;
//!     client.hset_multiple("proc:1", &[("STATUS", "IDLE".to_string())]).await?;
//!     client.expire("proc:1", 60).await?;
//!     Ok(())
//! }
//! ```

mod client;
mod streams;

pub use client::RedisClient;
pub use streams::{ClaimedEntry, StreamEntry, StreamReadOptions};

/// Result type for Redis operations
pub type Result<T> = redis::RedisResult<T>;

/// Re-export the underlying error type
pub use redis::RedisError;
