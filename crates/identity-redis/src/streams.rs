//! Redis Streams support with consumer groups

use crate::{RedisClient, Result};
use redis::streams::{StreamClaimReply, StreamPendingCountReply, StreamReadReply};
use redis::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Entry in a Redis Stream (string values)
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub stream: String,
    pub id: String,
    pub fields: HashMap<String, String>,
}

/// Entry taken over from another consumer's pending list
#[derive(Debug, Clone)]
pub struct ClaimedEntry {
    pub entry: StreamEntry,
    /// Times the entry has been delivered, including this claim
    pub times_delivered: usize,
}

/// Options for XREADGROUP
#[derive(Debug, Clone, Default)]
pub struct StreamReadOptions {
    /// Block for N milliseconds (None = no blocking)
    pub block: Option<u64>,
    /// Maximum number of entries to return per stream
    pub count: Option<u64>,
}

fn field_map(map: &HashMap<String, Value>) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for (key, value) in map {
        let value = match value {
            Value::BulkString(bytes) => String::from_utf8_lossy(bytes).to_string(),
            Value::SimpleString(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            _ => continue,
        };
        fields.insert(key.clone(), value);
    }
    fields
}

impl RedisClient {
    // ============================================================================
    // Stream Operations
    // ============================================================================

    /// XADD - Append entry with auto-generated id
    pub async fn xadd(&mut self, stream_key: &str, fields: &[(&str, &str)]) -> Result<String> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream_key).arg("*");
        for (field, value) in fields {
            cmd.arg(*field).arg(*value);
        }
        cmd.query_async(self.connection_mut()).await
    }

    /// XGROUP CREATE ... MKSTREAM
    ///
    /// Creates the stream when missing. An existing group is not an error.
    pub async fn xgroup_create(&mut self, stream_key: &str, group: &str) -> Result<()> {
        let result: Result<String> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream_key)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(self.connection_mut())
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// XREADGROUP - Read new entries for this consumer
    pub async fn xreadgroup(
        &mut self,
        group: &str,
        consumer: &str,
        streams: &[&str],
        options: StreamReadOptions,
    ) -> Result<Vec<StreamEntry>> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer);

        if let Some(count) = options.count {
            cmd.arg("COUNT").arg(count);
        }
        if let Some(block_ms) = options.block {
            cmd.arg("BLOCK").arg(block_ms);
        }

        cmd.arg("STREAMS");
        for key in streams {
            cmd.arg(*key);
        }
        for _ in streams {
            cmd.arg(">");
        }

        // A blocking read that times out replies with nil
        let reply: Option<StreamReadReply> = cmd.query_async(self.connection_mut()).await?;

        let mut entries = Vec::new();
        for stream_key in reply.map(|r| r.keys).unwrap_or_default() {
            for stream_id in stream_key.ids {
                entries.push(StreamEntry {
                    stream: stream_key.key.clone(),
                    fields: field_map(&stream_id.map),
                    id: stream_id.id,
                });
            }
        }

        Ok(entries)
    }

    /// XACK - Acknowledge a single entry
    pub async fn xack(&mut self, stream_key: &str, group: &str, id: &str) -> Result<i64> {
        redis::cmd("XACK")
            .arg(stream_key)
            .arg(group)
            .arg(id)
            .query_async(self.connection_mut())
            .await
    }

    /// XPENDING + XCLAIM - Take over entries idle longer than `min_idle`
    pub async fn claim_idle(
        &mut self,
        stream_key: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> Result<Vec<ClaimedEntry>> {
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(stream_key)
            .arg(group)
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(self.connection_mut())
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let delivered: HashMap<String, usize> = pending
            .ids
            .iter()
            .map(|p| (p.id.clone(), p.times_delivered))
            .collect();

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(stream_key).arg(group).arg(consumer).arg(min_idle_ms);
        for p in &pending.ids {
            cmd.arg(&p.id);
        }
        let claimed: StreamClaimReply = cmd.query_async(self.connection_mut()).await?;

        Ok(claimed
            .ids
            .into_iter()
            .map(|stream_id| ClaimedEntry {
                times_delivered: delivered.get(&stream_id.id).copied().unwrap_or(0) + 1,
                entry: StreamEntry {
                    stream: stream_key.to_string(),
                    fields: field_map(&stream_id.map),
                    id: stream_id.id,
                },
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_map_skips_nested_values() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), Value::BulkString(b"x".to_vec()));
        map.insert("b".to_string(), Value::Int(7));
        map.insert("c".to_string(), Value::Nil);

        let fields = field_map(&map);
        assert_eq!(fields.get("a").map(String::as_str), Some("x"));
        assert_eq!(fields.get("b").map(String::as_str), Some("7"));
        assert!(!fields.contains_key("c"));
    }

    #[tokio::test]
    #[ignore] // Requires running Redis
    async fn test_group_read_and_ack() {
        let mut client = RedisClient::connect("redis://localhost:6379")
            .await
            .unwrap();
        let stream = "test:identity:stream";
        let _ = client.del(stream).await;

        client.xgroup_create(stream, "g").await.unwrap();
        // Second create is tolerated
        client.xgroup_create(stream, "g").await.unwrap();

        client.xadd(stream, &[("envelope", "{}")]).await.unwrap();
        let entries = client
            .xreadgroup(
                "g",
                "c1",
                &[stream],
                StreamReadOptions {
                    block: Some(100),
                    count: Some(10),
                },
            )
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].fields.get("envelope").unwrap(), "{}");

        let claimed = client
            .claim_idle(stream, "g", "c2", Duration::from_millis(0), 10)
            .await
            .unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].times_delivered, 2);

        assert_eq!(client.xack(stream, "g", &entries[0].id).await.unwrap(), 1);
        client.del(stream).await.unwrap();
    }
}
