// =============================================================================
// Stream bus — partitioned, consumer-group delivery over Redis Streams
// =============================================================================
//
// Every inter-service hop (`ticks`, `bars.finalized`, `indicators.updated`,
// `alerts.raised`, `alerts.filtered`, `toplists.updated`) goes through this
// abstraction. It is deliberately bit-compatible with Redis Streams semantics
// (XADD / XGROUP CREATE / XREADGROUP / XACK) rather than wrapping them behind
// an opaque protocol, so operators can inspect pending entries with the
// ordinary `redis-cli` toolset.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum BusError {
    #[error("redis error: {0}")]
    Redis(#[from] RedisError),
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Exponential backoff for service read loops reacting to transient bus
/// errors (connection drops, timeouts) — doubles on every consecutive
/// failure up to a cap, resets once a read succeeds.
pub struct Backoff {
    initial: Duration,
    current: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self { initial, current: initial, max }
    }

    pub async fn wait(&mut self) {
        tokio::time::sleep(self.current).await;
        self.current = (self.current * 2).min(self.max);
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(250), Duration::from_secs(30))
    }
}

/// A message read off the bus, still carrying its stream id so the caller can
/// ack it once handling succeeds.
#[derive(Debug, Clone)]
pub struct Delivery<T> {
    pub id: String,
    pub payload: T,
}

/// Deterministic partition selection: the first four bytes of `sha256(key)`,
/// interpreted as a big-endian u32, reduced mod `partitions`. Used both to
/// pick which stream a message is published to and which partitions a
/// worker owns, so the two always agree on symbol placement.
pub fn partition_for(key: &str, partitions: u32) -> u32 {
    assert!(partitions > 0, "partition count must be positive");
    let digest = Sha256::digest(key.as_bytes());
    let n = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    n % partitions
}

fn stream_name(topic: &str, partition: u32) -> String {
    format!("{topic}.p{partition}")
}

/// A connected handle to the stream bus.
#[derive(Clone)]
pub struct StreamBus {
    conn: ConnectionManager,
}

impl StreamBus {
    pub async fn connect(redis_url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    /// Publish one message, partitioned by `key` (typically the symbol).
    pub async fn publish<T: Serialize>(
        &self,
        topic: &str,
        key: &str,
        partitions: u32,
        payload: &T,
    ) -> Result<String, BusError> {
        let stream = stream_name(topic, partition_for(key, partitions));
        let body = serde_json::to_string(payload)?;
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(&stream, "*", &[("data", body)]).await?;
        Ok(id)
    }

    /// Publish a batch of (key, payload) pairs in one pipeline, grouped by
    /// destination partition.
    pub async fn publish_batch<T: Serialize>(
        &self,
        topic: &str,
        partitions: u32,
        items: &[(String, T)],
    ) -> Result<(), BusError> {
        if items.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for (key, payload) in items {
            let stream = stream_name(topic, partition_for(key, partitions));
            let body = serde_json::to_string(payload)?;
            pipe.cmd("XADD")
                .arg(&stream)
                .arg("*")
                .arg("data")
                .arg(body)
                .ignore();
        }
        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    /// Ensure the consumer group exists on `topic.p{partition}`, creating the
    /// stream if it does not exist yet. Idempotent: an already-exists error
    /// from Redis is swallowed.
    pub async fn ensure_group(
        &self,
        topic: &str,
        partition: u32,
        group: &str,
    ) -> Result<(), BusError> {
        let stream = stream_name(topic, partition);
        let mut conn = self.conn.clone();
        let result: Result<(), RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read up to `count` pending messages for `consumer` in `group`,
    /// blocking for `block` if nothing is immediately available. Returns an
    /// empty vec on timeout (not an error) so the caller's loop can check its
    /// cancellation token between polls.
    pub async fn consume<T: DeserializeOwned>(
        &self,
        topic: &str,
        partition: u32,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<Delivery<T>>, BusError> {
        let stream = stream_name(topic, partition);
        let opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(count)
            .block(block.as_millis() as usize);
        let mut conn = self.conn.clone();
        let reply: StreamReadReply = conn.xread_options(&[&stream], &[">"], &opts).await?;

        let mut out = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let Some(redis::Value::BulkString(raw)) = entry.map.get("data") else {
                    warn!(stream = %stream, id = %entry.id, "stream entry missing data field");
                    continue;
                };
                match serde_json::from_slice::<T>(raw) {
                    Ok(payload) => out.push(Delivery {
                        id: entry.id.clone(),
                        payload,
                    }),
                    Err(e) => {
                        warn!(stream = %stream, id = %entry.id, error = %e, "failed to decode stream entry, skipping");
                    }
                }
            }
        }
        debug!(stream = %stream, count = out.len(), "consumed from stream");
        Ok(out)
    }

    pub async fn ack(
        &self,
        topic: &str,
        partition: u32,
        group: &str,
        ids: &[String],
    ) -> Result<(), BusError> {
        if ids.is_empty() {
            return Ok(());
        }
        let stream = stream_name(topic, partition);
        let mut conn = self.conn.clone();
        let _: i64 = conn.xack(&stream, group, ids).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_for_is_deterministic() {
        assert_eq!(partition_for("BTCUSDT", 8), partition_for("BTCUSDT", 8));
    }

    #[test]
    fn partition_for_stays_in_range() {
        for sym in ["BTCUSDT", "ETHUSDT", "DOGEUSDT", "SOLUSDT", ""] {
            let p = partition_for(sym, 4);
            assert!(p < 4);
        }
    }

    #[test]
    fn partition_for_distributes_across_buckets() {
        let symbols = [
            "BTCUSDT", "ETHUSDT", "BNBUSDT", "XRPUSDT", "SOLUSDT", "DOGEUSDT", "ADAUSDT",
            "MATICUSDT",
        ];
        let buckets: std::collections::HashSet<u32> =
            symbols.iter().map(|s| partition_for(s, 4)).collect();
        assert!(buckets.len() > 1, "expected symbols to spread across partitions");
    }

    #[test]
    #[should_panic]
    fn partition_for_rejects_zero_partitions() {
        partition_for("BTCUSDT", 0);
    }

    #[test]
    fn stream_name_includes_partition_suffix() {
        assert_eq!(stream_name("ticks", 2), "ticks.p2");
    }

    #[tokio::test]
    async fn backoff_doubles_up_to_the_cap() {
        let mut b = Backoff::new(Duration::from_millis(1), Duration::from_millis(4));
        assert_eq!(b.current, Duration::from_millis(1));
        b.wait().await;
        assert_eq!(b.current, Duration::from_millis(2));
        b.wait().await;
        assert_eq!(b.current, Duration::from_millis(4));
        b.wait().await;
        assert_eq!(b.current, Duration::from_millis(4));
    }

    #[test]
    fn backoff_reset_returns_to_initial() {
        let mut b = Backoff::new(Duration::from_millis(1), Duration::from_millis(100));
        b.current = Duration::from_millis(50);
        b.reset();
        assert_eq!(b.current, Duration::from_millis(1));
    }
}
