// =============================================================================
// Shared key/value store — livebar cache, indicator cache, dedup & cooldown
// keys, and pub/sub notification channels.
// =============================================================================

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Clone)]
pub struct KvStore {
    conn: ConnectionManager,
}

impl KvStore {
    pub async fn connect(redis_url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, KvError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), KvError> {
        let body = serde_json::to_string(value)?;
        let mut conn = self.conn.clone();
        match ttl {
            Some(d) => {
                let _: () = conn.set_ex(key, body, d.as_secs().max(1)).await?;
            }
            None => {
                let _: () = conn.set(key, body).await?;
            }
        }
        Ok(())
    }

    /// Atomically set `key` only if absent, with a TTL. Returns `true` if this
    /// call won the race (i.e. the key was not already set) — the basis of
    /// alert dedup and cooldown gating.
    pub async fn set_nx_ex(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let set: bool = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, Option<String>>(&mut conn)
            .await?
            .is_some();
        Ok(set)
    }

    pub async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let n: u32 = conn.exists(key).await?;
        Ok(n > 0)
    }

    pub async fn publish<T: Serialize>(&self, channel: &str, message: &T) -> Result<(), KvError> {
        let body = serde_json::to_string(message)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn.publish(channel, body).await?;
        Ok(())
    }

    /// Raw access for callers (e.g. the toplist store) that need sorted-set
    /// commands not otherwise wrapped here.
    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[cfg(test)]
mod tests {
    // KvStore requires a live Redis connection; behaviour here is covered by
    // the higher-level modules (alerts::dedup, scanner::cooldown) that build
    // on top of it with fakes. Key-naming helpers are tested inline where
    // they're defined.
}
