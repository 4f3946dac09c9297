// =============================================================================
// Toplist store — Redis sorted-set leaderboards
// =============================================================================

use redis::AsyncCommands;
use thiserror::Error;

use crate::bus::{BusError, StreamBus};
use crate::kv::KvStore;
use crate::models::ToplistRanking;

pub const TOPLISTS_TOPIC: &str = "toplists.updated";

#[derive(Debug, Error)]
pub enum ToplistError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("bus error: {0}")]
    Bus(#[from] BusError),
}

fn zset_key(name: &str) -> String {
    format!("toplist:{name}")
}

pub struct ToplistStore {
    kv: KvStore,
    bus: StreamBus,
}

impl ToplistStore {
    pub fn new(kv: KvStore, bus: StreamBus) -> Self {
        Self { kv, bus }
    }

    pub async fn update(&self, name: &str, symbol: &str, score: f64) -> Result<(), ToplistError> {
        let mut conn = self.kv.connection();
        let _: () = conn.zadd(zset_key(name), symbol, score).await?;
        Ok(())
    }

    /// Pipelined batch of (symbol, score) updates for a single toplist.
    pub async fn batch_update(&self, name: &str, scores: &[(String, f64)]) -> Result<(), ToplistError> {
        if scores.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        let key = zset_key(name);
        for (symbol, score) in scores {
            pipe.zadd(&key, symbol, *score).ignore();
        }
        let mut conn = self.kv.connection();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    /// Ranked symbols for `name`, highest score first when `descending`.
    pub async fn rankings(
        &self,
        name: &str,
        descending: bool,
        offset: isize,
        limit: isize,
    ) -> Result<Vec<ToplistRanking>, ToplistError> {
        let mut conn = self.kv.connection();
        let key = zset_key(name);
        let stop = if limit < 0 { -1 } else { offset + limit - 1 };
        let raw: Vec<(String, f64)> = if descending {
            conn.zrevrange_withscores(&key, offset, stop).await?
        } else {
            conn.zrange_withscores(&key, offset, stop).await?
        };
        Ok(raw
            .into_iter()
            .enumerate()
            .map(|(i, (symbol, score))| ToplistRanking {
                symbol,
                score,
                rank: offset as u32 + i as u32 + 1,
            })
            .collect())
    }

    pub async fn count(&self, name: &str) -> Result<u64, ToplistError> {
        let mut conn = self.kv.connection();
        let n: u64 = conn.zcard(zset_key(name)).await?;
        Ok(n)
    }

    pub async fn publish_update(&self, name: &str, rankings: &[ToplistRanking]) -> Result<(), ToplistError> {
        #[derive(serde::Serialize)]
        struct Update<'a> {
            name: &'a str,
            rankings: &'a [ToplistRanking],
        }
        self.bus
            .publish(TOPLISTS_TOPIC, name, 1, &Update { name, rankings })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zset_key_is_namespaced() {
        assert_eq!(zset_key("top_gainers"), "toplist:top_gainers");
    }
}
