// =============================================================================
// Rehydrator — seeds a cold-started worker's indicator cache from history
// =============================================================================
//
// When a scanner worker starts (or takes over a symbol after a rebalance)
// the shared `ind:{symbol}` KV cache may already be warm from a
// long-running indicator engine. If it isn't — e.g. the whole platform is
// being brought up at once — this pulls the last K finalized bars from the
// relational store and runs them through a throwaway indicator engine so
// the scan loop has something to evaluate against immediately, rather than
// waiting out a full warm-up window live.

use std::time::Duration;

use sqlx::PgPool;
use tracing::{info, warn};

use crate::db;
use crate::indicators::engine::IndicatorEngine;
use crate::kv::KvStore;
use crate::models::IndicatorSnapshot;

pub struct Rehydrator {
    pool: PgPool,
    kv: KvStore,
    bar_count: i64,
    ring_buffer_size: usize,
}

impl Rehydrator {
    pub fn new(pool: PgPool, kv: KvStore, bar_count: i64, ring_buffer_size: usize) -> Self {
        Self {
            pool,
            kv,
            bar_count,
            ring_buffer_size,
        }
    }

    /// Ensure `symbol` has an indicator snapshot cached. No-op if one
    /// already exists.
    pub async fn ensure_warm(&self, symbol: &str) {
        match self.kv.get_json::<IndicatorSnapshot>(&format!("ind:{symbol}")).await {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, symbol = %symbol, "failed to check indicator cache before rehydration");
                return;
            }
        }

        let bars = match db::fetch_recent_bars(&self.pool, symbol, self.bar_count).await {
            Ok(bars) => bars,
            Err(e) => {
                warn!(error = %e, symbol = %symbol, "failed to fetch bar history for rehydration");
                return;
            }
        };

        if bars.is_empty() {
            return;
        }

        let engine = IndicatorEngine::new(self.ring_buffer_size);
        let mut values = std::collections::HashMap::new();
        for bar in bars {
            values = engine.on_bar(bar);
        }

        if values.is_empty() {
            return;
        }

        let snapshot = IndicatorSnapshot {
            symbol: symbol.to_string(),
            values,
            updated_at: Some(chrono::Utc::now()),
        };

        if let Err(e) = self
            .kv
            .set_json(&format!("ind:{symbol}"), &snapshot, Some(Duration::from_secs(120)))
            .await
        {
            warn!(error = %e, symbol = %symbol, "failed to cache rehydrated indicator snapshot");
        } else {
            info!(symbol = %symbol, "rehydrated indicator cache from bar history");
        }
    }
}
