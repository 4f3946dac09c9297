// =============================================================================
// Relational persistence layer — Postgres via sqlx
// =============================================================================
//
// Schema (owned by migrations external to this crate, per the Non-goals
// around external collaborators — listed here for reference):
//
//   CREATE TABLE bars_1m (
//     symbol TEXT NOT NULL, open DOUBLE PRECISION, high DOUBLE PRECISION,
//     low DOUBLE PRECISION, close DOUBLE PRECISION, volume DOUBLE PRECISION,
//     vwap DOUBLE PRECISION, timestamp TIMESTAMPTZ NOT NULL,
//     PRIMARY KEY (symbol, timestamp)
//   );
//   CREATE TABLE alert_history (
//     id UUID PRIMARY KEY, rule_id TEXT NOT NULL, rule_name TEXT NOT NULL,
//     symbol TEXT NOT NULL, timestamp TIMESTAMPTZ NOT NULL,
//     price DOUBLE PRECISION NOT NULL, message TEXT NOT NULL,
//     metadata JSONB NOT NULL, trace_id TEXT NOT NULL
//   );
//   CREATE TABLE toplist_configs (
//     id TEXT PRIMARY KEY, name TEXT NOT NULL, metric TEXT NOT NULL,
//     descending BOOLEAN NOT NULL DEFAULT true, "limit" BIGINT NOT NULL
//   );

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::models::{Alert, Bar1m, ToplistConfig};

pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}

/// Upsert a finalized bar. Used by the bar aggregator's write-behind path and
/// by tests seeding fixture data.
pub async fn upsert_bar(pool: &PgPool, bar: &Bar1m) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO bars_1m (symbol, open, high, low, close, volume, vwap, timestamp)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (symbol, timestamp) DO UPDATE SET
            open = EXCLUDED.open,
            high = EXCLUDED.high,
            low = EXCLUDED.low,
            close = EXCLUDED.close,
            volume = EXCLUDED.volume,
            vwap = EXCLUDED.vwap
        "#,
    )
    .bind(&bar.symbol)
    .bind(bar.open)
    .bind(bar.high)
    .bind(bar.low)
    .bind(bar.close)
    .bind(bar.volume)
    .bind(bar.vwap)
    .bind(bar.timestamp)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fetch the most recent `limit` bars for `symbol`, oldest first — used by
/// the indicator engine and scanner worker to rehydrate state on startup.
pub async fn fetch_recent_bars(
    pool: &PgPool,
    symbol: &str,
    limit: i64,
) -> Result<Vec<Bar1m>, sqlx::Error> {
    let mut rows: Vec<Bar1m> = sqlx::query_as(
        r#"
        SELECT symbol, open, high, low, close, volume, vwap, timestamp
        FROM bars_1m
        WHERE symbol = $1
        ORDER BY timestamp DESC
        LIMIT $2
        "#,
    )
    .bind(symbol)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.reverse();
    Ok(rows)
}

/// Insert an alert, ignoring a conflict on `id` (the dedup stage upstream
/// should already have filtered duplicates, but this keeps persistence
/// idempotent under stream redelivery).
pub async fn insert_alert(pool: &PgPool, alert: &Alert) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO alert_history (id, rule_id, rule_name, symbol, timestamp, price, message, metadata, trace_id)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(&alert.id)
    .bind(&alert.rule_id)
    .bind(&alert.rule_name)
    .bind(&alert.symbol)
    .bind(alert.timestamp)
    .bind(alert.price)
    .bind(&alert.message)
    .bind(&alert.metadata)
    .bind(&alert.trace_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_toplist_config(
    pool: &PgPool,
    id: &str,
) -> Result<Option<ToplistConfig>, sqlx::Error> {
    sqlx::query_as(
        r#"SELECT id, name, metric, descending, "limit" FROM toplist_configs WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_all_toplist_configs(pool: &PgPool) -> Result<Vec<ToplistConfig>, sqlx::Error> {
    sqlx::query_as(r#"SELECT id, name, metric, descending, "limit" FROM toplist_configs"#)
        .fetch_all(pool)
        .await
}
