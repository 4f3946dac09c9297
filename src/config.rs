// =============================================================================
// Service configuration — env-var driven, one struct per binary
// =============================================================================
//
// Every service reads its configuration from environment variables (with a
// `.env` file loaded first via `dotenv`, for local development) and documented
// defaults. `clap`'s `env` feature derives the parsing so the same struct also
// doubles as `--help` documentation when a binary is run directly.

use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
        "XRPUSDT".to_string(),
        "SOLUSDT".to_string(),
    ]
}

/// Connection settings shared by every service: the stream bus / KV store and
/// the relational store.
#[derive(Parser, Debug, Clone)]
pub struct StoreConfig {
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/scanalyst"
    )]
    pub database_url: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub db_max_connections: u32,
}

/// Configuration for `bar-aggregator`.
#[derive(Parser, Debug, Clone)]
pub struct BarAggregatorConfig {
    #[command(flatten)]
    pub store: StoreConfig,

    #[arg(long, env = "PARTITION_COUNT", default_value_t = 4)]
    pub partition_count: u32,

    #[arg(long, env = "PARTITION_ID", default_value_t = 0)]
    pub partition_id: u32,

    #[arg(long, env = "CONSUMER_GROUP", default_value = "bar-aggregator")]
    pub consumer_group: String,

    #[arg(long, env = "BAR_PUBLISH_BATCH_SIZE", default_value_t = 100)]
    pub publish_batch_size: usize,

    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,

    #[arg(long, env = "HEALTH_PORT", default_value_t = 8080)]
    pub health_port: u16,
}

/// Configuration for `indicator-engine`.
#[derive(Parser, Debug, Clone)]
pub struct IndicatorEngineConfig {
    #[command(flatten)]
    pub store: StoreConfig,

    #[arg(long, env = "PARTITION_COUNT", default_value_t = 4)]
    pub partition_count: u32,

    #[arg(long, env = "PARTITION_ID", default_value_t = 0)]
    pub partition_id: u32,

    #[arg(long, env = "CONSUMER_GROUP", default_value = "indicator-engine")]
    pub consumer_group: String,

    /// Number of finalized bars retained per symbol in the ring buffer.
    #[arg(long, env = "RING_BUFFER_SIZE", default_value_t = 200)]
    pub ring_buffer_size: usize,

    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,

    #[arg(long, env = "HEALTH_PORT", default_value_t = 8081)]
    pub health_port: u16,
}

/// Configuration for `scanner-worker`.
#[derive(Parser, Debug, Clone)]
pub struct ScannerWorkerConfig {
    #[command(flatten)]
    pub store: StoreConfig,

    #[arg(long, env = "WORKER_ID", default_value_t = 0)]
    pub worker_id: u32,

    #[arg(long, env = "WORKER_COUNT", default_value_t = 1)]
    pub worker_count: u32,

    #[arg(long, env = "SCAN_INTERVAL_SECS", default_value_t = 1)]
    pub scan_interval_secs: u64,

    #[arg(long, env = "COOLDOWN_SWEEP_INTERVAL_SECS", default_value_t = 30)]
    pub cooldown_sweep_interval_secs: u64,

    #[arg(long, env = "REHYDRATE_BAR_COUNT", default_value_t = 200)]
    pub rehydrate_bar_count: i64,

    #[arg(long, env = "SYMBOLS", value_delimiter = ',', default_values_t = default_symbols())]
    pub symbols: Vec<String>,

    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,

    #[arg(long, env = "HEALTH_PORT", default_value_t = 8082)]
    pub health_port: u16,
}

/// Configuration for `alert-pipeline`.
#[derive(Parser, Debug, Clone)]
pub struct AlertPipelineConfig {
    #[command(flatten)]
    pub store: StoreConfig,

    #[arg(long, env = "BATCH_SIZE", default_value_t = 100)]
    pub batch_size: usize,

    #[arg(long, env = "BATCH_FLUSH_SECS", default_value_t = 5)]
    pub batch_flush_secs: u64,

    #[arg(long, env = "DEDUP_TTL_SECS", default_value_t = 3600)]
    pub dedup_ttl_secs: u64,

    #[arg(long, env = "PERSIST_QUEUE_CAPACITY", default_value_t = 10_000)]
    pub persist_queue_capacity: usize,

    #[arg(long, env = "PERSIST_MAX_RETRIES", default_value_t = 5)]
    pub persist_max_retries: u32,

    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,

    #[arg(long, env = "HEALTH_PORT", default_value_t = 8083)]
    pub health_port: u16,
}

/// Configuration for `ws-hub`.
#[derive(Parser, Debug, Clone)]
pub struct WsHubConfig {
    #[command(flatten)]
    pub store: StoreConfig,

    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8090")]
    pub bind_addr: String,

    #[arg(long, env = "SHARED_SECRET")]
    pub shared_secret: Option<String>,

    #[arg(long, env = "SEND_QUEUE_CAPACITY", default_value_t = 256)]
    pub send_queue_capacity: usize,

    #[arg(long, env = "READ_TIMEOUT_SECS", default_value_t = 60)]
    pub read_timeout_secs: u64,

    #[arg(long, env = "PING_INTERVAL_SECS", default_value_t = 30)]
    pub ping_interval_secs: u64,

    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,
}

impl WsHubConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs * 2)
    }
}

/// Configuration for `toplist-updater`.
#[derive(Parser, Debug, Clone)]
pub struct ToplistUpdaterConfig {
    #[command(flatten)]
    pub store: StoreConfig,

    #[arg(long, env = "UPDATE_INTERVAL_SECS", default_value_t = 1)]
    pub update_interval_secs: u64,

    #[arg(long, env = "CONFIG_CACHE_TTL_SECS", default_value_t = 3600)]
    pub config_cache_ttl_secs: u64,

    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 10)]
    pub shutdown_timeout_secs: u64,

    #[arg(long, env = "HEALTH_PORT", default_value_t = 8084)]
    pub health_port: u16,
}

/// Which services the combined `scanalyst` convenience binary should run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    BarAggregator,
    IndicatorEngine,
    ScannerWorker,
    AlertPipeline,
    WsHub,
    ToplistUpdater,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_aggregator_config_parses_with_no_args() {
        let cfg = BarAggregatorConfig::parse_from(["bar-aggregator"]);
        assert_eq!(cfg.partition_count, 4);
        assert_eq!(cfg.publish_batch_size, 100);
        assert_eq!(cfg.health_port, 8080);
    }

    #[test]
    fn scanner_worker_config_parses_symbol_list() {
        let cfg = ScannerWorkerConfig::parse_from([
            "scanner-worker",
            "--symbols",
            "BTCUSDT,ETHUSDT,DOGEUSDT",
        ]);
        assert_eq!(cfg.symbols, vec!["BTCUSDT", "ETHUSDT", "DOGEUSDT"]);
    }

    #[test]
    fn scanner_worker_config_defaults_to_five_symbols() {
        let cfg = ScannerWorkerConfig::parse_from(["scanner-worker"]);
        assert_eq!(cfg.symbols.len(), 5);
    }

    #[test]
    fn ws_hub_idle_timeout_is_double_read_timeout() {
        let mut cfg = WsHubConfig::parse_from(["ws-hub"]);
        cfg.read_timeout_secs = 60;
        assert_eq!(cfg.idle_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn store_config_has_sane_defaults() {
        let cfg = StoreConfig::parse_from(["x"]);
        assert!(cfg.redis_url.starts_with("redis://"));
        assert!(cfg.database_url.starts_with("postgres://"));
    }
}
