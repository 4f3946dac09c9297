// =============================================================================
// Scanner worker service loop
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bus::StreamBus;
use crate::config::ScannerWorkerConfig;
use crate::kv::KvStore;
use crate::models::{Condition, Op, Rule};

use super::alert_emitter::AlertEmitter;
use super::cooldown::CooldownTracker;
use super::partition::PartitionManager;
use super::rehydrator::Rehydrator;
use super::rule::CompiledRule;
use super::state_manager::StateManager;

const RULES_KV_KEY: &str = "scanner:rules";

/// A small built-in rule set used when no rules have been configured in the
/// shared KV store yet, so a fresh deployment has something to scan with.
fn default_rules() -> Vec<Rule> {
    vec![
        Rule {
            id: "rsi_oversold_bounce".into(),
            name: "RSI-14 oversold".into(),
            all: vec![Condition {
                metric: "rsi_14".into(),
                op: Op::Lt,
                value: 30.0,
            }],
            any: vec![],
            cooldown_secs: 300,
            enabled: true,
        },
        Rule {
            id: "volume_spike".into(),
            name: "Volume above zero".into(),
            all: vec![Condition {
                metric: "volume".into(),
                op: Op::Gt,
                value: 0.0,
            }],
            any: vec![],
            cooldown_secs: 120,
            enabled: true,
        },
    ]
}

async fn load_rules(kv: &KvStore) -> Vec<Rule> {
    match kv.get_json::<Vec<Rule>>(RULES_KV_KEY).await {
        Ok(Some(rules)) if !rules.is_empty() => rules,
        Ok(_) => default_rules(),
        Err(e) => {
            warn!(error = %e, "failed to load rule set from KV, using built-in defaults");
            default_rules()
        }
    }
}

const KNOWN_INDICATOR_METRICS: &[&str] = &[
    "rsi_9", "rsi_14", "rsi_21", "ema_9", "ema_12", "ema_20", "ema_21", "ema_26", "ema_50",
    "ema_200", "sma_10", "sma_20", "sma_50", "sma_200", "macd_histogram", "atr_14",
    "bollinger_width_20", "stochastic_k_14_3_3", "vwap_1m", "vwap_5m", "vwap_15m", "vwap_1h",
    "volume_avg_5m", "volume_avg_15m", "volume_avg_1h", "price_change_pct_5m",
    "price_change_pct_15m", "price_change_pct_1h",
];

fn compile_rules(rules: Vec<Rule>) -> Vec<CompiledRule> {
    let mut compiled = Vec::with_capacity(rules.len());
    for rule in rules {
        if !rule.enabled {
            continue;
        }
        if let Err(e) = rule.validate() {
            warn!(error = %e, rule_id = %rule.id, "skipping invalid rule");
            continue;
        }
        let id = rule.id.clone();
        match CompiledRule::compile(rule, KNOWN_INDICATOR_METRICS) {
            Ok(c) => compiled.push(c),
            Err(e) => warn!(error = %e, rule_id = %id, "skipping rule that fails to compile"),
        }
    }
    compiled
}

pub async fn run(
    bus: StreamBus,
    kv: KvStore,
    pool: PgPool,
    config: ScannerWorkerConfig,
    shutdown: CancellationToken,
) {
    let partitions = PartitionManager::new(config.worker_id, config.worker_count);
    let owned: Vec<String> = partitions
        .owned_symbols(&config.symbols)
        .into_iter()
        .map(String::from)
        .collect();

    info!(worker_id = config.worker_id, owned = ?owned, "scanner worker starting");

    let state_manager = Arc::new(StateManager::new(kv.clone()));
    let cooldowns = Arc::new(CooldownTracker::new());
    // The alert pipeline is a single pipeline worker over the `alerts.raised`
    // stream (unpartitioned), not one partition per scanner worker — publish
    // to partition count 1 regardless of how many scanner workers are
    // running so every worker's alerts land where the pipeline reads them.
    let emitter = Arc::new(AlertEmitter::new(bus.clone(), 1));
    let rehydrator = Rehydrator::new(pool, kv.clone(), config.rehydrate_bar_count, 200);

    for symbol in &owned {
        rehydrator.ensure_warm(symbol).await;
    }

    let mut rules: Arc<Vec<CompiledRule>> = Arc::new(compile_rules(load_rules(&kv).await));
    info!(rule_count = rules.len(), "compiled rule set");

    let mut scan_interval = tokio::time::interval(Duration::from_secs(config.scan_interval_secs));
    let mut sweep_interval =
        tokio::time::interval(Duration::from_secs(config.cooldown_sweep_interval_secs));

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sweep_interval.tick() => {
                cooldowns.sweep(Duration::from_secs(config.cooldown_sweep_interval_secs * 10));
            }
            _ = scan_interval.tick() => {
                rules = Arc::new(compile_rules(load_rules(&kv).await));
                scan_cycle(&owned, rules.clone(), &state_manager, &cooldowns, &emitter).await;
            }
        }
    }

    info!(worker_id = config.worker_id, "scanner worker shutting down");
}

async fn scan_cycle(
    owned: &[String],
    rules: Arc<Vec<CompiledRule>>,
    state_manager: &Arc<StateManager>,
    cooldowns: &Arc<CooldownTracker>,
    emitter: &Arc<AlertEmitter>,
) {
    let mut tasks = JoinSet::new();
    for symbol in owned.iter().cloned() {
        let rules = rules.clone();
        let state_manager = state_manager.clone();
        let cooldowns = cooldowns.clone();
        let emitter = emitter.clone();
        tasks.spawn(async move {
            scan_symbol(symbol, rules, state_manager, cooldowns, emitter).await;
        });
    }

    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            warn!(error = %e, "scan task panicked");
        }
    }
}

async fn scan_symbol(
    symbol: String,
    rules: Arc<Vec<CompiledRule>>,
    state_manager: Arc<StateManager>,
    cooldowns: Arc<CooldownTracker>,
    emitter: Arc<AlertEmitter>,
) {
    let Some(resolver) = state_manager.resolver_for(&symbol).await else {
        return;
    };

    for compiled in rules.iter() {
        let cooldown = Duration::from_secs(compiled.rule.cooldown_secs);
        if cooldowns.is_cooling_down(&compiled.rule.id, &symbol, cooldown) {
            continue;
        }
        if compiled.eval(&resolver) {
            cooldowns.record_fired(&compiled.rule.id, &symbol);
            emitter
                .emit(compiled, &symbol, serde_json::to_value(&resolver.current).unwrap_or_default())
                .await;
        }
    }
}
