// =============================================================================
// Shared wire & domain models for the scanning platform
// =============================================================================
//
// These types are shared by all six services. They deserialize exactly the
// JSON shapes documented for the stream bus and the REST/WS surfaces; field
// names and nesting must not drift from what external producers/consumers
// expect.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Whether a tick represents an executed trade or a quote update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickType {
    Trade,
    Quote,
}

/// A single validated trade/quote tick from the upstream market-data vendor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub size: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: TickType,
}

impl Tick {
    /// Boundary validation: reject anything the rest of the pipeline cannot
    /// reasonably process. Called once, at ingestion.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.symbol.trim().is_empty() {
            return Err(ValidationError::EmptySymbol);
        }
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(ValidationError::NonPositivePrice(self.price));
        }
        if !self.size.is_finite() || self.size < 0.0 {
            return Err(ValidationError::NegativeVolume(self.size));
        }
        Ok(())
    }
}

/// The bar currently being built for a symbol — mutable until its minute
/// closes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveBar {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Running sum of price*volume, used to derive VWAP without re-scanning
    /// every tick that built the bar.
    pub pv_sum: f64,
    pub tick_count: u64,
    pub minute: DateTime<Utc>,
}

impl LiveBar {
    pub fn vwap(&self) -> f64 {
        if self.volume > 0.0 {
            self.pv_sum / self.volume
        } else {
            self.close
        }
    }

    pub fn finalize(&self) -> Bar1m {
        Bar1m {
            symbol: self.symbol.clone(),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            vwap: self.vwap(),
            timestamp: self.minute,
        }
    }
}

/// An immutable, finalized one-minute OHLCV bar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Bar1m {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub vwap: f64,
    pub timestamp: DateTime<Utc>,
}

/// Per-symbol rolling window the indicator engine maintains: the last N
/// finalized bars plus whatever each calculator needs to resume cheaply.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub symbol: String,
    pub values: HashMap<String, f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Comparison operators a rule condition may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Neq,
    CrossesAbove,
    CrossesBelow,
}

/// A single leaf condition: `metric op value`, e.g. `rsi_14 < 30`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub metric: String,
    pub op: Op,
    pub value: f64,
}

/// A rule: all of `all`, any of `any`. Both lists may be non-empty; an empty
/// `all` is vacuously true, an empty `any` is vacuously false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub all: Vec<Condition>,
    #[serde(default)]
    pub any: Vec<Condition>,
    pub cooldown_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Rule {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::EmptyRuleId);
        }
        if self.all.is_empty() && self.any.is_empty() {
            return Err(ValidationError::EmptyRuleConditions(self.id.clone()));
        }
        Ok(())
    }
}

/// An alert raised by a rule firing for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Alert {
    pub id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub message: String,
    /// Arbitrary metadata (the metric values that satisfied the rule, for
    /// audit, plus the dedup idempotency key).
    pub metadata: serde_json::Value,
    pub trace_id: String,
}

impl Alert {
    /// Deterministic idempotency key: identical rule+symbol firings within
    /// the same cooldown bucket collapse to the same key.
    pub fn idempotency_key(rule_id: &str, symbol: &str, bucket: i64) -> String {
        format!("{rule_id}:{symbol}:{bucket}")
    }
}

/// A named leaderboard definition (e.g. "top gainers 1h").
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ToplistConfig {
    pub id: String,
    pub name: String,
    pub metric: String,
    #[serde(default)]
    pub descending: bool,
    pub limit: i64,
}

/// A single ranked entry read back from a toplist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToplistRanking {
    pub symbol: String,
    pub score: f64,
    pub rank: u32,
}

/// Errors raised at a data-entry boundary (ingestion, rule compilation,
/// config parsing). Distinguished from transient/infra errors so callers can
/// drop-and-ack rather than retry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("symbol is empty")]
    EmptySymbol,
    #[error("price must be positive and finite, got {0}")]
    NonPositivePrice(f64),
    #[error("volume must be non-negative and finite, got {0}")]
    NegativeVolume(f64),
    #[error("rule id is empty")]
    EmptyRuleId,
    #[error("rule {0} has no conditions")]
    EmptyRuleConditions(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(price: f64, size: f64) -> Tick {
        Tick {
            symbol: "BTCUSDT".into(),
            price,
            size,
            timestamp: Utc::now(),
            kind: TickType::Trade,
        }
    }

    #[test]
    fn tick_validate_accepts_normal_tick() {
        assert!(tick(100.0, 1.0).validate().is_ok());
    }

    #[test]
    fn tick_validate_rejects_empty_symbol() {
        let mut t = tick(100.0, 1.0);
        t.symbol = "  ".into();
        assert_eq!(t.validate(), Err(ValidationError::EmptySymbol));
    }

    #[test]
    fn tick_validate_rejects_zero_and_negative_price() {
        assert!(tick(0.0, 1.0).validate().is_err());
        assert!(tick(-5.0, 1.0).validate().is_err());
    }

    #[test]
    fn tick_validate_rejects_nan_price() {
        assert!(tick(f64::NAN, 1.0).validate().is_err());
    }

    #[test]
    fn tick_validate_rejects_negative_volume() {
        assert!(tick(100.0, -1.0).validate().is_err());
    }

    #[test]
    fn live_bar_vwap_matches_manual_calc() {
        let bar = LiveBar {
            symbol: "BTCUSDT".into(),
            open: 100.0,
            high: 110.0,
            low: 95.0,
            close: 105.0,
            volume: 10.0,
            pv_sum: 1025.0,
            tick_count: 3,
            minute: Utc::now(),
        };
        assert!((bar.vwap() - 102.5).abs() < 1e-9);
    }

    #[test]
    fn live_bar_vwap_falls_back_to_close_with_zero_volume() {
        let bar = LiveBar {
            symbol: "BTCUSDT".into(),
            open: 100.0,
            high: 100.0,
            low: 100.0,
            close: 100.0,
            volume: 0.0,
            pv_sum: 0.0,
            tick_count: 0,
            minute: Utc::now(),
        };
        assert_eq!(bar.vwap(), 100.0);
    }

    #[test]
    fn rule_validate_rejects_no_conditions() {
        let rule = Rule {
            id: "r1".into(),
            name: "test".into(),
            all: vec![],
            any: vec![],
            cooldown_secs: 60,
            enabled: true,
        };
        assert!(rule.validate().is_err());
    }

    #[test]
    fn idempotency_key_is_stable_for_same_bucket() {
        let a = Alert::idempotency_key("r1", "BTCUSDT", 100);
        let b = Alert::idempotency_key("r1", "BTCUSDT", 100);
        assert_eq!(a, b);
    }

    #[test]
    fn idempotency_key_differs_across_buckets() {
        let a = Alert::idempotency_key("r1", "BTCUSDT", 100);
        let b = Alert::idempotency_key("r1", "BTCUSDT", 101);
        assert_ne!(a, b);
    }
}
