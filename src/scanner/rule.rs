// =============================================================================
// Rule compiler — Rule/Condition -> evaluable closures
// =============================================================================
//
// A `Rule` is compiled once (when it's loaded or changed) into a
// `CompiledRule` that evaluates against a `MetricResolver` for a given
// symbol at scan time. Compilation fails fast if a condition references a
// metric the resolver doesn't recognize, rather than silently treating it
// as "never fires".

use std::collections::HashMap;

use thiserror::Error;

use crate::models::{Condition, Op, Rule};

/// Supplies metric values to a compiled rule at evaluation time. Implemented
/// against the scanner's per-symbol state (latest bar fields plus the
/// cached indicator snapshot).
pub trait MetricResolver {
    /// Current value of `metric`, or `None` if not yet available (e.g. an
    /// indicator still warming up).
    fn resolve(&self, metric: &str) -> Option<f64>;

    /// Value of `metric` one scan cycle ago, used for cross-above/below
    /// conditions. `None` disables those conditions (they never fire).
    fn resolve_prior(&self, metric: &str) -> Option<f64> {
        let _ = metric;
        None
    }
}

/// A minimal in-memory resolver, used by tests and by the scan loop once it
/// has assembled a symbol's metric map for this cycle.
pub struct MapResolver {
    pub current: HashMap<String, f64>,
    pub prior: HashMap<String, f64>,
}

impl MetricResolver for MapResolver {
    fn resolve(&self, metric: &str) -> Option<f64> {
        self.current.get(metric).copied()
    }

    fn resolve_prior(&self, metric: &str) -> Option<f64> {
        self.prior.get(metric).copied()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error("rule {rule_id} condition references unknown metric {metric}")]
    UnknownMetric { rule_id: String, metric: String },
}

/// The known set of base metrics every resolver must support in addition to
/// whatever indicator names are cached for the symbol. Used only to give a
/// friendlier compile error when a rule typos a metric name the resolver
/// couldn't possibly have.
const BASE_METRICS: &[&str] = &["close", "open", "high", "low", "volume", "vwap"];

fn eval_condition(cond: &Condition, resolver: &dyn MetricResolver) -> bool {
    match cond.op {
        Op::CrossesAbove => {
            let (Some(now), Some(prior)) = (
                resolver.resolve(&cond.metric),
                resolver.resolve_prior(&cond.metric),
            ) else {
                return false;
            };
            prior <= cond.value && now > cond.value
        }
        Op::CrossesBelow => {
            let (Some(now), Some(prior)) = (
                resolver.resolve(&cond.metric),
                resolver.resolve_prior(&cond.metric),
            ) else {
                return false;
            };
            prior >= cond.value && now < cond.value
        }
        _ => {
            let Some(value) = resolver.resolve(&cond.metric) else {
                return false;
            };
            match cond.op {
                Op::Gt => value > cond.value,
                Op::Gte => value >= cond.value,
                Op::Lt => value < cond.value,
                Op::Lte => value <= cond.value,
                Op::Eq => (value - cond.value).abs() < f64::EPSILON,
                Op::Neq => (value - cond.value).abs() >= f64::EPSILON,
                Op::CrossesAbove | Op::CrossesBelow => unreachable!(),
            }
        }
    }
}

/// A rule ready to be evaluated many times against different symbols'
/// resolvers without re-parsing.
#[derive(Clone)]
pub struct CompiledRule {
    pub rule: Rule,
}

impl CompiledRule {
    /// Compile `rule`, rejecting conditions that reference a metric not in
    /// `known_metrics` (the base fields plus whatever indicator names the
    /// registry produces). `known_metrics` is advisory: an indicator that
    /// simply hasn't warmed up yet for a *specific* symbol is not a compile
    /// error, only a runtime non-match — this check only catches outright
    /// typos against the full known metric universe.
    pub fn compile(rule: Rule, known_metrics: &[&str]) -> Result<Self, CompileError> {
        for cond in rule.all.iter().chain(rule.any.iter()) {
            let known = BASE_METRICS.contains(&cond.metric.as_str())
                || known_metrics.contains(&cond.metric.as_str());
            if !known {
                return Err(CompileError::UnknownMetric {
                    rule_id: rule.id.clone(),
                    metric: cond.metric.clone(),
                });
            }
        }
        Ok(Self { rule })
    }

    /// `all` conditions must all pass (vacuously true if empty); `any` must
    /// have at least one pass (vacuously false if empty). A rule with both
    /// lists populated requires both halves to be satisfied.
    pub fn eval(&self, resolver: &dyn MetricResolver) -> bool {
        let all_ok = self.rule.all.iter().all(|c| eval_condition(c, resolver));
        let any_ok = self.rule.any.is_empty() || self.rule.any.iter().any(|c| eval_condition(c, resolver));
        all_ok && any_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(pairs: &[(&str, f64)]) -> MapResolver {
        MapResolver {
            current: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            prior: HashMap::new(),
        }
    }

    fn cond(metric: &str, op: Op, value: f64) -> Condition {
        Condition {
            metric: metric.to_string(),
            op,
            value,
        }
    }

    fn base_rule(all: Vec<Condition>, any: Vec<Condition>) -> Rule {
        Rule {
            id: "r1".into(),
            name: "test rule".into(),
            all,
            any,
            cooldown_secs: 60,
            enabled: true,
        }
    }

    #[test]
    fn compile_rejects_unknown_metric() {
        let rule = base_rule(vec![cond("not_a_real_metric", Op::Gt, 1.0)], vec![]);
        let err = CompiledRule::compile(rule, &["rsi_14"]).unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownMetric {
                rule_id: "r1".into(),
                metric: "not_a_real_metric".into(),
            }
        );
    }

    #[test]
    fn compile_accepts_base_and_registered_metrics() {
        let rule = base_rule(
            vec![cond("close", Op::Gt, 0.0), cond("rsi_14", Op::Lt, 30.0)],
            vec![],
        );
        assert!(CompiledRule::compile(rule, &["rsi_14"]).is_ok());
    }

    #[test]
    fn all_conditions_must_pass() {
        let rule = base_rule(
            vec![cond("rsi_14", Op::Lt, 30.0), cond("volume", Op::Gt, 100.0)],
            vec![],
        );
        let compiled = CompiledRule::compile(rule, &["rsi_14"]).unwrap();

        assert!(compiled.eval(&resolver(&[("rsi_14", 20.0), ("volume", 200.0)])));
        assert!(!compiled.eval(&resolver(&[("rsi_14", 40.0), ("volume", 200.0)])));
    }

    #[test]
    fn empty_all_is_vacuously_true() {
        let rule = base_rule(vec![], vec![cond("rsi_14", Op::Lt, 30.0)]);
        let compiled = CompiledRule::compile(rule, &["rsi_14"]).unwrap();
        assert!(compiled.eval(&resolver(&[("rsi_14", 10.0)])));
    }

    #[test]
    fn empty_any_is_vacuously_false_but_ignored_when_list_empty() {
        // `any` is only treated as "must match" when non-empty; an empty any
        // list does not block a rule built purely on `all`.
        let rule = base_rule(vec![cond("rsi_14", Op::Lt, 30.0)], vec![]);
        let compiled = CompiledRule::compile(rule, &["rsi_14"]).unwrap();
        assert!(compiled.eval(&resolver(&[("rsi_14", 10.0)])));
    }

    #[test]
    fn missing_metric_value_never_matches() {
        let rule = base_rule(vec![cond("rsi_14", Op::Lt, 30.0)], vec![]);
        let compiled = CompiledRule::compile(rule, &["rsi_14"]).unwrap();
        assert!(!compiled.eval(&resolver(&[])));
    }

    #[test]
    fn crosses_above_requires_prior_below_and_now_above() {
        let rule = base_rule(vec![cond("rsi_14", Op::CrossesAbove, 30.0)], vec![]);
        let compiled = CompiledRule::compile(rule, &["rsi_14"]).unwrap();

        let mut r = resolver(&[("rsi_14", 35.0)]);
        r.prior.insert("rsi_14".into(), 25.0);
        assert!(compiled.eval(&r));

        let mut r2 = resolver(&[("rsi_14", 35.0)]);
        r2.prior.insert("rsi_14".into(), 40.0);
        assert!(!compiled.eval(&r2));
    }

    #[test]
    fn crosses_above_without_prior_value_never_matches() {
        let rule = base_rule(vec![cond("rsi_14", Op::CrossesAbove, 30.0)], vec![]);
        let compiled = CompiledRule::compile(rule, &["rsi_14"]).unwrap();
        assert!(!compiled.eval(&resolver(&[("rsi_14", 35.0)])));
    }

    #[test]
    fn neq_matches_any_value_other_than_the_target() {
        let rule = base_rule(vec![cond("volume", Op::Neq, 0.0)], vec![]);
        let compiled = CompiledRule::compile(rule, &[]).unwrap();
        assert!(compiled.eval(&resolver(&[("volume", 5.0)])));
        assert!(!compiled.eval(&resolver(&[("volume", 0.0)])));
    }
}
