//! Built-in hooks shipped with the gateway.

use tracing::info;

use super::{Hook, HookAction, HookKind};
use crate::error::{GatewayError, Result};
use crate::sample::Sample;
use crate::signal::Value;

/// Drops every sample after the first `limit` have passed through.
pub struct LimitHook {
    kind: HookKind,
    limit: u64,
    seen: u64,
}

impl LimitHook {
    pub fn new(kind: HookKind, limit: u64) -> Self {
        Self {
            kind,
            limit,
            seen: 0,
        }
    }
}

impl Hook for LimitHook {
    fn name(&self) -> &str {
        "limit"
    }

    fn kind(&self) -> HookKind {
        self.kind
    }

    fn parse(&mut self, config: &serde_json::Value) -> Result<()> {
        self.limit = config
            .get("limit")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| GatewayError::Config("limit hook requires integer 'limit'".to_string()))?;
        Ok(())
    }

    fn process(&mut self, _sample: &Sample, _history: &[Sample]) -> HookAction {
        self.seen += 1;
        if self.seen > self.limit {
            HookAction::Stop(format!("sample limit {} reached", self.limit))
        } else {
            HookAction::Ok
        }
    }
}

/// Drops the first `count` samples, then passes everything through. Useful
/// for skipping warm-up transients from a source node.
pub struct SkipFirstHook {
    kind: HookKind,
    count: u64,
    skipped: u64,
}

impl SkipFirstHook {
    pub fn new(kind: HookKind, count: u64) -> Self {
        Self {
            kind,
            count,
            skipped: 0,
        }
    }
}

impl Hook for SkipFirstHook {
    fn name(&self) -> &str {
        "skip_first"
    }

    fn kind(&self) -> HookKind {
        self.kind
    }

    fn parse(&mut self, config: &serde_json::Value) -> Result<()> {
        if let Some(count) = config.get("count").and_then(|v| v.as_u64()) {
            self.count = count;
        }
        Ok(())
    }

    fn process(&mut self, _sample: &Sample, _history: &[Sample]) -> HookAction {
        if self.skipped < self.count {
            self.skipped += 1;
            HookAction::Skip
        } else {
            HookAction::Ok
        }
    }
}

/// Multiplies every numeric value in the sample by a fixed factor, in
/// place. A stand-in for the kind of unit-conversion hook a real gateway
/// ships (e.g. per-unit to physical scaling).
pub struct ScaleHook {
    kind: HookKind,
    factor: f64,
}

impl ScaleHook {
    pub fn new(kind: HookKind, factor: f64) -> Self {
        Self { kind, factor }
    }
}

impl Hook for ScaleHook {
    fn name(&self) -> &str {
        "scale"
    }

    fn kind(&self) -> HookKind {
        self.kind
    }

    fn parse(&mut self, config: &serde_json::Value) -> Result<()> {
        if let Some(factor) = config.get("factor").and_then(|v| v.as_f64()) {
            self.factor = factor;
        }
        Ok(())
    }

    fn check(&mut self) -> Result<()> {
        if !self.factor.is_finite() {
            return Err(GatewayError::Config(format!(
                "scale hook factor {} is not finite",
                self.factor
            )));
        }
        Ok(())
    }

    fn process(&mut self, sample: &Sample, _history: &[Sample]) -> HookAction {
        let scaled: Vec<Value> = sample
            .values()
            .into_iter()
            .map(|v| match v {
                Value::Integer(i) => Value::Float(i as f64 * self.factor),
                Value::Float(f) => Value::Float(f * self.factor),
                Value::Boolean(b) => Value::Boolean(b),
                Value::Complex(re, im) => Value::Complex(re * self.factor, im * self.factor),
            })
            .collect();
        sample.set_values(&scaled);
        HookAction::Ok
    }
}

/// Emits a `tracing` event for every sample it sees. Grounded on the
/// teacher's logging conventions (structured `tracing` fields rather than
/// formatted strings).
pub struct LoggingHook {
    kind: HookKind,
    label: String,
}

impl LoggingHook {
    pub fn new(kind: HookKind, label: impl Into<String>) -> Self {
        Self {
            kind,
            label: label.into(),
        }
    }
}

impl Hook for LoggingHook {
    fn name(&self) -> &str {
        "logging"
    }

    fn kind(&self) -> HookKind {
        self.kind
    }

    fn parse(&mut self, config: &serde_json::Value) -> Result<()> {
        if let Some(label) = config.get("label").and_then(|v| v.as_str()) {
            self.label = label.to_string();
        }
        Ok(())
    }

    fn process(&mut self, sample: &Sample, _history: &[Sample]) -> HookAction {
        info!(
            label = %self.label,
            sequence = sample.sequence(),
            length = sample.length(),
            "sample observed"
        );
        HookAction::Ok
    }
}

/// Periodic hook that tallies throughput and logs it on each timer tick.
/// Grounded on the teacher's periodic-stats reporting pattern (see
/// `stats.rs`), reimplemented here as a composable hook.
pub struct StatsHook {
    count: u64,
}

impl Default for StatsHook {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsHook {
    pub fn new() -> Self {
        Self { count: 0 }
    }
}

impl Hook for StatsHook {
    fn name(&self) -> &str {
        "stats"
    }

    fn kind(&self) -> HookKind {
        HookKind::Periodic
    }

    fn process(&mut self, _sample: &Sample, _history: &[Sample]) -> HookAction {
        self.count += 1;
        HookAction::Ok
    }

    fn periodic(&mut self) -> HookAction {
        info!(samples = self.count, "path stats tick");
        HookAction::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use std::sync::Arc;

    #[test]
    fn limit_hook_stops_after_threshold() {
        let mut hook = LimitHook::new(HookKind::PathRead, 2);
        let pool = Pool::new(3, 1);
        let samples = pool.acquire(3, Arc::new(vec![]));
        assert!(matches!(
            hook.process(&samples[0], &[]),
            HookAction::Ok
        ));
        assert!(matches!(
            hook.process(&samples[1], &[]),
            HookAction::Ok
        ));
        assert!(matches!(
            hook.process(&samples[2], &[]),
            HookAction::Stop(_)
        ));
    }

    #[test]
    fn skip_first_hook_skips_then_passes() {
        let mut hook = SkipFirstHook::new(HookKind::PathRead, 1);
        let pool = Pool::new(2, 1);
        let samples = pool.acquire(2, Arc::new(vec![]));
        assert!(matches!(hook.process(&samples[0], &[]), HookAction::Skip));
        assert!(matches!(hook.process(&samples[1], &[]), HookAction::Ok));
    }

    #[test]
    fn scale_hook_multiplies_values() {
        let mut hook = ScaleHook::new(HookKind::PathRead, 2.0);
        let pool = Pool::new(1, 1);
        let sample = pool.acquire(1, Arc::new(vec![])).pop().unwrap();
        sample.set_values(&[Value::Float(3.0)]);
        hook.process(&sample, &[]);
        assert_eq!(sample.values(), vec![Value::Float(6.0)]);
    }

    #[test]
    fn limit_hook_parse_requires_limit_field() {
        let mut hook = LimitHook::new(HookKind::PathRead, 0);
        let err = hook.parse(&serde_json::json!({})).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
        hook.parse(&serde_json::json!({ "limit": 5 })).unwrap();
        assert_eq!(hook.limit, 5);
    }

    #[test]
    fn scale_hook_check_rejects_non_finite_factor() {
        let mut hook = ScaleHook::new(HookKind::PathRead, 1.0);
        hook.parse(&serde_json::json!({ "factor": f64::NAN }))
            .unwrap();
        let err = hook.check().unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn logging_hook_parse_overrides_default_label() {
        let mut hook = LoggingHook::new(HookKind::PathRead, "logging");
        hook.parse(&serde_json::json!({ "label": "custom" }))
            .unwrap();
        assert_eq!(hook.label, "custom");
    }
}
