//! Per-kind prediction outcome counters.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::module::PredictionKind;

/// Outcome counters for one kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    /// Predictions recorded, including overwrites of a pending key.
    pub predictions: u64,
    /// Predictions the server confirmed.
    pub successes: u64,
    /// Predictions the server contradicted.
    pub rollbacks: u64,
    /// Predictions that timed out unanswered.
    pub expired: u64,
}

impl KindStats {
    /// Percentage of predictions that were confirmed.
    pub fn success_rate(&self) -> f64 {
        if self.predictions == 0 {
            return 0.0;
        }
        self.successes as f64 / self.predictions as f64 * 100.0
    }
}

/// Snapshot of every kind that has seen activity.
pub type TelemetrySnapshot = BTreeMap<PredictionKind, KindStats>;

/// Monotonic counters, cleared only by [`reset`](Telemetry::reset).
#[derive(Debug, Default)]
pub struct Telemetry {
    stats: BTreeMap<PredictionKind, KindStats>,
}

impl Telemetry {
    /// Empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_prediction(&mut self, kind: PredictionKind) {
        self.entry(kind).predictions += 1;
    }

    pub(crate) fn record_success(&mut self, kind: PredictionKind) {
        self.entry(kind).successes += 1;
    }

    pub(crate) fn record_rollback(&mut self, kind: PredictionKind) {
        self.entry(kind).rollbacks += 1;
    }

    pub(crate) fn record_expired(&mut self, kind: PredictionKind) {
        self.entry(kind).expired += 1;
    }

    /// Counters for `kind`; zeros if it has never been used.
    pub fn stats(&self, kind: PredictionKind) -> KindStats {
        self.stats.get(&kind).copied().unwrap_or_default()
    }

    /// Success percentage for `kind`.
    pub fn success_rate(&self, kind: PredictionKind) -> f64 {
        self.stats(kind).success_rate()
    }

    /// Copy of all counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.stats.clone()
    }

    /// Clear every counter.
    pub fn reset(&mut self) {
        self.stats.clear();
    }

    fn entry(&mut self, kind: PredictionKind) -> &mut KindStats {
        self.stats.entry(kind).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let mut t = Telemetry::new();
        assert_eq!(t.success_rate(PredictionKind::Crystal), 0.0);

        for _ in 0..4 {
            t.record_prediction(PredictionKind::Crystal);
        }
        t.record_success(PredictionKind::Crystal);
        t.record_success(PredictionKind::Crystal);
        t.record_success(PredictionKind::Crystal);
        t.record_rollback(PredictionKind::Crystal);
        assert_eq!(t.success_rate(PredictionKind::Crystal), 75.0);
    }

    #[test]
    fn test_reset_clears_all_kinds() {
        let mut t = Telemetry::new();
        t.record_prediction(PredictionKind::Bed);
        t.record_expired(PredictionKind::Anchor);
        assert_eq!(t.snapshot().len(), 2);

        t.reset();
        assert!(t.snapshot().is_empty());
        assert_eq!(t.stats(PredictionKind::Bed), KindStats::default());
    }
}
