use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::{GateKind, GateOutcome, Verdict};

pub const DECISION_SCHEMA_VERSION: u32 = 1;

/// What `analyze()` hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub schema_version: u32,
    pub symbol: String,
    pub verdict: Verdict,
    /// 0-100.
    pub confidence: Decimal,
    pub gates: Vec<GateOutcome>,
    /// First gate that hard-failed (PASS) or failed (WAIT).
    pub failed_gate: Option<GateKind>,
    /// 0-100 timing sub-score.
    pub timing_score: f64,
    pub entry: Decimal,
    pub stop: Decimal,
    pub target: Decimal,
    /// Percent of portfolio. Zero unless the verdict is BUY.
    pub position_size_pct: Decimal,
    pub holding_period_days: u32,
    /// Human-readable notes on degraded stages and failing gates.
    pub notes: Vec<String>,
    pub degraded: bool,
    /// The whole-run circuit breaker fired.
    pub timed_out: bool,
    /// Set once the analysis has been persisted.
    pub analysis_id: Option<Uuid>,
    /// Set when an actionable signal was persisted alongside the analysis.
    pub signal_id: Option<Uuid>,
    pub decided_at: DateTime<Utc>,
    pub processing_time_ms: u64,
}

impl Decision {
    pub fn gate(&self, kind: GateKind) -> Option<&GateOutcome> {
        self.gates.iter().find(|g| g.gate == kind)
    }

    /// Pass/fail of gates 1-3, in order.
    pub fn gate_pattern(&self) -> Vec<(GateKind, bool)> {
        self.gates
            .iter()
            .filter(|g| g.gate != GateKind::Timing)
            .map(|g| (g.gate, g.passed))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Decision {
        Decision {
            schema_version: DECISION_SCHEMA_VERSION,
            symbol: "ACME".to_string(),
            verdict: Verdict::Wait,
            confidence: dec!(48.5),
            gates: vec![
                GateOutcome::pass(GateKind::Fundamental, 0.5, vec![]),
                GateOutcome::fail(GateKind::TechnicalEntry, vec!["no pullback".to_string()]),
                GateOutcome::pass(GateKind::Risk, 0.6, vec![]),
                GateOutcome {
                    score: Some(61.0),
                    ..GateOutcome::pass(GateKind::Timing, 0.61, vec![])
                },
            ],
            failed_gate: Some(GateKind::TechnicalEntry),
            timing_score: 61.0,
            entry: dec!(100.00),
            stop: dec!(92.00),
            target: dec!(116.00),
            position_size_pct: dec!(0),
            holding_period_days: 90,
            notes: vec!["technical entry gate failed: no pullback".to_string()],
            degraded: false,
            timed_out: false,
            analysis_id: None,
            signal_id: None,
            decided_at: Utc::now(),
            processing_time_ms: 1200,
        }
    }

    #[test]
    fn roundtrip_decision() {
        let decision = sample();
        let json = serde_json::to_string(&decision).unwrap();
        let parsed: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision, parsed);
    }

    #[test]
    fn gate_pattern_excludes_timing() {
        let pattern = sample().gate_pattern();
        assert_eq!(
            pattern,
            vec![
                (GateKind::Fundamental, true),
                (GateKind::TechnicalEntry, false),
                (GateKind::Risk, true),
            ]
        );
    }
}
