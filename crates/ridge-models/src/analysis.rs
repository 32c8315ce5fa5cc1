use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::ContextStatus;
use crate::deliberation::{DebateSummary, Report, RiskPlan, TradingPlan};
use crate::snapshot::Snapshot;
use crate::transcript::Transcript;

pub const ANALYSIS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Buy,
    Wait,
    Pass,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Buy => "BUY",
            Verdict::Wait => "WAIT",
            Verdict::Pass => "PASS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Some(Verdict::Buy),
            "WAIT" => Some(Verdict::Wait),
            "PASS" => Some(Verdict::Pass),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Fundamental,
    TechnicalEntry,
    Risk,
    Timing,
}

impl fmt::Display for GateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GateKind::Fundamental => "fundamental value",
            GateKind::TechnicalEntry => "technical entry",
            GateKind::Risk => "risk",
            GateKind::Timing => "timing",
        };
        f.write_str(name)
    }
}

/// Result of one gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateOutcome {
    pub gate: GateKind,
    pub passed: bool,
    /// Rejects the trade outright (verdict PASS) rather than deferring it (WAIT).
    pub hard_fail: bool,
    /// 0.0 (barely/failed) to 1.0 (comfortably inside the gate).
    pub margin: f64,
    /// Scoring gates only: 0-100.
    pub score: Option<f64>,
    pub reasons: Vec<String>,
}

impl GateOutcome {
    pub fn pass(gate: GateKind, margin: f64, reasons: Vec<String>) -> Self {
        Self {
            gate,
            passed: true,
            hard_fail: false,
            margin: margin.clamp(0.0, 1.0),
            score: None,
            reasons,
        }
    }

    pub fn fail(gate: GateKind, reasons: Vec<String>) -> Self {
        Self {
            gate,
            passed: false,
            hard_fail: false,
            margin: 0.0,
            score: None,
            reasons,
        }
    }

    pub fn hard_fail(gate: GateKind, reasons: Vec<String>) -> Self {
        Self {
            hard_fail: true,
            ..Self::fail(gate, reasons)
        }
    }
}

/// Entry, exit and sizing parameters for a decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradeParameters {
    pub entry: Decimal,
    pub stop: Decimal,
    pub target: Decimal,
    pub position_size_pct: Decimal,
    pub holding_period_days: u32,
}

/// Full deliberation + decision record for one ticker at one time. Never mutated after write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Analysis {
    pub id: Uuid,
    pub schema_version: u32,
    pub symbol: String,
    pub scan_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub snapshot: Snapshot,
    pub reports: Vec<Report>,
    pub transcript: Transcript,
    pub debate: DebateSummary,
    pub synthesis: TradingPlan,
    pub risk_debate: DebateSummary,
    pub risk_plan: RiskPlan,
    pub verdict: Verdict,
    /// 0-100.
    pub confidence: Decimal,
    pub gates: Vec<GateOutcome>,
    pub timing_score: f64,
    pub trade: TradeParameters,
    pub context_status: ContextStatus,
    /// Every recovered failure in the run (placeholders, degraded context).
    pub degradations: Vec<String>,
    /// Embedding of the canonical snapshot rendering. Stored in its own column.
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

impl Analysis {
    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_serialization() {
        assert_eq!(serde_json::to_string(&Verdict::Buy).unwrap(), "\"BUY\"");
        assert_eq!(Verdict::parse("wait"), Some(Verdict::Wait));
        assert_eq!(Verdict::parse("sell"), None);
    }

    #[test]
    fn hard_fail_is_also_failed() {
        let gate = GateOutcome::hard_fail(GateKind::Risk, vec!["drawdown 22%".to_string()]);
        assert!(!gate.passed);
        assert!(gate.hard_fail);
        assert_eq!(gate.margin, 0.0);
    }

    #[test]
    fn pass_clamps_margin() {
        let gate = GateOutcome::pass(GateKind::Fundamental, 1.7, vec![]);
        assert_eq!(gate.margin, 1.0);
    }
}
