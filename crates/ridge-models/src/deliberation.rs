use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;
use crate::transcript::{RoleKind, Stage, Stance, Transcript};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportStatus {
    Complete,
    Placeholder { reason: String },
}

/// Structured output of one independent analyst.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub role: RoleKind,
    pub stance: Stance,
    /// 0.0 (strongly bearish) to 1.0 (strongly bullish).
    pub score: f64,
    pub summary: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub status: ReportStatus,
}

impl Report {
    /// Neutral stand-in for a role whose backend calls were exhausted.
    pub fn placeholder(role: RoleKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            role,
            stance: Stance::Neutral,
            score: 0.5,
            summary: format!("{role} analysis unavailable: {reason}"),
            key_points: Vec::new(),
            warnings: Vec::new(),
            status: ReportStatus::Placeholder { reason },
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.status, ReportStatus::Placeholder { .. })
    }
}

/// Trading-plan draft emitted by the synthesis stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TradingPlan {
    pub stance: Stance,
    /// 0.0 to 1.0 conviction in `stance`.
    pub conviction: f64,
    pub entry: Option<Decimal>,
    pub stop: Option<Decimal>,
    pub target: Option<Decimal>,
    pub holding_period_days: Option<u32>,
    #[serde(default)]
    pub catalysts: Vec<String>,
    pub rationale: String,
    #[serde(default)]
    pub placeholder: bool,
}

impl TradingPlan {
    pub fn placeholder(reason: impl Into<String>) -> Self {
        Self {
            stance: Stance::Neutral,
            conviction: 0.5,
            entry: None,
            stop: None,
            target: None,
            holding_period_days: None,
            catalysts: Vec::new(),
            rationale: format!("Synthesis unavailable: {}", reason.into()),
            placeholder: true,
        }
    }

    /// Conviction expressed as bullishness in [0, 1].
    pub fn bullishness(&self) -> f64 {
        let c = self.conviction.clamp(0.0, 1.0);
        match self.stance {
            Stance::Bullish => 0.5 + c / 2.0,
            Stance::Bearish => 0.5 - c / 2.0,
            Stance::Neutral => 0.5,
        }
    }
}

/// Risk-adjusted plan emitted by the risk judge after the risk debate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskPlan {
    /// Modeled worst-case drawdown for the position, percent.
    pub max_drawdown_pct: Option<f64>,
    /// Modeled daily volatility, percent.
    pub volatility_pct: Option<f64>,
    /// Position the risk judge would allow, percent of portfolio.
    pub suggested_position_pct: Option<f64>,
    pub stop: Option<Decimal>,
    pub rationale: String,
    #[serde(default)]
    pub placeholder: bool,
}

impl RiskPlan {
    pub fn placeholder(reason: impl Into<String>) -> Self {
        Self {
            max_drawdown_pct: None,
            volatility_pct: None,
            suggested_position_pct: None,
            stop: None,
            rationale: format!("Risk assessment unavailable: {}", reason.into()),
            placeholder: true,
        }
    }
}

/// How a bounded adversarial debate ended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DebateSummary {
    pub rounds_run: u32,
    pub max_rounds: u32,
    /// Both sides ended on the same stance, or one side conceded.
    pub converged: bool,
    /// Stopped before `max_rounds`.
    pub early_exit: bool,
    /// Final conviction of the side arguing for the trade (bull, aggressive).
    pub pro_conviction: f64,
    /// Final conviction of the side arguing against (bear, conservative).
    pub con_conviction: f64,
}

impl DebateSummary {
    pub fn empty(max_rounds: u32) -> Self {
        Self {
            rounds_run: 0,
            max_rounds,
            converged: false,
            early_exit: false,
            pro_conviction: 0.5,
            con_conviction: 0.5,
        }
    }

    /// 0.0 when one side clearly won or both agree; 1.0 when both sides held maximal conviction.
    pub fn polarization(&self) -> f64 {
        if self.converged {
            return 0.0;
        }
        (2.0 * self.pro_conviction.min(self.con_conviction)).clamp(0.0, 1.0)
    }
}

/// A role whose output was replaced by a placeholder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DegradedRole {
    pub role: RoleKind,
    pub stage: Stage,
    pub reason: String,
}

/// Everything the deliberation pipeline produced for one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliberationResult {
    pub snapshot: Snapshot,
    pub transcript: Transcript,
    pub reports: Vec<Report>,
    pub debate: DebateSummary,
    pub synthesis: TradingPlan,
    pub risk_debate: DebateSummary,
    pub risk_adjusted_plan: RiskPlan,
    pub degraded: Vec<DegradedRole>,
    pub elapsed_ms: u64,
}

impl DeliberationResult {
    pub fn placeholder_count(&self) -> usize {
        self.degraded.len()
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn placeholder_report_is_neutral() {
        let report = Report::placeholder(RoleKind::News, "timed out after 2 attempts");
        assert!(report.is_placeholder());
        assert_eq!(report.stance, Stance::Neutral);
        assert_eq!(report.score, 0.5);
        assert!(report.summary.contains("news analysis unavailable"));
    }

    #[test]
    fn report_status_serialization() {
        let json = serde_json::to_value(ReportStatus::Placeholder {
            reason: "x".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "placeholder");
        assert_eq!(
            serde_json::to_value(ReportStatus::Complete).unwrap()["status"],
            "complete"
        );
    }

    #[test]
    fn plan_bullishness() {
        let mut plan = TradingPlan::placeholder("none");
        assert_eq!(plan.bullishness(), 0.5);
        plan.stance = Stance::Bullish;
        plan.conviction = 0.8;
        assert!((plan.bullishness() - 0.9).abs() < 1e-9);
        plan.stance = Stance::Bearish;
        assert!((plan.bullishness() - 0.1).abs() < 1e-9);
        plan.entry = Some(dec!(99.50));
        assert_eq!(plan.entry, Some(dec!(99.50)));
    }

    #[test]
    fn polarization() {
        let mut debate = DebateSummary::empty(2);
        debate.pro_conviction = 0.9;
        debate.con_conviction = 0.85;
        assert!((debate.polarization() - 1.0).abs() < 1e-9);
        debate.con_conviction = 0.2;
        assert!((debate.polarization() - 0.4).abs() < 1e-9);
        debate.converged = true;
        assert_eq!(debate.polarization(), 0.0);
    }
}
