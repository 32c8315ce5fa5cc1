//! Confidence calibration and position sizing.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use ridge_models::{
    ContextBlock, ContextStatus, DebateSummary, DecisionConfig, GateKind, GateOutcome,
    PortfolioConfig, TradingPlan,
};

const GATE_WEIGHT: f64 = 0.35;
const CONVICTION_WEIGHT: f64 = 0.30;
const DEBATE_WEIGHT: f64 = 0.15;
const TIMING_WEIGHT: f64 = 0.20;

const DEGRADED_CONTEXT_PENALTY: f64 = 0.85;
const NO_CONTEXT_PENALTY: f64 = 0.95;
const UNDERPERFORMING_PENALTY: f64 = 0.80;
const PLACEHOLDER_PENALTY: f64 = 0.92;
const PLACEHOLDER_FLOOR: f64 = 0.5;

/// One multiplicative penalty applied to raw confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Penalty {
    pub factor: f64,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Confidence {
    /// 0-100, two decimal places.
    pub value: Decimal,
    pub raw: f64,
    pub penalties: Vec<Penalty>,
}

/// 1.0 when the debate converged on one side; lower the harder both sides held.
pub fn debate_component(debate: &DebateSummary) -> f64 {
    let agreement = 1.0 - debate.polarization();
    let lean = (debate.pro_conviction - debate.con_conviction + 1.0) / 2.0;
    (0.5 * agreement + 0.5 * lean).clamp(0.0, 1.0)
}

/// Similar setups exist in sufficient number and mostly failed, or lost money on average.
pub fn underperforming(context: &ContextBlock, config: &DecisionConfig) -> bool {
    if context.judged_outcomes() < config.min_outcome_samples {
        return false;
    }
    let poor_rate = context
        .success_rate()
        .is_some_and(|r| r <= config.success_rate_threshold);
    let losing = context.mean_realized_return().is_some_and(|r| r < 0.0);
    poor_rate || losing
}

pub fn confidence(
    gates: &[GateOutcome],
    plan: &TradingPlan,
    debate: &DebateSummary,
    timing_score: f64,
    context: &ContextBlock,
    placeholders: usize,
    config: &DecisionConfig,
) -> Confidence {
    let vetting: Vec<f64> = gates
        .iter()
        .filter(|g| g.gate != GateKind::Timing)
        .map(|g| g.margin)
        .collect();
    let gate_margin = if vetting.is_empty() {
        0.0
    } else {
        vetting.iter().sum::<f64>() / vetting.len() as f64
    };

    let raw = 100.0
        * (GATE_WEIGHT * gate_margin
            + CONVICTION_WEIGHT * plan.bullishness()
            + DEBATE_WEIGHT * debate_component(debate)
            + TIMING_WEIGHT * (timing_score / 100.0).clamp(0.0, 1.0));

    let mut penalties = Vec::new();
    match context.status {
        ContextStatus::Degraded { ref reason } => penalties.push(Penalty {
            factor: DEGRADED_CONTEXT_PENALTY,
            note: format!("historical context degraded: {reason}"),
        }),
        ContextStatus::NoPriorContext => penalties.push(Penalty {
            factor: NO_CONTEXT_PENALTY,
            note: "no prior context for similar setups".to_string(),
        }),
        ContextStatus::Available => {}
    }
    if underperforming(context, config) {
        penalties.push(Penalty {
            factor: UNDERPERFORMING_PENALTY,
            note: "similar past setups underperformed".to_string(),
        });
    }
    if placeholders > 0 {
        let exponent = i32::try_from(placeholders).unwrap_or(i32::MAX);
        penalties.push(Penalty {
            factor: PLACEHOLDER_PENALTY.powi(exponent).max(PLACEHOLDER_FLOOR),
            note: format!("{placeholders} role(s) replaced by placeholders"),
        });
    }

    let scaled = penalties
        .iter()
        .fold(raw, |acc, p| acc * p.factor)
        .clamp(0.0, 100.0);
    Confidence {
        value: Decimal::from_f64(scaled).unwrap_or(Decimal::ZERO).round_dp(2),
        raw,
        penalties,
    }
}

/// Percent of portfolio for a BUY. Grows with confidence, shrinks with volatility above target.
pub fn position_size(
    confidence: Decimal,
    volatility_pct: Option<f64>,
    cap_pct: f64,
    portfolio: &PortfolioConfig,
) -> Decimal {
    let conf = confidence.to_f64().unwrap_or(0.0).clamp(0.0, 100.0);
    let vol_scale = match volatility_pct {
        Some(v) if v > 0.0 => (portfolio.target_volatility_pct / v).min(1.0),
        _ => 1.0,
    };
    let size = (portfolio.max_position_pct * conf / 100.0 * vol_scale)
        .min(cap_pct)
        .min(portfolio.max_position_pct)
        .max(0.0);
    Decimal::from_f64(size).unwrap_or(Decimal::ZERO).round_dp(2)
}
