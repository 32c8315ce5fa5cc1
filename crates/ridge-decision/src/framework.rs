use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use ridge_models::{
    ContextBlock, Decision, DecisionConfig, DeliberationResult, GateKind, GateOutcome,
    PortfolioConfig, Snapshot, Stance, Verdict, DECISION_SCHEMA_VERSION,
};
use tracing::{debug, info};

use crate::confidence::{confidence, position_size};
use crate::gates::{fundamental_gate, risk_gate, technical_gate, timing_gate};
use crate::params::trade_parameters;

/// Turns a deliberation result and its retrieval context into a verdict.
///
/// Pure and synchronous: identical inputs always yield identical gate booleans.
#[derive(Debug, Clone)]
pub struct DecisionFramework {
    decision: DecisionConfig,
    portfolio: PortfolioConfig,
}

impl DecisionFramework {
    pub fn new(decision: DecisionConfig, portfolio: PortfolioConfig) -> Self {
        Self {
            decision,
            portfolio,
        }
    }

    pub fn decision_config(&self) -> &DecisionConfig {
        &self.decision
    }

    pub fn decide(&self, result: &DeliberationResult, context: &ContextBlock) -> Decision {
        let snapshot = &result.snapshot;
        let plan = &result.synthesis;
        let risk_plan = &result.risk_adjusted_plan;

        let mut trade = trade_parameters(snapshot, plan, risk_plan, context, &self.decision);
        let fundamental = fundamental_gate(snapshot, &self.decision);
        let technical = technical_gate(snapshot, context, &self.decision);
        let risk = risk_gate(risk_plan, &trade, &self.decision, &self.portfolio);
        let timing = timing_gate(snapshot, plan);
        let timing_score = timing.score.unwrap_or(50.0);
        let gates = vec![fundamental, technical, risk.outcome.clone(), timing];

        let calibrated = confidence(
            &gates,
            plan,
            &result.debate,
            timing_score,
            context,
            result.placeholder_count(),
            &self.decision,
        );

        let mut notes: Vec<String> = result
            .degraded
            .iter()
            .map(|d| format!("{} ({}) degraded: {}", d.role, d.stage, d.reason))
            .collect();
        notes.extend(calibrated.penalties.iter().map(|p| p.note.clone()));
        notes.extend(gates.iter().filter(|g| !g.passed).map(|g| {
            let how = if g.hard_fail { "rejected" } else { "failed" };
            format!("{} gate {how}: {}", g.gate, g.reasons.join("; "))
        }));

        let hard = gates.iter().find(|g| g.hard_fail).map(|g| g.gate);
        let soft = gates.iter().find(|g| !g.passed).map(|g| g.gate);
        let min_confidence =
            Decimal::from_f64(self.decision.min_buy_confidence).unwrap_or(Decimal::ZERO);

        let (verdict, failed_gate) = if let Some(gate) = hard {
            (Verdict::Pass, Some(gate))
        } else if let Some(gate) = soft {
            (Verdict::Wait, Some(gate))
        } else if plan.stance == Stance::Bearish && !plan.placeholder {
            notes.push(format!(
                "gates pass but the trader's plan is bearish (conviction {:.2})",
                plan.conviction
            ));
            (Verdict::Wait, None)
        } else if calibrated.value < min_confidence {
            notes.push(format!(
                "confidence {} below the {} required to buy",
                calibrated.value, min_confidence
            ));
            (Verdict::Wait, None)
        } else {
            (Verdict::Buy, None)
        };

        if verdict == Verdict::Buy {
            let volatility = risk_plan.volatility_pct.or_else(|| snapshot.atr_pct());
            trade.position_size_pct = position_size(
                calibrated.value,
                volatility,
                risk.position_cap_pct,
                &self.portfolio,
            );
        }

        debug!(
            symbol = %snapshot.symbol,
            raw_confidence = calibrated.raw,
            drawdown_pct = risk.drawdown_pct,
            "Gates evaluated"
        );
        info!(
            symbol = %snapshot.symbol,
            verdict = %verdict,
            confidence = %calibrated.value,
            failed_gate = ?failed_gate,
            "Decision made"
        );

        Decision {
            schema_version: DECISION_SCHEMA_VERSION,
            symbol: snapshot.symbol.clone(),
            verdict,
            confidence: calibrated.value,
            gates,
            failed_gate,
            timing_score,
            entry: trade.entry,
            stop: trade.stop,
            target: trade.target,
            position_size_pct: trade.position_size_pct,
            holding_period_days: trade.holding_period_days,
            notes,
            degraded: result.is_degraded() || context.is_degraded(),
            timed_out: false,
            analysis_id: None,
            signal_id: None,
            decided_at: Utc::now(),
            processing_time_ms: result.elapsed_ms,
        }
    }

    /// PASS returned when the whole-run deadline fires before a decision exists.
    pub fn timed_out(&self, snapshot: &Snapshot, elapsed_ms: u64) -> Decision {
        let entry = snapshot.price.round_dp(2);
        let stop_fraction =
            Decimal::from_f64(self.decision.default_stop_pct / 100.0).unwrap_or(Decimal::ZERO);
        Decision {
            schema_version: DECISION_SCHEMA_VERSION,
            symbol: snapshot.symbol.clone(),
            verdict: Verdict::Pass,
            confidence: Decimal::ZERO,
            gates: Vec::<GateOutcome>::new(),
            failed_gate: None,
            timing_score: 0.0,
            entry,
            stop: (entry * (Decimal::ONE - stop_fraction)).round_dp(2),
            target: entry,
            position_size_pct: Decimal::ZERO,
            holding_period_days: self.decision.default_holding_days,
            notes: vec![format!("analysis timed out after {elapsed_ms} ms")],
            degraded: true,
            timed_out: true,
            analysis_id: None,
            signal_id: None,
            decided_at: Utc::now(),
            processing_time_ms: elapsed_ms,
        }
    }
}

/// Whether gates 1-3 all passed.
pub fn vetting_gates_pass(gates: &[GateOutcome]) -> bool {
    gates
        .iter()
        .filter(|g| g.gate != GateKind::Timing)
        .all(|g| g.passed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridge_models::{
        indicators, DebateSummary, DegradedRole, Fundamentals, RiskPlan, RoleKind, Stage,
        Transcript, TradingPlan,
    };
    use rust_decimal_macros::dec;

    fn framework() -> DecisionFramework {
        DecisionFramework::new(DecisionConfig::default(), PortfolioConfig::default())
    }

    fn plan(stance: Stance, conviction: f64) -> TradingPlan {
        TradingPlan {
            stance,
            conviction,
            entry: Some(dec!(96.00)),
            stop: Some(dec!(91.00)),
            target: Some(dec!(110.00)),
            holding_period_days: Some(60),
            catalysts: vec!["earnings".to_string()],
            rationale: "test".to_string(),
            placeholder: false,
        }
    }

    fn risk(drawdown: f64) -> RiskPlan {
        RiskPlan {
            max_drawdown_pct: Some(drawdown),
            volatility_pct: Some(1.5),
            suggested_position_pct: Some(8.0),
            stop: None,
            rationale: "test".to_string(),
            placeholder: false,
        }
    }

    fn pulled_back() -> Snapshot {
        Snapshot::new("ACME", dec!(96.00), 70)
            .with_indicator(indicators::RECENT_HIGH, 104.0)
            .with_indicator(indicators::SUPPORT, 94.0)
            .with_indicator(indicators::RSI, 42.0)
            .with_indicator(indicators::MA50, 95.0)
    }

    fn result(snapshot: Snapshot, plan: TradingPlan, risk: RiskPlan) -> DeliberationResult {
        let debate = DebateSummary {
            rounds_run: 1,
            converged: true,
            early_exit: true,
            pro_conviction: 0.8,
            con_conviction: 0.3,
            ..DebateSummary::empty(2)
        };
        DeliberationResult {
            snapshot,
            transcript: Transcript::default(),
            reports: Vec::new(),
            debate: debate.clone(),
            synthesis: plan,
            risk_debate: debate,
            risk_adjusted_plan: risk,
            degraded: Vec::new(),
            elapsed_ms: 12,
        }
    }

    #[test]
    fn clean_setup_buys_with_sized_position() {
        let d = framework().decide(
            &result(pulled_back(), plan(Stance::Bullish, 0.8), risk(6.0)),
            &ContextBlock::no_prior_context("first look"),
        );
        assert_eq!(d.verdict, Verdict::Buy, "{:?}", d.notes);
        assert!(vetting_gates_pass(&d.gates));
        assert!(d.position_size_pct > Decimal::ZERO);
        assert!(d.position_size_pct <= dec!(8));
        assert_eq!(d.entry, dec!(96.00));
        assert_eq!(d.stop, dec!(91.00));
        assert_eq!(d.holding_period_days, 60);
        assert!(d.failed_gate.is_none());
        assert!(d.notes.iter().any(|n| n.contains("no prior context")));
    }

    #[test]
    fn soft_failure_waits_with_zero_size() {
        let snapshot = pulled_back().with_indicator(indicators::RSI, 85.0);
        let d = framework().decide(
            &result(snapshot, plan(Stance::Bullish, 0.8), risk(6.0)),
            &ContextBlock::no_prior_context("x"),
        );
        assert_eq!(d.verdict, Verdict::Wait);
        assert_eq!(d.failed_gate, Some(GateKind::TechnicalEntry));
        assert_eq!(d.position_size_pct, Decimal::ZERO);
        assert!(d.notes.iter().any(|n| n.starts_with("technical entry gate failed")));
    }

    #[test]
    fn excessive_drawdown_passes_on_trade() {
        let d = framework().decide(
            &result(pulled_back(), plan(Stance::Bullish, 0.9), risk(22.0)),
            &ContextBlock::no_prior_context("x"),
        );
        assert_eq!(d.verdict, Verdict::Pass);
        assert_eq!(d.failed_gate, Some(GateKind::Risk));
    }

    #[test]
    fn hard_fail_outranks_earlier_soft_fail() {
        let mut snapshot = pulled_back().with_indicator(indicators::RSI, 85.0);
        snapshot.fundamentals = Fundamentals {
            pe_ratio: Some(40.0),
            sector_median_pe: Some(20.0),
            ..Default::default()
        };
        let d = framework().decide(
            &result(snapshot, plan(Stance::Bullish, 0.8), risk(6.0)),
            &ContextBlock::no_prior_context("x"),
        );
        assert_eq!(d.verdict, Verdict::Pass);
        assert_eq!(d.failed_gate, Some(GateKind::Fundamental));
    }

    #[test]
    fn bearish_plan_blocks_buy() {
        let d = framework().decide(
            &result(pulled_back(), plan(Stance::Bearish, 0.7), risk(6.0)),
            &ContextBlock::no_prior_context("x"),
        );
        assert_eq!(d.verdict, Verdict::Wait);
        assert!(vetting_gates_pass(&d.gates));
        assert!(d.failed_gate.is_none());
    }

    #[test]
    fn low_confidence_downgrades_buy() {
        let config = DecisionConfig {
            min_buy_confidence: 99.0,
            ..Default::default()
        };
        let d = DecisionFramework::new(config, PortfolioConfig::default()).decide(
            &result(pulled_back(), plan(Stance::Bullish, 0.8), risk(6.0)),
            &ContextBlock::no_prior_context("x"),
        );
        assert_eq!(d.verdict, Verdict::Wait);
        assert!(d.notes.iter().any(|n| n.contains("required to buy")));
    }

    #[test]
    fn degraded_roles_are_noted_and_discounted() {
        let clean = framework().decide(
            &result(pulled_back(), plan(Stance::Bullish, 0.8), risk(6.0)),
            &ContextBlock::no_prior_context("x"),
        );
        let mut degraded = result(pulled_back(), plan(Stance::Bullish, 0.8), risk(6.0));
        degraded.degraded.push(DegradedRole {
            role: RoleKind::News,
            stage: Stage::IndependentAnalysis,
            reason: "timed out".to_string(),
        });
        let d = framework().decide(&degraded, &ContextBlock::no_prior_context("x"));
        assert!(d.degraded);
        assert!(d.confidence < clean.confidence);
        assert!(d.notes.iter().any(|n| n.contains("degraded: timed out")));
    }

    #[test]
    fn timed_out_decision_is_pass() {
        let d = framework().timed_out(&pulled_back(), 600_000);
        assert_eq!(d.verdict, Verdict::Pass);
        assert!(d.timed_out);
        assert_eq!(d.position_size_pct, Decimal::ZERO);
        assert!(d.stop < d.entry);
        assert!(d.notes[0].contains("timed out"));
    }
}
