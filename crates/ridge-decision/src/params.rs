//! Entry, stop, target and holding period derived from the plans.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use ridge_models::{ContextBlock, DecisionConfig, RiskPlan, Snapshot, TradeParameters, TradingPlan};

/// Trade levels before sizing. `position_size_pct` is zero until the verdict is known.
///
/// Always satisfies `stop < entry <= price` and `target > entry` for a positive price.
pub fn trade_parameters(
    snapshot: &Snapshot,
    plan: &TradingPlan,
    risk_plan: &RiskPlan,
    context: &ContextBlock,
    config: &DecisionConfig,
) -> TradeParameters {
    let price = snapshot.price;
    let entry = plan
        .entry
        .filter(|e| *e > Decimal::ZERO)
        .map_or(price, |e| e.min(price))
        .round_dp(2);

    let below_entry = |level: &Decimal| *level > Decimal::ZERO && *level < entry;
    let stop = risk_plan
        .stop
        .filter(below_entry)
        .or_else(|| plan.stop.filter(below_entry))
        .unwrap_or_else(|| entry * (Decimal::ONE - pct(config.default_stop_pct)))
        .round_dp(2);

    let ratio = Decimal::from_f64(config.reward_risk_ratio).unwrap_or(Decimal::TWO);
    let target = plan
        .target
        .filter(|t| *t > entry)
        .unwrap_or_else(|| entry + (entry - stop) * ratio)
        .round_dp(2);

    let holding_period_days = plan
        .holding_period_days
        .filter(|d| *d > 0)
        .or_else(|| context.median_outcome_horizon())
        .unwrap_or(config.default_holding_days);

    TradeParameters {
        entry,
        stop,
        target,
        position_size_pct: Decimal::ZERO,
        holding_period_days,
    }
}

fn pct(value: f64) -> Decimal {
    Decimal::from_f64(value / 100.0).unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridge_models::Stance;
    use rust_decimal_macros::dec;

    fn plan(entry: Option<Decimal>, stop: Option<Decimal>, target: Option<Decimal>) -> TradingPlan {
        TradingPlan {
            stance: Stance::Bullish,
            conviction: 0.7,
            entry,
            stop,
            target,
            holding_period_days: None,
            catalysts: Vec::new(),
            rationale: "test".to_string(),
            placeholder: false,
        }
    }

    fn snapshot() -> Snapshot {
        Snapshot::new("ACME", dec!(100.00), 72)
    }

    #[test]
    fn entry_never_above_price() {
        let p = trade_parameters(
            &snapshot(),
            &plan(Some(dec!(103)), Some(dec!(95)), Some(dec!(120))),
            &RiskPlan::placeholder("x"),
            &ContextBlock::no_prior_context("x"),
            &DecisionConfig::default(),
        );
        assert_eq!(p.entry, dec!(100.00));
        assert_eq!(p.stop, dec!(95));
        assert_eq!(p.target, dec!(120));
        assert_eq!(p.holding_period_days, 90);
    }

    #[test]
    fn risk_judge_stop_wins() {
        let mut risk = RiskPlan::placeholder("x");
        risk.stop = Some(dec!(92.50));
        let p = trade_parameters(
            &snapshot(),
            &plan(Some(dec!(99)), Some(dec!(95)), None),
            &risk,
            &ContextBlock::no_prior_context("x"),
            &DecisionConfig::default(),
        );
        assert_eq!(p.entry, dec!(99));
        assert_eq!(p.stop, dec!(92.50));
        // No plan target: 2:1 reward/risk on a 6.50 risk.
        assert_eq!(p.target, dec!(112.00));
    }

    #[test]
    fn placeholder_plan_gets_default_levels() {
        let p = trade_parameters(
            &snapshot(),
            &TradingPlan::placeholder("x"),
            &RiskPlan::placeholder("x"),
            &ContextBlock::no_prior_context("x"),
            &DecisionConfig::default(),
        );
        assert_eq!(p.entry, dec!(100.00));
        assert_eq!(p.stop, dec!(92.00));
        assert_eq!(p.target, dec!(116.00));
    }

    #[test]
    fn invalid_levels_are_replaced() {
        let p = trade_parameters(
            &snapshot(),
            &plan(None, Some(dec!(105)), Some(dec!(98))),
            &RiskPlan::placeholder("x"),
            &ContextBlock::no_prior_context("x"),
            &DecisionConfig::default(),
        );
        assert!(p.stop < p.entry);
        assert!(p.target > p.entry);
    }
}
