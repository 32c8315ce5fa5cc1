//! The four ordered gates. Gates 1-3 pass or fail independently; gate 4 only scores.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use ridge_models::{
    indicators, ContextBlock, DecisionConfig, GateKind, GateOutcome, PortfolioConfig, RiskPlan,
    Snapshot, TradeParameters, TradingPlan,
};

/// Gate 1: valuation against sector peers and the ticker's own 5-year range.
///
/// Extreme valuation without offsetting growth hard-fails (PASS). Elevated
/// valuation without growth soft-fails (WAIT). Missing data passes neutrally.
pub fn fundamental_gate(snapshot: &Snapshot, config: &DecisionConfig) -> GateOutcome {
    let f = &snapshot.fundamentals;
    if f.is_empty() {
        return GateOutcome::pass(
            GateKind::Fundamental,
            0.5,
            vec!["no fundamentals supplied; valuation not checked".to_string()],
        );
    }

    let growth = f.best_growth_pct();
    let offset = growth.is_some_and(|g| g >= config.growth_offset_pct);
    let some_growth = growth.is_some_and(|g| g >= config.growth_offset_pct / 2.0);
    let growth_text = growth
        .map(|g| format!("growth {g:.1}%"))
        .unwrap_or_else(|| "no growth data".to_string());
    let mut reasons = Vec::new();

    if let Some(pe) = f.pe_ratio {
        if pe < 0.0 {
            if offset {
                reasons.push(format!("negative earnings offset by {growth_text}"));
                return GateOutcome::pass(GateKind::Fundamental, 0.2, reasons);
            }
            reasons.push(format!("negative earnings with {growth_text}"));
            return GateOutcome::fail(GateKind::Fundamental, reasons);
        }
    }

    let relative = f.relative_pe();
    let above_range = match (f.pe_ratio, f.pe_5y_high) {
        (Some(pe), Some(high)) if high > 0.0 => pe > high * 1.2,
        _ => false,
    };
    if let Some(rel) = relative {
        reasons.push(format!("P/E {rel:.2}x sector median"));
    }
    if above_range {
        reasons.push("P/E more than 20% above its 5-year high".to_string());
    }

    let extreme = above_range || relative.is_some_and(|r| r >= config.extreme_relative_pe);
    if extreme {
        if offset {
            reasons.push(format!("extreme valuation offset by {growth_text}"));
            return GateOutcome::pass(GateKind::Fundamental, 0.15, reasons);
        }
        reasons.push(format!("extreme valuation with {growth_text}"));
        return GateOutcome::hard_fail(GateKind::Fundamental, reasons);
    }
    if relative.is_some_and(|r| r >= config.elevated_relative_pe) && !some_growth {
        reasons.push(format!("elevated valuation with {growth_text}"));
        return GateOutcome::fail(GateKind::Fundamental, reasons);
    }

    let mut margins = Vec::new();
    if let Some(rel) = relative {
        margins.push(1.0 - rel / config.extreme_relative_pe);
    }
    if let (Some(pe), Some(low), Some(high)) = (f.pe_ratio, f.pe_5y_low, f.pe_5y_high) {
        if high > low {
            let position = ((pe - low) / (high - low)).clamp(0.0, 1.0);
            reasons.push(format!("{:.0}% of 5-year P/E range", position * 100.0));
            margins.push(1.0 - position);
        }
    }
    let margin = if margins.is_empty() {
        0.5
    } else {
        margins.iter().sum::<f64>() / margins.len() as f64
    };
    GateOutcome::pass(GateKind::Fundamental, margin, reasons)
}

/// Pullback from the recent high, percent, computed in decimal so thresholds compare exactly.
pub fn pullback_pct(snapshot: &Snapshot) -> Option<Decimal> {
    let high = Decimal::from_f64(snapshot.recent_high()?)?;
    if high <= Decimal::ZERO {
        return None;
    }
    Some((high - snapshot.price) / high * Decimal::ONE_HUNDRED)
}

/// Gate 2: pullback, support, RSI regime and the track record of similar setups.
///
/// A pullback exactly at the minimum fails. Every failure here is soft (WAIT).
pub fn technical_gate(
    snapshot: &Snapshot,
    context: &ContextBlock,
    config: &DecisionConfig,
) -> GateOutcome {
    let mut failures = Vec::new();
    let mut reasons = Vec::new();
    let mut margins = Vec::new();
    let price = snapshot.price_f64();

    match pullback_pct(snapshot) {
        Some(pullback) => {
            let minimum = Decimal::from_f64(config.min_pullback_pct).unwrap_or(Decimal::ZERO);
            if pullback <= minimum {
                failures.push(format!(
                    "pullback {:.2}% from recent high does not exceed the {}% minimum",
                    pullback, config.min_pullback_pct
                ));
            } else {
                let p = pullback.to_f64().unwrap_or(0.0);
                reasons.push(format!("{p:.2}% pullback from recent high"));
                let span = (config.min_pullback_pct * 3.0).max(1.0);
                margins.push(((p - config.min_pullback_pct) / span).clamp(0.0, 1.0));
            }
        }
        None => reasons.push("no recent high supplied; pullback not checked".to_string()),
    }

    match snapshot.support_level() {
        Some((name, level)) if level > 0.0 => {
            let floor = level * (1.0 - config.support_tolerance_pct / 100.0);
            let distance = (price - level) / level * 100.0;
            if price < floor {
                failures.push(format!(
                    "price {:.1}% below {name} support {level:.2}",
                    -distance
                ));
            } else {
                reasons.push(format!("support holds at {name} {level:.2} ({distance:+.1}%)"));
                margins.push((1.0 - distance.max(0.0) / 10.0).clamp(0.0, 1.0));
            }
        }
        _ => failures.push("no support level to confirm entry".to_string()),
    }

    if let Some(rsi) = snapshot.indicator(indicators::RSI) {
        if rsi >= config.overbought_rsi {
            failures.push(format!("RSI {rsi:.0} at or above {:.0}", config.overbought_rsi));
        } else {
            margins.push(((config.overbought_rsi - rsi) / config.overbought_rsi).clamp(0.0, 1.0));
        }
    }

    let judged = context.judged_outcomes();
    match context.success_rate() {
        Some(rate) if judged >= config.min_outcome_samples => {
            if rate <= config.success_rate_threshold {
                failures.push(format!(
                    "similar setups succeeded {:.0}% of the time ({judged} outcomes), \
                     threshold {:.0}%",
                    rate * 100.0,
                    config.success_rate_threshold * 100.0
                ));
            } else {
                reasons.push(format!("similar setups succeeded {:.0}% of the time", rate * 100.0));
                let headroom = (1.0 - config.success_rate_threshold).max(f64::EPSILON);
                margins.push(((rate - config.success_rate_threshold) / headroom).clamp(0.0, 1.0));
            }
        }
        _ => reasons.push(format!(
            "{judged} judged outcomes for similar setups; success-rate check skipped"
        )),
    }

    if !failures.is_empty() {
        return GateOutcome::fail(GateKind::TechnicalEntry, failures);
    }
    let margin = if margins.is_empty() {
        0.5
    } else {
        margins.iter().sum::<f64>() / margins.len() as f64
    };
    GateOutcome::pass(GateKind::TechnicalEntry, margin, reasons)
}

/// Gate 3 result plus the sizing limits it implies.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskAssessment {
    pub outcome: GateOutcome,
    /// Worse of the risk judge's modeled drawdown and the stop distance, percent.
    pub drawdown_pct: f64,
    /// Largest position the drawdown and portfolio limits allow, percent of portfolio.
    pub position_cap_pct: f64,
}

/// Gate 3: modeled drawdown against the ceiling, position against portfolio limits.
///
/// Drawdown above the ceiling hard-fails (PASS).
pub fn risk_gate(
    risk_plan: &RiskPlan,
    params: &TradeParameters,
    config: &DecisionConfig,
    portfolio: &PortfolioConfig,
) -> RiskAssessment {
    let stop_distance = if params.entry > Decimal::ZERO {
        ((params.entry - params.stop) / params.entry * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0)
    } else {
        0.0
    };
    let drawdown = risk_plan.max_drawdown_pct.unwrap_or(0.0).max(stop_distance);

    let mut cap = portfolio.max_position_pct;
    if drawdown > 0.0 {
        cap = cap.min(portfolio.max_portfolio_risk_pct * 100.0 / drawdown);
    }
    if let Some(suggested) = risk_plan.suggested_position_pct.filter(|s| *s > 0.0) {
        cap = cap.min(suggested);
    }

    let mut reasons = vec![format!(
        "modeled drawdown {drawdown:.1}% (stop distance {stop_distance:.1}%), ceiling {:.1}%",
        config.drawdown_ceiling_pct
    )];
    if risk_plan.placeholder {
        reasons.push("risk judge unavailable; drawdown from stop distance only".to_string());
    }

    let outcome = if drawdown > config.drawdown_ceiling_pct {
        GateOutcome::hard_fail(GateKind::Risk, reasons)
    } else {
        reasons.push(format!("position capped at {cap:.2}% of portfolio"));
        GateOutcome::pass(GateKind::Risk, 1.0 - drawdown / config.drawdown_ceiling_pct, reasons)
    };
    RiskAssessment {
        outcome,
        drawdown_pct: drawdown,
        position_cap_pct: cap.max(0.0),
    }
}

/// Gate 4: 0-100 timing score. Always passes; a low score only lowers confidence.
pub fn timing_gate(snapshot: &Snapshot, plan: &TradingPlan) -> GateOutcome {
    let mut score = 50.0;
    let mut reasons = Vec::new();
    let mut adjust = |delta: f64, why: String| {
        score += delta;
        reasons.push(format!("{why} ({delta:+.0})"));
    };

    let priority = f64::from(snapshot.priority_score);
    adjust((priority - 50.0) * 0.3, format!("scanner priority {priority:.0}"));

    if let Some(days) = snapshot.indicator(indicators::DAYS_TO_EARNINGS) {
        if days <= 5.0 {
            adjust(-10.0, format!("earnings in {days:.0} days"));
        } else if days <= 30.0 {
            adjust(10.0, format!("earnings catalyst in {days:.0} days"));
        }
    }
    if !plan.catalysts.is_empty() {
        adjust(5.0, format!("{} plan catalysts", plan.catalysts.len()));
    }

    if let Some(rsi) = snapshot.indicator(indicators::RSI) {
        if rsi < 30.0 {
            adjust(10.0, format!("RSI {rsi:.0} oversold"));
        } else if rsi > 70.0 {
            adjust(-10.0, format!("RSI {rsi:.0} extended"));
        } else if rsi < 60.0 {
            adjust(5.0, format!("RSI {rsi:.0} neutral"));
        }
    }

    if let Some(ma50) = snapshot.indicator(indicators::MA50).filter(|m| *m > 0.0) {
        let momentum = (snapshot.price_f64() / ma50 - 1.0) * 100.0;
        if momentum > 10.0 {
            adjust(-10.0, format!("{momentum:.1}% above ma50; waiting costs little"));
        } else if momentum >= 0.0 {
            adjust(5.0, format!("{momentum:.1}% above ma50"));
        } else if momentum < -5.0 {
            adjust(-5.0, format!("{:.1}% below ma50", -momentum));
        }
    }

    let score = score.clamp(0.0, 100.0);
    GateOutcome {
        score: Some(score),
        ..GateOutcome::pass(GateKind::Timing, score / 100.0, reasons)
    }
}
