//! Rule-based reasoning backend for tests.
//!
//! `ScenarioBackend` reads the snapshot out of each user prompt and applies the
//! same interpretation rules the role prompts describe, so pipeline and
//! decision tests get realistic, deterministic output without a model. Faults
//! can be injected per role to exercise retries, placeholders and barriers.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use ridge_models::{indicators, RoleKind, Snapshot, Stance};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::json;

use crate::backend::{
    Completion, CompletionRequest, ReasoningBackend, ToolCall, SNAPSHOT_INDICATOR_TOOL,
};
use crate::error::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Fail the first `n` calls, then answer normally.
    FailTimes(u32),
    AlwaysFail,
    /// Never return.
    Hang,
    /// Return whitespace only.
    Empty,
    /// Return prose with no JSON in it.
    Garbage,
    /// Answer normally after a delay.
    Slow(Duration),
}

#[derive(Default)]
pub struct ScenarioBackend {
    faults: HashMap<RoleKind, Fault>,
    calls: Mutex<HashMap<RoleKind, u32>>,
    prompts: Mutex<HashMap<RoleKind, Vec<String>>>,
}

impl ScenarioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(mut self, role: RoleKind, fault: Fault) -> Self {
        self.faults.insert(role, fault);
        self
    }

    pub fn failing(self, role: RoleKind, times: u32) -> Self {
        self.with_fault(role, Fault::FailTimes(times))
    }

    pub fn always_failing(self, role: RoleKind) -> Self {
        self.with_fault(role, Fault::AlwaysFail)
    }

    pub fn hanging(self, role: RoleKind) -> Self {
        self.with_fault(role, Fault::Hang)
    }

    /// Calls made for `role` so far.
    pub fn calls(&self, role: RoleKind) -> u32 {
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.get(&role).copied().unwrap_or(0)
    }

    /// User prompts received for `role`, oldest first.
    pub fn prompts(&self, role: RoleKind) -> Vec<String> {
        let prompts = self.prompts.lock().unwrap_or_else(|e| e.into_inner());
        prompts.get(&role).cloned().unwrap_or_default()
    }

    fn record(&self, request: &CompletionRequest) -> u32 {
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(request.role)
            .or_default()
            .push(request.user_prompt.clone());
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        let count = calls.entry(request.role).or_insert(0);
        *count += 1;
        *count
    }
}

#[async_trait]
impl ReasoningBackend for ScenarioBackend {
    fn name(&self) -> &str {
        "scenario"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, AgentError> {
        let call = self.record(request);
        match self.faults.get(&request.role) {
            Some(Fault::FailTimes(n)) if call <= *n => {
                return Err(AgentError::Cli(format!("injected failure {call}/{n}")));
            }
            Some(Fault::AlwaysFail) => {
                return Err(AgentError::Cli("injected failure".to_string()));
            }
            Some(Fault::Hang) => return std::future::pending().await,
            Some(Fault::Empty) => return Ok(Completion::text("   \n")),
            Some(Fault::Garbage) => {
                return Ok(Completion::text("I would rather not answer in JSON today."))
            }
            Some(Fault::Slow(delay)) => tokio::time::sleep(*delay).await,
            _ => {}
        }

        let prompt: serde_json::Value = serde_json::from_str(&request.user_prompt)?;
        let snapshot: Snapshot = serde_json::from_value(prompt["snapshot"].clone())?;
        let mut completion = Completion::text(respond(request.role, &snapshot));
        if request.role == RoleKind::Technical {
            completion.tool_calls.push(ToolCall {
                name: SNAPSHOT_INDICATOR_TOOL.to_string(),
                arguments: json!({ "name": indicators::RSI }),
            });
        }
        Ok(completion)
    }
}

fn respond(role: RoleKind, s: &Snapshot) -> String {
    let composite = composite_score(s);
    let value = match role {
        RoleKind::Technical
        | RoleKind::Fundamental
        | RoleKind::Sentiment
        | RoleKind::News
        | RoleKind::Macro => {
            let (score, reasons) = analyst_score(role, s);
            json!({
                "stance": stance_name(Stance::from_score(score)),
                "score": score,
                "summary": format!("Base 0.50. {}. Final: {score:.2}.", reasons.join(". ")),
                "key_points": reasons,
                "warnings": warnings(role, s),
            })
        }
        RoleKind::Bull => {
            let concede = composite < 0.35;
            json!({
                "stance": if concede { "bearish" } else { "bullish" },
                "conviction": round2(composite),
                "argument": format!("Composite read {composite:.2}; the setup rewards buyers."),
                "concede": concede,
            })
        }
        RoleKind::Bear => {
            let concede = composite > 0.7;
            json!({
                "stance": if concede { "bullish" } else { "bearish" },
                "conviction": round2(1.0 - composite),
                "argument": format!("Composite read {composite:.2}; downside is underpriced."),
                "concede": concede,
            })
        }
        RoleKind::Aggressive => json!({
            "stance": "bullish",
            "conviction": round2((composite + 0.2).min(1.0)),
            "argument": "Volatility is acceptable; take the full allowed size.",
        }),
        RoleKind::Conservative => json!({
            "stance": "bearish",
            "conviction": round2((1.2 - composite).clamp(0.0, 1.0)),
            "argument": "Keep size small until the stop is proven.",
        }),
        RoleKind::Trader => {
            let levels = plan_levels(s);
            let mut catalysts = Vec::new();
            if let Some(days) = s.indicator(indicators::DAYS_TO_EARNINGS) {
                if days <= 30.0 {
                    catalysts.push(format!("earnings in {days:.0} days"));
                }
            }
            let plan = json!({
                "stance": stance_name(Stance::from_score(composite)),
                "conviction": round2(((composite - 0.5).abs() * 2.0).clamp(0.0, 1.0)),
                "entry": levels.entry.to_string(),
                "stop": levels.stop.to_string(),
                "target": levels.target.to_string(),
                "holding_period_days": 60,
                "catalysts": catalysts,
                "rationale": format!("Composite {composite:.2} across analysts and debate."),
            });
            // Exercise fenced-block extraction.
            return format!("Here is the plan:\n```json\n{plan}\n```");
        }
        RoleKind::RiskJudge => {
            let levels = plan_levels(s);
            json!({
                "max_drawdown_pct": round2(levels.stop_distance_pct()),
                "volatility_pct": round2(s.atr_pct().unwrap_or(2.0)),
                "suggested_position_pct": round2((10.0 * composite).clamp(1.0, 10.0)),
                "stop": levels.stop.to_string(),
                "rationale": "Stop sits under support; drawdown is bounded by it.",
            })
        }
    };
    value.to_string()
}

/// Mean of the five analyst scores.
pub fn composite_score(s: &Snapshot) -> f64 {
    let analysts = RoleKind::analysts();
    let total: f64 = analysts.iter().map(|r| analyst_score(*r, s).0).sum();
    total / analysts.len() as f64
}

/// Score in [0, 1] and the adjustments that produced it.
pub fn analyst_score(role: RoleKind, s: &Snapshot) -> (f64, Vec<String>) {
    let mut score = 0.5;
    let mut reasons = Vec::new();
    let mut adjust = |delta: f64, why: String| {
        score += delta;
        reasons.push(format!("{why} ({delta:+.2})"));
    };

    match role {
        RoleKind::Technical => {
            if let Some(rsi) = s.indicator(indicators::RSI) {
                if rsi < 20.0 {
                    adjust(0.25, format!("RSI {rsi:.0} extremely oversold"));
                } else if rsi < 30.0 {
                    adjust(0.15, format!("RSI {rsi:.0} oversold"));
                } else if rsi > 80.0 {
                    adjust(-0.25, format!("RSI {rsi:.0} extremely overbought"));
                } else if rsi > 70.0 {
                    adjust(-0.15, format!("RSI {rsi:.0} overbought"));
                }
            }
            let price = s.price_f64();
            for name in [indicators::MA50, indicators::MA200] {
                if let Some(ma) = s.indicator(name) {
                    if price > ma {
                        adjust(0.05, format!("price above {name}"));
                    } else {
                        adjust(-0.05, format!("price below {name}"));
                    }
                }
            }
            if let Some(pullback) = s.pullback_pct() {
                if pullback <= 0.0 {
                    adjust(-0.05, "price at or above recent high".to_string());
                } else if (3.0..=15.0).contains(&pullback) {
                    adjust(0.05, format!("{pullback:.1}% pullback"));
                }
            }
        }
        RoleKind::Fundamental => {
            let f = &s.fundamentals;
            if f.pe_ratio.is_some_and(|pe| pe < 0.0) {
                adjust(-0.20, "negative earnings".to_string());
            } else if let Some(rel) = f.relative_pe() {
                if rel >= 2.0 {
                    adjust(-0.30, format!("relative P/E {rel:.2} extreme"));
                } else if rel >= 1.4 {
                    adjust(-0.15, format!("relative P/E {rel:.2} elevated"));
                } else if rel < 0.8 {
                    adjust(0.15, format!("relative P/E {rel:.2} cheap"));
                }
            }
            if let Some(growth) = f.best_growth_pct() {
                if growth >= 25.0 {
                    adjust(0.10, format!("growth {growth:.0}%"));
                }
            }
            if f.debt_to_equity.is_some_and(|d| d > 2.0) {
                adjust(-0.05, "leverage above 2x".to_string());
            }
        }
        RoleKind::Sentiment => {
            if s.news_sentiment != 0.0 {
                adjust(0.3 * s.news_sentiment, format!("news sentiment {:.2}", s.news_sentiment));
            }
        }
        RoleKind::News => {
            for alert in &s.alerts {
                let a = alert.to_ascii_lowercase();
                if ["upgrade", "beat", "contract"].iter().any(|k| a.contains(k)) {
                    adjust(0.10, format!("alert {alert}"));
                } else if ["downgrade", "miss", "lawsuit", "recall"].iter().any(|k| a.contains(k)) {
                    adjust(-0.10, format!("alert {alert}"));
                }
            }
            if s.news_sentiment != 0.0 {
                adjust(0.1 * s.news_sentiment, "headline tone".to_string());
            }
        }
        RoleKind::Macro => {
            if let Some(trend) = s.indicator(indicators::MARKET_TREND) {
                if trend > 0.0 {
                    adjust(0.10, "market uptrend".to_string());
                } else if trend < 0.0 {
                    adjust(-0.10, "market downtrend".to_string());
                }
            }
            if let Some(vix) = s.indicator(indicators::VIX) {
                if vix > 30.0 {
                    adjust(-0.15, format!("VIX {vix:.0}"));
                } else if vix < 15.0 {
                    adjust(0.05, format!("VIX {vix:.0}"));
                }
            }
        }
        _ => {}
    }
    if reasons.is_empty() {
        reasons.push("no decisive signals".to_string());
    }
    (score.clamp(0.0, 1.0), reasons)
}

fn warnings(role: RoleKind, s: &Snapshot) -> Vec<String> {
    let mut out = Vec::new();
    match role {
        RoleKind::Technical => {
            if s.indicator(indicators::RSI).is_some_and(|r| r > 80.0) {
                out.push("Extremely overbought - high reversal risk".to_string());
            }
            if s.pullback_pct().is_some_and(|p| p <= 0.0) {
                out.push("Price at a recent high without a pullback".to_string());
            }
        }
        RoleKind::Fundamental => {
            if s.fundamentals.relative_pe().is_some_and(|r| r >= 2.0)
                && s.fundamentals.best_growth_pct().map_or(true, |g| g < 25.0)
            {
                out.push("Extreme valuation without offsetting growth".to_string());
            }
        }
        RoleKind::Macro => {
            if s.indicator(indicators::VIX).is_some_and(|v| v > 30.0) {
                out.push("Market-wide volatility elevated".to_string());
            }
        }
        _ => {}
    }
    out
}

/// Entry, stop and target the scenario trader proposes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanLevels {
    pub entry: Decimal,
    pub stop: Decimal,
    pub target: Decimal,
}

impl PlanLevels {
    pub fn stop_distance_pct(&self) -> f64 {
        ((self.entry - self.stop) / self.entry * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0)
    }
}

/// Enter at the price (a touch under when RSI runs hot), stop 2% under support
/// within 12%, else 7% under entry, target 15% over entry.
pub fn plan_levels(s: &Snapshot) -> PlanLevels {
    let price = s.price;
    let entry = if s.indicator(indicators::RSI).is_some_and(|r| r > 60.0) {
        (price * Decimal::new(99, 2)).round_dp(2)
    } else {
        price
    };
    let fallback_stop = (entry * Decimal::new(93, 2)).round_dp(2);
    let stop = s
        .support_level()
        .map(|(_, level)| level)
        .filter(|level| *level < s.price_f64() && (s.price_f64() - level) / s.price_f64() <= 0.12)
        .and_then(|level| Decimal::from_f64(level * 0.98))
        .map(|d| d.round_dp(2))
        .filter(|stop| *stop < entry)
        .unwrap_or(fallback_stop);
    PlanLevels {
        entry,
        stop,
        target: (entry * Decimal::new(115, 2)).round_dp(2),
    }
}

fn stance_name(stance: Stance) -> &'static str {
    match stance {
        Stance::Bullish => "bullish",
        Stance::Bearish => "bearish",
        Stance::Neutral => "neutral",
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::default_tools;
    use crate::parser::{parse_report, parse_risk_plan, parse_trading_plan};
    use crate::prompts::user_prompt;
    use ridge_models::Transcript;
    use rust_decimal_macros::dec;

    fn acme() -> Snapshot {
        Snapshot::new("ACME", dec!(100.00), 72)
            .with_indicator(indicators::MA50, 95.0)
            .with_indicator(indicators::RSI, 28.0)
    }

    fn request(role: RoleKind, s: &Snapshot) -> CompletionRequest {
        CompletionRequest {
            role,
            system_prompt: String::new(),
            user_prompt: user_prompt(role, s, "no prior context", &Transcript::new(), None),
            tools: default_tools(),
        }
    }

    #[test]
    fn acme_technical_reads_oversold_above_ma50() {
        let (score, reasons) = analyst_score(RoleKind::Technical, &acme());
        assert!((score - 0.70).abs() < 1e-9);
        assert!(reasons.iter().any(|r| r.contains("oversold")));
    }

    #[test]
    fn acme_levels_sit_under_support() {
        let levels = plan_levels(&acme());
        assert_eq!(levels.entry, dec!(100.00));
        assert_eq!(levels.stop, dec!(93.10));
        assert_eq!(levels.target, dec!(115.00));
        assert!((levels.stop_distance_pct() - 6.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn answers_parse_for_every_role_family() {
        let backend = ScenarioBackend::new();
        let s = acme();

        let tech = backend.complete(&request(RoleKind::Technical, &s)).await.unwrap();
        assert_eq!(tech.tool_calls.len(), 1);
        assert!(parse_report(RoleKind::Technical, &tech.text).is_ok());

        let plan = backend.complete(&request(RoleKind::Trader, &s)).await.unwrap();
        let plan = parse_trading_plan(&plan.text).unwrap();
        assert_eq!(plan.stop, Some(dec!(93.10)));

        let risk = backend.complete(&request(RoleKind::RiskJudge, &s)).await.unwrap();
        assert!(parse_risk_plan(&risk.text).unwrap().max_drawdown_pct.is_some());
    }

    #[tokio::test]
    async fn fail_times_then_recovers() {
        let backend = ScenarioBackend::new().failing(RoleKind::News, 2);
        let s = acme();
        assert!(backend.complete(&request(RoleKind::News, &s)).await.is_err());
        assert!(backend.complete(&request(RoleKind::News, &s)).await.is_err());
        assert!(backend.complete(&request(RoleKind::News, &s)).await.is_ok());
        assert_eq!(backend.calls(RoleKind::News), 3);
        assert_eq!(backend.prompts(RoleKind::News).len(), 3);
    }
}
