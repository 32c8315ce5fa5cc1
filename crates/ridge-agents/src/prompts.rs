use ridge_models::{RoleKind, Snapshot, Transcript};

use crate::backend::ToolSpec;

fn pretty(value: serde_json::Value) -> String {
    serde_json::to_string_pretty(&value).unwrap_or_default()
}

fn report_schema() -> String {
    pretty(serde_json::json!({
        "stance": "bullish | bearish | neutral",
        "score": 0.65,
        "summary": "<concise analysis with score adjustments>",
        "key_points": ["<evidence>"],
        "warnings": ["<explicit risk warnings>"],
        "tool_calls": ["<optional: tools you consulted>"]
    }))
}

fn debate_schema() -> String {
    pretty(serde_json::json!({
        "stance": "bullish | bearish | neutral",
        "conviction": 0.7,
        "argument": "<your rebuttal and case>",
        "concede": false
    }))
}

fn plan_schema() -> String {
    pretty(serde_json::json!({
        "stance": "bullish | bearish | neutral",
        "conviction": 0.6,
        "entry": "99.50",
        "stop": "93.00",
        "target": "112.00",
        "holding_period_days": 60,
        "catalysts": ["<dated catalysts>"],
        "rationale": "<why this plan>"
    }))
}

fn risk_schema() -> String {
    pretty(serde_json::json!({
        "max_drawdown_pct": 7.0,
        "volatility_pct": 2.1,
        "suggested_position_pct": 5.0,
        "stop": "93.00",
        "rationale": "<risk framing>"
    }))
}

const PREAMBLE: &str = "You are one role in RIDGE, an investment-decision engine that \
    turns a point-in-time scan of a security into a BUY/WAIT/PASS recommendation. \
    The user message is a JSON document with `snapshot` (price, volume, named \
    indicators, fundamentals, news_sentiment in [-1, 1], priority_score 0-100, alerts), \
    `historical_context` (similar past analyses with realized outcomes, or the marker \
    \"no prior context\") and `transcript` (what earlier roles said).";

fn analyst_rules(role: RoleKind) -> &'static str {
    match role {
        RoleKind::Technical => {
            "## INTERPRETATION RULES\n\n\
             Start with score 0.50 and apply adjustments:\n\
             - rsi < 30: oversold, +0.15 (rsi < 20: +0.25)\n\
             - rsi > 70: overbought, -0.15 (rsi > 80: -0.25, warn \"extremely overbought\")\n\
             - price above ma50: +0.05; below: -0.05. Same for ma200.\n\
             - pullback from recent_high between 3% and 15%: +0.05; \
             price at or above recent_high: -0.05\n\
             - volume > 1.5x avg_volume on an up move: +0.05\n\
             Warn when price sits at a recent high without a pullback."
        }
        RoleKind::Fundamental => {
            "## INTERPRETATION RULES\n\n\
             Start with score 0.50 and apply adjustments:\n\
             - pe_ratio / sector_median_pe < 0.8: cheap, +0.15\n\
             - relative P/E >= 1.4: elevated, -0.15; >= 2.0: extreme, -0.30\n\
             - revenue or EPS growth >= 25%: +0.10 (offsets an elevated multiple)\n\
             - negative pe_ratio (losses): -0.20\n\
             - debt_to_equity > 2: -0.05\n\
             Warn on extreme valuation without offsetting growth."
        }
        RoleKind::Sentiment => {
            "## INTERPRETATION RULES\n\n\
             Start with score 0.50 and add 0.30 x news_sentiment.\n\
             Treat alerts like \"upgrade\" or \"short_squeeze\" as crowd positioning, \
             not fundamentals.\n\
             Warn when sentiment is uniformly negative (news_sentiment < -0.5)."
        }
        RoleKind::News => {
            "## INTERPRETATION RULES\n\n\
             Start with score 0.50. Each alert mentioning an upgrade, beat or contract: +0.10. \
             Each alert mentioning a downgrade, miss, lawsuit or recall: -0.10. \
             Add 0.10 x news_sentiment.\n\
             Note days_to_earnings when it is under 30 days; it is a catalyst and a risk."
        }
        RoleKind::Macro => {
            "## INTERPRETATION RULES\n\n\
             Start with score 0.50 and apply adjustments:\n\
             - market_trend > 0: +0.10; < 0: -0.10\n\
             - vix < 15: +0.05; vix > 30: -0.15 and warn about market-wide volatility\n\
             Judge the environment, not the company."
        }
        _ => "",
    }
}

/// System prompt for one role, including its response schema.
pub fn system_prompt(role: RoleKind) -> String {
    match role {
        RoleKind::Technical
        | RoleKind::Fundamental
        | RoleKind::Sentiment
        | RoleKind::News
        | RoleKind::Macro => format!(
            "{PREAMBLE}\n\nYou are the {role} analyst. Work independently: the transcript is empty \
             at your stage.\n\n{}\n\n\
             Clamp the score to [0.0, 1.0]; 0 is strongly bearish, 1 strongly bullish.\n\
             You MUST respond with ONLY a JSON object matching this schema:\n{}",
            analyst_rules(role),
            report_schema()
        ),
        RoleKind::Bull | RoleKind::Bear => {
            let (side, opponent) = if role == RoleKind::Bull {
                ("the case FOR buying", "bear")
            } else {
                ("the case AGAINST buying", "bull")
            };
            format!(
                "{PREAMBLE}\n\nYou are the {role} researcher in a bounded debate. Argue {side} \
                 using the analyst reports and historical context, and rebut the {opponent}'s \
                 latest turn in the transcript. Report your conviction honestly. If the \
                 {opponent}'s case is clearly stronger, set concede to true; \
                 the debate then ends.\n\n\
                 You MUST respond with ONLY a JSON object matching this schema:\n{}",
                debate_schema()
            )
        }
        RoleKind::Trader => format!(
            "{PREAMBLE}\n\nYou are the trader. Read every analyst report and the full debate, \
             then draft ONE trading plan. Entry must not exceed the current price, stop must be \
             below entry and target above it. Weigh how similar past setups actually played \
             out in historical_context. All prices are quoted decimal strings.\n\n\
             You MUST respond with ONLY a JSON object matching this schema:\n{}",
            plan_schema()
        ),
        RoleKind::Aggressive | RoleKind::Conservative => {
            let framing = if role == RoleKind::Aggressive {
                "Argue for taking the full position the plan allows and for wider stops when \
                 volatility justifies them."
            } else {
                "Argue for capital preservation: smaller size, tighter stops, and waiting when \
                 drawdown risk is high."
            };
            format!(
                "{PREAMBLE}\n\nYou are the {role} risk analyst. You only see the trader's plan \
                 and the risk discussion, never raw analyst reports. {framing}\n\n\
                 You MUST respond with ONLY a JSON object matching this schema:\n{}",
                debate_schema()
            )
        }
        RoleKind::RiskJudge => format!(
            "{PREAMBLE}\n\nYou are the risk judge. Weigh the aggressive and conservative \
             arguments about the trader's plan and emit the risk-adjusted plan: modeled \
             worst-case drawdown and daily volatility in percent, the position you would \
             allow as percent of portfolio, and a stop price.\n\n\
             You MUST respond with ONLY a JSON object matching this schema:\n{}",
            risk_schema()
        ),
    }
}

/// JSON user message: snapshot, retrieved context and the transcript view this role may read.
pub fn user_prompt(
    role: RoleKind,
    snapshot: &Snapshot,
    historical_context: &str,
    transcript: &Transcript,
    round: Option<u32>,
) -> String {
    pretty(serde_json::json!({
        "role": role,
        "round": round,
        "snapshot": snapshot,
        "historical_context": historical_context,
        "transcript": transcript.render(),
    }))
}

/// Tool list for backends without a native tool channel.
pub fn tools_section(tools: &[ToolSpec]) -> String {
    let mut out = String::from(
        "## TOOLS\n\nYou may consult these tools. \
         List the ones you used in a `tool_calls` array.\n",
    );
    for tool in tools {
        out.push_str(&format!("- {}: {}\n", tool.name, tool.description));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::default_tools;
    use ridge_models::TranscriptEntry;
    use rust_decimal_macros::dec;

    const ALL_ROLES: [RoleKind; 11] = [
        RoleKind::Technical,
        RoleKind::Fundamental,
        RoleKind::Sentiment,
        RoleKind::News,
        RoleKind::Macro,
        RoleKind::Bull,
        RoleKind::Bear,
        RoleKind::Trader,
        RoleKind::Aggressive,
        RoleKind::Conservative,
        RoleKind::RiskJudge,
    ];

    #[test]
    fn every_role_prompt_carries_a_schema() {
        for role in ALL_ROLES {
            let prompt = system_prompt(role);
            assert!(prompt.contains("ONLY a JSON object"), "no schema for {role}");
            assert!(prompt.contains("RIDGE"), "no preamble for {role}");
        }
    }

    #[test]
    fn analyst_prompts_contain_interpretation_rules() {
        for role in RoleKind::analysts() {
            assert!(system_prompt(*role).contains("INTERPRETATION RULES"));
        }
        assert!(system_prompt(RoleKind::Technical).contains("rsi < 30"));
        assert!(system_prompt(RoleKind::Fundamental).contains("relative P/E"));
    }

    #[test]
    fn debate_prompts_explain_concession() {
        assert!(system_prompt(RoleKind::Bull).contains("concede"));
        assert!(system_prompt(RoleKind::Bear).contains("AGAINST"));
        assert!(system_prompt(RoleKind::Conservative).contains("never raw analyst reports"));
    }

    #[test]
    fn user_prompt_embeds_snapshot_and_transcript() {
        let snapshot = Snapshot::new("ACME", dec!(100.00), 72);
        let transcript =
            Transcript::new().appended(TranscriptEntry::new(RoleKind::Technical, "rsi oversold"));
        let prompt =
            user_prompt(RoleKind::Bull, &snapshot, "no prior context", &transcript, Some(1));
        let v: serde_json::Value = serde_json::from_str(&prompt).unwrap();
        assert_eq!(v["role"], "bull");
        assert_eq!(v["round"], 1);
        let parsed: Snapshot = serde_json::from_value(v["snapshot"].clone()).unwrap();
        assert_eq!(parsed, snapshot);
        assert!(v["transcript"].as_str().unwrap().contains("rsi oversold"));
    }

    #[test]
    fn tools_section_lists_tools() {
        let section = tools_section(&default_tools());
        assert!(section.contains("historical_context"));
        assert!(section.contains("snapshot_indicator"));
    }
}
