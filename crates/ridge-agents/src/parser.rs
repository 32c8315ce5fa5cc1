use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use ridge_models::{Report, ReportStatus, RiskPlan, RoleKind, Stance, TradingPlan};
use serde_json::Value;

use crate::backend::ToolCall;
use crate::error::AgentError;

/// Pull the first JSON object out of model output.
///
/// Accepts clean JSON, a fenced code block (with or without a language tag),
/// or an object embedded in surrounding prose.
pub fn extract_json(text: &str) -> Result<String, AgentError> {
    let trimmed = text.trim();
    let candidates = [
        Some(trimmed.to_string()).filter(|t| t.starts_with('{')),
        fenced_block(trimmed),
        first_balanced_object(trimmed),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|c| is_json_object(c))
        .ok_or_else(|| {
            AgentError::Parse(format!(
                "No valid JSON object found in response (length={})",
                text.len()
            ))
        })
}

fn is_json_object(candidate: &str) -> bool {
    matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Object(_)))
}

fn fenced_block(text: &str) -> Option<String> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    // Skip the language tag line, if any.
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim().to_string())
}

fn first_balanced_object(text: &str) -> Option<String> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if start.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| text[s..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// One turn of a bull/bear or aggressive/conservative exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct DebateTurn {
    pub stance: Stance,
    /// 0.0 to 1.0 conviction in the role's own side.
    pub conviction: f64,
    pub argument: String,
    /// The role accepts the opposing case; the debate stops.
    pub concede: bool,
    pub placeholder: bool,
}

impl DebateTurn {
    pub fn placeholder(role: RoleKind, reason: &str) -> Self {
        Self {
            stance: Stance::Neutral,
            conviction: 0.5,
            argument: format!("{role} unavailable: {reason}"),
            concede: false,
            placeholder: true,
        }
    }
}

pub fn parse_report(role: RoleKind, text: &str) -> Result<Report, AgentError> {
    let v = parse_object(text)?;
    let score = unit(&v, &["score", "confidence"])?;
    let stance = stance_field(&v).unwrap_or_else(|| Stance::from_score(score));
    Ok(Report {
        role,
        stance,
        score,
        summary: required_text(&v, &["summary", "reasoning"])?,
        key_points: strings(&v, "key_points"),
        warnings: strings(&v, "warnings"),
        status: ReportStatus::Complete,
    })
}

pub fn parse_debate_turn(text: &str) -> Result<DebateTurn, AgentError> {
    let v = parse_object(text)?;
    Ok(DebateTurn {
        stance: stance_field(&v).ok_or_else(|| missing("stance"))?,
        conviction: unit(&v, &["conviction"])?,
        argument: required_text(&v, &["argument", "reasoning"])?,
        concede: v.get("concede").and_then(Value::as_bool).unwrap_or(false),
        placeholder: false,
    })
}

pub fn parse_trading_plan(text: &str) -> Result<TradingPlan, AgentError> {
    let v = parse_object(text)?;
    Ok(TradingPlan {
        stance: stance_field(&v).ok_or_else(|| missing("stance"))?,
        conviction: unit(&v, &["conviction"])?,
        entry: price(&v, "entry"),
        stop: price(&v, "stop"),
        target: price(&v, "target"),
        holding_period_days: v
            .get("holding_period_days")
            .and_then(number)
            .filter(|d| *d >= 1.0)
            .map(|d| d.round() as u32),
        catalysts: strings(&v, "catalysts"),
        rationale: required_text(&v, &["rationale", "reasoning"])?,
        placeholder: false,
    })
}

pub fn parse_risk_plan(text: &str) -> Result<RiskPlan, AgentError> {
    let v = parse_object(text)?;
    let percent = |field: &str| v.get(field).and_then(number).filter(|p| *p >= 0.0);
    Ok(RiskPlan {
        max_drawdown_pct: percent("max_drawdown_pct"),
        volatility_pct: percent("volatility_pct"),
        suggested_position_pct: percent("suggested_position_pct"),
        stop: price(&v, "stop"),
        rationale: required_text(&v, &["rationale", "reasoning"])?,
        placeholder: false,
    })
}

/// Tool invocations listed under a `tool_calls` field, as names or `{name, arguments}` objects.
pub fn tool_calls_in(text: &str) -> Vec<ToolCall> {
    let Ok(v) = parse_object(text) else {
        return Vec::new();
    };
    let Some(calls) = v.get("tool_calls").and_then(Value::as_array) else {
        return Vec::new();
    };
    calls
        .iter()
        .filter_map(|call| match call {
            Value::String(name) => Some(ToolCall {
                name: name.clone(),
                arguments: Value::Null,
            }),
            Value::Object(_) => serde_json::from_value(call.clone()).ok(),
            _ => None,
        })
        .collect()
}

pub fn parse_stance(s: &str) -> Option<Stance> {
    match s.trim().to_ascii_lowercase().as_str() {
        "bullish" | "bull" | "buy" | "long" => Some(Stance::Bullish),
        "bearish" | "bear" | "sell" | "short" => Some(Stance::Bearish),
        "neutral" | "hold" | "wait" => Some(Stance::Neutral),
        _ => None,
    }
}

fn parse_object(text: &str) -> Result<Value, AgentError> {
    let json = extract_json(text)?;
    Ok(serde_json::from_str(&json)?)
}

fn missing(field: &str) -> AgentError {
    AgentError::Parse(format!("Missing field: {field}"))
}

/// Number or numeric string.
fn number(v: &Value) -> Option<f64> {
    let parsed: Option<f64> = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn unit(v: &Value, fields: &[&str]) -> Result<f64, AgentError> {
    let value = fields
        .iter()
        .find_map(|f| v.get(*f).and_then(number))
        .ok_or_else(|| missing(fields[0]))?;
    if !(0.0..=1.0).contains(&value) {
        return Err(AgentError::Parse(format!(
            "{} must be in [0, 1], got {value}",
            fields[0]
        )));
    }
    Ok(value)
}

fn required_text(v: &Value, fields: &[&str]) -> Result<String, AgentError> {
    fields
        .iter()
        .find_map(|f| v.get(*f).and_then(Value::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| missing(fields[0]))
}

fn strings(v: &Value, field: &str) -> Vec<String> {
    v.get(field)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn stance_field(v: &Value) -> Option<Stance> {
    v.get("stance").and_then(Value::as_str).and_then(parse_stance)
}

fn price(v: &Value, field: &str) -> Option<Decimal> {
    let parsed = match v.get(field)? {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        _ => None,
    }?;
    (parsed > Decimal::ZERO).then(|| parsed.round_dp(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn extract_clean_json() {
        let input = r#"{"score": 0.75, "summary": "test"}"#;
        assert_eq!(extract_json(input).unwrap(), input);
    }

    #[test]
    fn extract_from_markdown() {
        let input = "Here is my analysis:\n```json\n{\"score\": 0.75}\n```\nDone.";
        assert_eq!(extract_json(input).unwrap(), r#"{"score": 0.75}"#);
    }

    #[test]
    fn extract_from_markdown_no_lang() {
        let input = "Result:\n```\n{\"score\": 0.75}\n```";
        assert_eq!(extract_json(input).unwrap(), r#"{"score": 0.75}"#);
    }

    #[test]
    fn extract_with_prefix_text() {
        let input =
            "Based on the data:\n{\"score\": 0.75, \"summary\": \"bullish\"} hope that helps";
        let result = extract_json(input).unwrap();
        assert!(result.starts_with('{') && result.ends_with('}'));
        assert!(result.contains("bullish"));
    }

    #[test]
    fn extract_ignores_braces_inside_strings() {
        let input = r#"note {"summary": "range {low} to {high}", "score": 0.5} end"#;
        let parsed: Value = serde_json::from_str(&extract_json(input).unwrap()).unwrap();
        assert_eq!(parsed["score"], 0.5);
    }

    #[test]
    fn extract_no_json() {
        assert!(extract_json("This is just plain text with no JSON at all.").is_err());
        assert!(extract_json("[1, 2, 3]").is_err());
    }

    #[test]
    fn report_stance_defaults_from_score() {
        let report = parse_report(
            RoleKind::Technical,
            r#"{"score": "0.72", "summary": "RSI oversold above the 50-day",
                "key_points": ["rsi 28"]}"#,
        )
        .unwrap();
        assert_eq!(report.stance, Stance::Bullish);
        assert_eq!(report.key_points, vec!["rsi 28".to_string()]);
        assert_eq!(report.status, ReportStatus::Complete);
    }

    #[test]
    fn report_rejects_out_of_range_score() {
        let err = parse_report(RoleKind::Macro, r#"{"score": 72, "summary": "x"}"#).unwrap_err();
        assert!(matches!(err, AgentError::Parse(_)));
    }

    #[test]
    fn report_requires_summary() {
        assert!(parse_report(RoleKind::News, r#"{"score": 0.5, "summary": "  "}"#).is_err());
    }

    #[test]
    fn debate_turn_with_concession() {
        let turn = parse_debate_turn(
            r#"{"stance": "bear", "conviction": 0.2, "argument": "fair point", "concede": true}"#,
        )
        .unwrap();
        assert_eq!(turn.stance, Stance::Bearish);
        assert!(turn.concede);
        assert!(!turn.placeholder);
    }

    #[test]
    fn trading_plan_accepts_string_and_number_prices() {
        let plan = parse_trading_plan(
            r#"```json
{"stance": "bullish", "conviction": 0.6, "entry": "99.50", "stop": 93, "target": 112.004,
 "holding_period_days": 45, "catalysts": ["earnings"], "rationale": "pullback to support"}
```"#,
        )
        .unwrap();
        assert_eq!(plan.entry, Some(dec!(99.50)));
        assert_eq!(plan.stop, Some(dec!(93)));
        assert_eq!(plan.target, Some(dec!(112.00)));
        assert_eq!(plan.holding_period_days, Some(45));
        assert!(!plan.placeholder);
    }

    #[test]
    fn trading_plan_drops_non_positive_prices() {
        let plan = parse_trading_plan(
            r#"{"stance": "neutral", "conviction": 0.1, "entry": "-1", "stop": null,
                "rationale": "wait"}"#,
        )
        .unwrap();
        assert_eq!(plan.entry, None);
        assert_eq!(plan.stop, None);
    }

    #[test]
    fn risk_plan_percentages() {
        let plan = parse_risk_plan(
            r#"{"max_drawdown_pct": "7.5%", "volatility_pct": 2.1,
                "suggested_position_pct": 5, "rationale": "ok"}"#,
        )
        .unwrap();
        assert_eq!(plan.max_drawdown_pct, Some(7.5));
        assert_eq!(plan.suggested_position_pct, Some(5.0));
        assert_eq!(plan.stop, None);
    }

    #[test]
    fn tool_calls_by_name_or_object() {
        let calls = tool_calls_in(
            r#"{"score": 0.5, "tool_calls": ["historical_context",
                {"name": "snapshot_indicator", "arguments": {"name": "rsi"}}]}"#,
        );
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "historical_context");
        assert_eq!(calls[1].arguments["name"], "rsi");
        assert!(tool_calls_in("no json").is_empty());
    }
}
