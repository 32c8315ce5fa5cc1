use ridge_models::{
    ContextBlock, Report, RiskPlan, RoleKind, Snapshot, Stage, TradingPlan, Transcript,
    TranscriptEntry,
};

use crate::backend::{default_tools, CompletionRequest};
use crate::error::AgentError;
use crate::parser::{
    parse_debate_turn, parse_report, parse_risk_plan, parse_trading_plan, DebateTurn,
};
use crate::prompts::{system_prompt, user_prompt};
use crate::resilient::{ResilientBackend, RetryPolicy};

/// A reasoning role: which kind it is and the prompt it runs with.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub kind: RoleKind,
    pub prompt: String,
}

impl Role {
    pub fn new(kind: RoleKind) -> Self {
        Self {
            kind,
            prompt: system_prompt(kind),
        }
    }
}

/// What a role reads besides the transcript.
#[derive(Debug, Clone, Copy)]
pub struct RoleContext<'a> {
    pub snapshot: &'a Snapshot,
    pub context: &'a ContextBlock,
    /// Debate round, 1-based.
    pub round: Option<u32>,
}

/// Typed output, one variant per role family.
#[derive(Debug, Clone, PartialEq)]
pub enum RolePayload {
    Report(Report),
    Turn(DebateTurn),
    Plan(TradingPlan),
    Risk(RiskPlan),
}

/// A role's transcript entry and payload. `degraded` holds the reason when it is a placeholder.
#[derive(Debug, Clone)]
pub struct RoleOutput {
    pub kind: RoleKind,
    pub entry: TranscriptEntry,
    pub payload: RolePayload,
    pub degraded: Option<String>,
}

impl RoleOutput {
    /// Neutral stand-in for a role that produced nothing usable.
    pub fn placeholder(kind: RoleKind, round: Option<u32>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let payload = match kind.stage() {
            Stage::IndependentAnalysis => RolePayload::Report(Report::placeholder(kind, &reason)),
            Stage::Synthesis => RolePayload::Plan(TradingPlan::placeholder(&reason)),
            Stage::RiskDebate if kind == RoleKind::RiskJudge => {
                RolePayload::Risk(RiskPlan::placeholder(&reason))
            }
            Stage::Debate | Stage::RiskDebate => {
                RolePayload::Turn(DebateTurn::placeholder(kind, &reason))
            }
        };
        let mut entry = TranscriptEntry::new(kind, format!("{kind} unavailable: {reason}"))
            .as_placeholder();
        entry.round = round;
        Self {
            kind,
            entry,
            payload,
            degraded: Some(reason),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.degraded.is_some()
    }

    pub fn into_report(self) -> Report {
        match self.payload {
            RolePayload::Report(r) => r,
            _ => Report::placeholder(self.kind, "no report produced"),
        }
    }

    pub fn turn(&self) -> DebateTurn {
        match &self.payload {
            RolePayload::Turn(t) => t.clone(),
            _ => DebateTurn::placeholder(self.kind, "no debate turn produced"),
        }
    }

    pub fn into_plan(self) -> TradingPlan {
        match self.payload {
            RolePayload::Plan(p) => p,
            _ => TradingPlan::placeholder("no plan produced"),
        }
    }

    pub fn into_risk_plan(self) -> RiskPlan {
        match self.payload {
            RolePayload::Risk(r) => r,
            _ => RiskPlan::placeholder("no risk plan produced"),
        }
    }
}

fn parse_payload(kind: RoleKind, text: &str) -> Result<RolePayload, AgentError> {
    Ok(match kind.stage() {
        Stage::IndependentAnalysis => RolePayload::Report(parse_report(kind, text)?),
        Stage::Synthesis => RolePayload::Plan(parse_trading_plan(text)?),
        Stage::RiskDebate if kind == RoleKind::RiskJudge => {
            RolePayload::Risk(parse_risk_plan(text)?)
        }
        Stage::Debate | Stage::RiskDebate => RolePayload::Turn(parse_debate_turn(text)?),
    })
}

fn entry_for(kind: RoleKind, payload: &RolePayload) -> TranscriptEntry {
    match payload {
        RolePayload::Report(r) => {
            let mut content = r.summary.clone();
            for point in &r.key_points {
                content.push_str(&format!("; {point}"));
            }
            for warning in &r.warnings {
                content.push_str(&format!("; WARNING: {warning}"));
            }
            TranscriptEntry::new(kind, content).with_position(r.stance, r.score)
        }
        RolePayload::Turn(t) => {
            let content = if t.concede {
                format!("{} (concedes)", t.argument)
            } else {
                t.argument.clone()
            };
            TranscriptEntry::new(kind, content).with_position(t.stance, t.conviction)
        }
        RolePayload::Plan(p) => {
            let levels = format!(
                "entry={} stop={} target={}",
                fmt_price(p.entry),
                fmt_price(p.stop),
                fmt_price(p.target)
            );
            TranscriptEntry::new(kind, format!("{} [{levels}]", p.rationale))
                .with_position(p.stance, p.conviction)
        }
        RolePayload::Risk(r) => {
            let drawdown = r
                .max_drawdown_pct
                .map(|d| format!("{d:.1}%"))
                .unwrap_or_else(|| "n/a".to_string());
            TranscriptEntry::new(kind, format!("{} [max drawdown {drawdown}]", r.rationale))
        }
    }
}

fn fmt_price(p: Option<rust_decimal::Decimal>) -> String {
    p.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Single dispatch point for every role.
pub struct RoleRunner {
    backend: ResilientBackend,
}

impl RoleRunner {
    pub fn new(backend: ResilientBackend) -> Self {
        Self { backend }
    }

    pub fn policy(&self) -> &RetryPolicy {
        self.backend.policy()
    }

    /// Run one role against the transcript view it is allowed to read.
    /// Never fails: exhausted retries come back as a placeholder output.
    pub async fn run_role(
        &self,
        role: &Role,
        transcript: &Transcript,
        ctx: &RoleContext<'_>,
    ) -> RoleOutput {
        let kind = role.kind;
        let request = CompletionRequest {
            role: kind,
            system_prompt: role.prompt.clone(),
            user_prompt: user_prompt(
                kind,
                ctx.snapshot,
                &ctx.context.rendered,
                transcript,
                ctx.round,
            ),
            tools: default_tools(),
        };

        match self
            .backend
            .call(&request, |c| parse_payload(kind, &c.text))
            .await
        {
            Ok(attempt) => {
                let mut entry = entry_for(kind, &attempt.value);
                entry.round = ctx.round;
                entry.tool_calls = attempt
                    .completion
                    .tool_calls
                    .iter()
                    .map(|t| t.name.clone())
                    .collect();
                RoleOutput {
                    kind,
                    entry,
                    payload: attempt.value,
                    degraded: None,
                }
            }
            Err(exhausted) => RoleOutput::placeholder(kind, ctx.round, exhausted.reason),
        }
    }
}
