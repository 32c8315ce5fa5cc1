use std::sync::Arc;
use std::time::Duration;

use ridge_models::{
    ContextBlock, DebateSummary, DegradedRole, DeliberationConfig, DeliberationResult, Report,
    RoleKind, Snapshot, Stage, Transcript, TranscriptEntry,
};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::backend::ReasoningBackend;
use crate::parser::DebateTurn;
use crate::resilient::{ResilientBackend, RetryPolicy};
use crate::roles::{Role, RoleContext, RoleOutput, RoleRunner};

/// Entries one bounded debate appended, plus how it ended.
struct DebateOutcome {
    entries: Vec<TranscriptEntry>,
    summary: DebateSummary,
    degraded: Vec<DegradedRole>,
}

/// Four-stage deliberation: parallel analysts, bull/bear debate, synthesis, risk debate.
///
/// Stage order is strict and each stage only starts once the previous one
/// reached its barrier. No stage failure aborts the run; failed roles are
/// replaced by placeholders and listed in `DeliberationResult::degraded`.
pub struct DeliberationPipeline {
    runner: Arc<RoleRunner>,
    config: DeliberationConfig,
}

impl DeliberationPipeline {
    pub fn new(backend: Arc<dyn ReasoningBackend>, config: DeliberationConfig) -> Self {
        let policy = RetryPolicy::from_config(&config);
        Self {
            runner: Arc::new(RoleRunner::new(ResilientBackend::new(backend, policy))),
            config,
        }
    }

    pub fn config(&self) -> &DeliberationConfig {
        &self.config
    }

    fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.config.stage_timeout_ms)
    }

    pub async fn run(&self, snapshot: &Snapshot, context: &ContextBlock) -> DeliberationResult {
        let start = std::time::Instant::now();
        info!(
            symbol = %snapshot.symbol,
            analysts = self.config.analysts.len(),
            "Starting deliberation"
        );

        let (reports, analyst_entries, mut degraded) =
            self.independent_analysis(snapshot, context).await;
        let transcript = Transcript::new().extended(analyst_entries);

        let debate = self
            .debate(
                (RoleKind::Bull, RoleKind::Bear),
                self.config.debate_rounds,
                &transcript,
                snapshot,
                context,
            )
            .await;
        let transcript = transcript.extended(debate.entries);
        degraded.extend(debate.degraded);

        // Trader reads everything so far; nothing after it sees raw analyst output.
        let ctx = RoleContext {
            snapshot,
            context,
            round: None,
        };
        let deadline = Instant::now() + self.stage_timeout();
        let synthesis = self
            .run_before(&Role::new(RoleKind::Trader), &transcript, &ctx, deadline)
            .await;
        record(&mut degraded, &synthesis);
        let transcript = transcript.appended(synthesis.entry.clone());
        let synthesis = synthesis.into_plan();

        let risk_view = transcript.since_stage(Stage::Synthesis);
        let risk_deadline = Instant::now() + self.stage_timeout();
        let risk_debate = self
            .debate(
                (RoleKind::Aggressive, RoleKind::Conservative),
                self.config.risk_rounds,
                &risk_view,
                snapshot,
                context,
            )
            .await;
        let risk_view = risk_view.extended(risk_debate.entries.iter().cloned());
        let transcript = transcript.extended(risk_debate.entries);
        degraded.extend(risk_debate.degraded);

        let judge = self
            .run_before(&Role::new(RoleKind::RiskJudge), &risk_view, &ctx, risk_deadline)
            .await;
        record(&mut degraded, &judge);
        let transcript = transcript.appended(judge.entry.clone());
        let risk_adjusted_plan = judge.into_risk_plan();

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            symbol = %snapshot.symbol,
            entries = transcript.len(),
            degraded = degraded.len(),
            elapsed_ms,
            "Deliberation complete"
        );

        DeliberationResult {
            snapshot: snapshot.clone(),
            transcript,
            reports,
            debate: debate.summary,
            synthesis,
            risk_debate: risk_debate.summary,
            risk_adjusted_plan,
            degraded,
            elapsed_ms,
        }
    }

    /// Fan out every configured analyst and join at the barrier.
    ///
    /// The barrier releases when all roles are done or the stage timeout hits;
    /// roles still running at that point are aborted and become placeholders.
    /// Reports come back in configured role order.
    async fn independent_analysis(
        &self,
        snapshot: &Snapshot,
        context: &ContextBlock,
    ) -> (Vec<Report>, Vec<TranscriptEntry>, Vec<DegradedRole>) {
        let stage_start = Instant::now();
        let stage_timeout = self.stage_timeout();
        let role_budget = self.runner.policy().role_budget();
        let snapshot = Arc::new(snapshot.clone());
        let context = Arc::new(context.clone());
        let roles = self.config.analysts.clone();

        let mut set = JoinSet::new();
        for (index, kind) in roles.iter().copied().enumerate() {
            let runner = Arc::clone(&self.runner);
            let snapshot = Arc::clone(&snapshot);
            let context = Arc::clone(&context);
            set.spawn(async move {
                let ctx = RoleContext {
                    snapshot: &snapshot,
                    context: &context,
                    round: None,
                };
                let role = Role::new(kind);
                let empty = Transcript::new();
                let bounded =
                    tokio::time::timeout(role_budget, runner.run_role(&role, &empty, &ctx));
                let output = match bounded.await {
                    Ok(output) => output,
                    Err(_) => RoleOutput::placeholder(
                        kind,
                        None,
                        format!("role budget of {} ms exhausted", role_budget.as_millis()),
                    ),
                };
                (index, output)
            });
        }

        let mut slots: Vec<Option<RoleOutput>> = vec![None; roles.len()];
        let deadline = stage_start + stage_timeout;
        let mut stage_timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((index, output)))) => slots[index] = Some(output),
                Ok(Some(Err(e))) => warn!(error = %e, "Analyst task failed"),
                Ok(None) => break,
                Err(_) => {
                    stage_timed_out = true;
                    set.abort_all();
                    break;
                }
            }
        }

        let missing_reason = if stage_timed_out {
            format!("independent analysis stage timed out after {} ms", stage_timeout.as_millis())
        } else {
            "analyst task failed".to_string()
        };
        let outputs: Vec<RoleOutput> = roles
            .iter()
            .zip(slots)
            .map(|(kind, slot)| {
                slot.unwrap_or_else(|| RoleOutput::placeholder(*kind, None, missing_reason.clone()))
            })
            .collect();

        let mut degraded = Vec::new();
        let mut entries = Vec::with_capacity(outputs.len());
        let mut reports = Vec::with_capacity(outputs.len());
        for output in outputs {
            record(&mut degraded, &output);
            entries.push(output.entry.clone());
            reports.push(output.into_report());
        }

        info!(
            reports = reports.len(),
            placeholders = degraded.len(),
            stage_timed_out,
            elapsed_ms = stage_start.elapsed().as_millis() as u64,
            "Independent analysis barrier reached"
        );
        (reports, entries, degraded)
    }

    /// Alternate `pro` then `con` for at most `max_rounds` rounds.
    ///
    /// Stops early when a side concedes or both sides' latest real turns hold
    /// the same stance. The stage timeout bounds the whole exchange.
    async fn debate(
        &self,
        (pro, con): (RoleKind, RoleKind),
        max_rounds: u32,
        visible: &Transcript,
        snapshot: &Snapshot,
        context: &ContextBlock,
    ) -> DebateOutcome {
        let deadline = Instant::now() + self.stage_timeout();
        let roles = [Role::new(pro), Role::new(con)];
        let mut view = visible.clone();
        let mut entries = Vec::new();
        let mut degraded = Vec::new();
        let mut summary = DebateSummary::empty(max_rounds);
        let mut latest: [Option<DebateTurn>; 2] = [None, None];

        'rounds: for round in 1..=max_rounds {
            summary.rounds_run = round;
            let ctx = RoleContext {
                snapshot,
                context,
                round: Some(round),
            };
            for (side, role) in roles.iter().enumerate() {
                let output = self.run_before(role, &view, &ctx, deadline).await;
                record(&mut degraded, &output);
                let turn = output.turn();
                view = view.appended(output.entry.clone());
                entries.push(output.entry);

                if side == 0 {
                    summary.pro_conviction = turn.conviction;
                } else {
                    summary.con_conviction = turn.conviction;
                }
                let conceded = turn.concede && !turn.placeholder;
                latest[side] = Some(turn);

                if conceded {
                    summary.converged = true;
                    break 'rounds;
                }
                if Instant::now() >= deadline {
                    warn!(role = %role.kind, round, "Debate stage deadline reached");
                    break 'rounds;
                }
            }
            if let [Some(a), Some(b)] = &latest {
                if !a.placeholder && !b.placeholder && a.stance == b.stance {
                    summary.converged = true;
                    break;
                }
            }
        }
        summary.early_exit = summary.rounds_run < max_rounds;

        info!(
            pro = %pro,
            con = %con,
            rounds_run = summary.rounds_run,
            max_rounds,
            converged = summary.converged,
            "Debate complete"
        );
        DebateOutcome {
            entries,
            summary,
            degraded,
        }
    }

    /// Run one role, or substitute a placeholder if the stage deadline passes first.
    async fn run_before(
        &self,
        role: &Role,
        transcript: &Transcript,
        ctx: &RoleContext<'_>,
        deadline: Instant,
    ) -> RoleOutput {
        let stage = role.kind.stage();
        let timed_out = || {
            RoleOutput::placeholder(
                role.kind,
                ctx.round,
                format!("{stage} stage timed out after {} ms", self.config.stage_timeout_ms),
            )
        };
        if Instant::now() >= deadline {
            return timed_out();
        }
        match tokio::time::timeout_at(deadline, self.runner.run_role(role, transcript, ctx)).await {
            Ok(output) => output,
            Err(_) => timed_out(),
        }
    }
}

/// Note a placeholder once per role.
fn record(degraded: &mut Vec<DegradedRole>, output: &RoleOutput) {
    let Some(reason) = &output.degraded else {
        return;
    };
    if degraded.iter().any(|d| d.role == output.kind) {
        return;
    }
    warn!(role = %output.kind, reason = %reason, "Role replaced by placeholder");
    degraded.push(DegradedRole {
        role: output.kind,
        stage: output.kind.stage(),
        reason: reason.clone(),
    });
}
