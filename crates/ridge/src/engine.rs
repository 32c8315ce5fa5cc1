//! The `analyze()` entry point and the learning-loop write-back.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use ridge_agents::{DeliberationPipeline, ReasoningBackend};
use ridge_decision::DecisionFramework;
use ridge_models::{
    indicators, Analysis, ContextBlock, Decision, DeliberationResult, Horizon, Outcome,
    OutcomeUpdate, RidgeConfig, Signal, SignalDirection, Snapshot, Stance, Ticker,
    TradeParameters, Verdict, ANALYSIS_SCHEMA_VERSION,
};
use ridge_retrieval::{render_snapshot, RetrievalFilters, RetrievalService};
use ridge_store::{ContextStore, PendingOutcome};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EngineError;

/// A PASS backed by a bearish plan at least this convinced becomes a SELL signal.
const SELL_SIGNAL_CONVICTION: f64 = 0.7;

/// Retrieval, deliberation, decision and persistence for one ticker at a time.
///
/// Holds no per-run state: concurrent `analyze()` calls share only the store.
pub struct Engine {
    config: RidgeConfig,
    store: Arc<ContextStore>,
    retrieval: RetrievalService,
    pipeline: DeliberationPipeline,
    framework: DecisionFramework,
}

impl Engine {
    pub fn new(
        config: RidgeConfig,
        store: Arc<ContextStore>,
        backend: Arc<dyn ReasoningBackend>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let retrieval = RetrievalService::new(
            Arc::clone(&store),
            config.retrieval.clone(),
            Duration::from_millis(config.embedding.timeout_ms),
        );
        let pipeline = DeliberationPipeline::new(backend, config.deliberation.clone());
        let framework = DecisionFramework::new(config.decision.clone(), config.portfolio.clone());
        Ok(Self {
            config,
            store,
            retrieval,
            pipeline,
            framework,
        })
    }

    pub fn config(&self) -> &RidgeConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ContextStore> {
        &self.store
    }

    /// Decide BUY, WAIT or PASS for `snapshot` and record the run for future retrieval.
    ///
    /// Fails only on bad configuration or an unusable snapshot. Backend,
    /// retrieval and persistence trouble come back as notes on the Decision.
    pub async fn analyze(
        &self,
        ticker: &Ticker,
        mut snapshot: Snapshot,
    ) -> Result<Decision, EngineError> {
        self.config.validate()?;
        let invalid = |reason: String| EngineError::InvalidSnapshot {
            symbol: snapshot.symbol.clone(),
            reason,
        };
        snapshot.validate().map_err(invalid)?;
        if !ticker.symbol.eq_ignore_ascii_case(&snapshot.symbol) {
            return Err(invalid(format!("snapshot is not for ticker {}", ticker.symbol)));
        }
        snapshot.symbol = ticker.symbol.clone();
        if snapshot.sector.is_none() {
            snapshot.sector = ticker.sector.clone();
        }

        let start = Instant::now();
        let budget = Duration::from_millis(self.config.deliberation.run_timeout_ms);
        match tokio::time::timeout(budget, self.run(ticker, &snapshot, start)).await {
            Ok(decision) => Ok(decision),
            Err(_) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                warn!(
                    symbol = %snapshot.symbol,
                    elapsed_ms,
                    "Run timed out, returning PASS"
                );
                Ok(self.framework.timed_out(&snapshot, elapsed_ms))
            }
        }
    }

    async fn run(&self, ticker: &Ticker, snapshot: &Snapshot, start: Instant) -> Decision {
        let context = self
            .retrieval
            .retrieve(snapshot, ticker, self.config.retrieval.k, &RetrievalFilters::default())
            .await;
        let result = self.pipeline.run(snapshot, &context).await;
        let mut decision = self.framework.decide(&result, &context);
        self.persist(ticker, &result, &context, &mut decision).await;
        decision.processing_time_ms = start.elapsed().as_millis() as u64;

        info!(
            symbol = %decision.symbol,
            verdict = %decision.verdict,
            confidence = %decision.confidence,
            degraded = decision.degraded,
            elapsed_ms = decision.processing_time_ms,
            "Analysis complete"
        );
        decision
    }

    /// Embeds everything first, then writes. No await follows a commit, so a
    /// run cancelled by the deadline leaves nothing behind.
    async fn persist(
        &self,
        ticker: &Ticker,
        result: &DeliberationResult,
        context: &ContextBlock,
        decision: &mut Decision,
    ) {
        let rendered = render_snapshot(&result.snapshot, ticker);
        let embedding = match &context.query_embedding {
            Some(v) => v.clone(),
            None => match self.store.embed(&rendered).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(symbol = %decision.symbol, error = %e, "Analysis not stored");
                    decision.notes.push(format!("analysis not stored: {e}"));
                    return;
                }
            },
        };

        let pending_signal = match signal_direction(decision.verdict, result) {
            Some(direction) => {
                let label = pattern_label(&result.snapshot, self.config.decision.min_pullback_pct);
                let text = format!(
                    "pattern={label} direction={}\n{rendered}",
                    direction.as_str().to_lowercase()
                );
                let signal_embedding = match self.store.embed(&text).await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(
                            symbol = %decision.symbol,
                            error = %e,
                            "Signal embedding failed, reusing analysis embedding"
                        );
                        embedding.clone()
                    }
                };
                Some((direction, label, signal_embedding))
            }
            None => None,
        };

        let analysis = build_analysis(result, context, decision, embedding);
        if let Err(e) = self.store.write_analysis(&analysis) {
            warn!(symbol = %decision.symbol, error = %e, "Analysis not stored");
            decision.notes.push(format!("analysis not stored: {e}"));
            return;
        }
        decision.analysis_id = Some(analysis.id);

        let Some((direction, label, signal_embedding)) = pending_signal else {
            return;
        };
        let signal = Signal {
            id: Uuid::new_v4(),
            analysis_id: analysis.id,
            symbol: decision.symbol.clone(),
            direction,
            pattern_label: label,
            nearest_similarity: context.top_similarity().unwrap_or(0.0),
            expected_return_pct: expected_return(decision, direction),
            expected_holding_days: decision.holding_period_days,
            entry_price: decision.entry,
            created_at: Utc::now(),
            embedding: signal_embedding,
        };
        match self.store.write_signal(&signal) {
            Ok(()) => decision.signal_id = Some(signal.id),
            Err(e) => {
                warn!(symbol = %decision.symbol, error = %e, "Signal not stored");
                decision.notes.push(format!("signal not stored: {e}"));
            }
        }
    }

    // -- learning-loop hooks --

    pub fn get_outcome(&self, signal_id: Uuid) -> Result<Option<Outcome>, EngineError> {
        Ok(self.store.get_outcome(signal_id)?)
    }

    pub fn write_outcome(
        &self,
        signal_id: Uuid,
        horizon: Horizon,
        update: &OutcomeUpdate,
    ) -> Result<Outcome, EngineError> {
        Ok(self.store.write_outcome(signal_id, horizon, update)?)
    }

    pub fn pending_outcomes(&self, now: DateTime<Utc>) -> Result<Vec<PendingOutcome>, EngineError> {
        Ok(self.store.pending_outcomes(now)?)
    }
}

fn build_analysis(
    result: &DeliberationResult,
    context: &ContextBlock,
    decision: &Decision,
    embedding: Vec<f32>,
) -> Analysis {
    let mut degradations: Vec<String> = result
        .degraded
        .iter()
        .map(|d| format!("{} ({}): {}", d.role, d.stage, d.reason))
        .collect();
    if context.is_degraded() {
        degradations.push(format!("retrieval: {}", context.header));
    }
    Analysis {
        id: Uuid::new_v4(),
        schema_version: ANALYSIS_SCHEMA_VERSION,
        symbol: decision.symbol.clone(),
        scan_date: result.snapshot.scan_date,
        created_at: decision.decided_at,
        snapshot: result.snapshot.clone(),
        reports: result.reports.clone(),
        transcript: result.transcript.clone(),
        debate: result.debate.clone(),
        synthesis: result.synthesis.clone(),
        risk_debate: result.risk_debate.clone(),
        risk_plan: result.risk_adjusted_plan.clone(),
        verdict: decision.verdict,
        confidence: decision.confidence,
        gates: decision.gates.clone(),
        timing_score: decision.timing_score,
        trade: TradeParameters {
            entry: decision.entry,
            stop: decision.stop,
            target: decision.target,
            position_size_pct: decision.position_size_pct,
            holding_period_days: decision.holding_period_days,
        },
        context_status: context.status.clone(),
        degradations,
        embedding,
    }
}

/// BUY verdicts, and PASS verdicts the trader was firmly bearish on, are actionable.
fn signal_direction(verdict: Verdict, result: &DeliberationResult) -> Option<SignalDirection> {
    let plan = &result.synthesis;
    match verdict {
        Verdict::Buy => Some(SignalDirection::Buy),
        Verdict::Pass
            if !plan.placeholder
                && plan.stance == Stance::Bearish
                && plan.conviction >= SELL_SIGNAL_CONVICTION =>
        {
            Some(SignalDirection::Sell)
        }
        _ => None,
    }
}

/// Short setup name, e.g. `oversold_pullback`.
fn pattern_label(snapshot: &Snapshot, min_pullback_pct: f64) -> String {
    let regime = match snapshot.indicator(indicators::RSI) {
        Some(rsi) if rsi < 30.0 => "oversold",
        Some(rsi) if rsi > 70.0 => "overbought",
        Some(_) => "neutral",
        None => "unknown",
    };
    let price = snapshot.price_f64();
    let structure = if snapshot.pullback_pct().is_some_and(|p| p > min_pullback_pct) {
        "pullback"
    } else {
        match snapshot.indicator(indicators::MA50) {
            Some(ma) if price >= ma => "trend",
            Some(_) => "breakdown",
            None => "range",
        }
    };
    format!("{regime}_{structure}")
}

/// Expected price move to the exit in percent: the target for a BUY, the
/// stop-derived level for a SELL (negative, matching how outcomes score it).
fn expected_return(decision: &Decision, direction: SignalDirection) -> f64 {
    if decision.entry <= Decimal::ZERO {
        return 0.0;
    }
    let move_to = match direction {
        SignalDirection::Buy => decision.target - decision.entry,
        SignalDirection::Sell => decision.stop - decision.entry,
    };
    (move_to / decision.entry * Decimal::ONE_HUNDRED)
        .round_dp(2)
        .to_f64()
        .unwrap_or(0.0)
}
