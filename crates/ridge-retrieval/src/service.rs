use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use ridge_models::{
    ContextBlock, ContextStatus, HistoricalMatch, OutcomeSummary, RetrievalConfig, Snapshot,
    Ticker, Verdict,
};
use ridge_store::{ContextStore, HistoricalRecord, RecordKind, SearchFilter};
use tracing::{debug, info, warn};

use crate::render::render_snapshot;

/// Score multiplier for matches whose own analysis ran degraded.
pub const DEGRADED_MATCH_DISCOUNT: f64 = 0.9;

/// Caller-supplied constraints on which history is eligible.
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilters {
    /// Only this ticker's own history.
    pub same_symbol_only: bool,
    pub exclude_symbol: Option<String>,
    pub sector: Option<String>,
    pub since: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
    /// Empty means every verdict.
    pub verdicts: Vec<Verdict>,
    /// Overrides the configured minimum recency-adjusted similarity.
    pub min_similarity: Option<f64>,
}

/// Embeds a snapshot and turns its nearest historical analyses into a bounded context block.
///
/// Never fails the caller: embedding or index failures come back as a
/// degraded block, a miss as an explicit "no prior context" block.
pub struct RetrievalService {
    store: Arc<ContextStore>,
    config: RetrievalConfig,
    embed_timeout: Duration,
}

impl RetrievalService {
    pub fn new(store: Arc<ContextStore>, config: RetrievalConfig, embed_timeout: Duration) -> Self {
        Self {
            store,
            config,
            embed_timeout,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Recency weight in `[floor, 1]` for a match `age_days` old.
    pub fn recency_weight(&self, age_days: f64) -> f64 {
        let floor = self.config.recency_floor;
        let decay = 0.5_f64.powf(age_days.max(0.0) / self.config.half_life_days);
        floor + (1.0 - floor) * decay
    }

    pub async fn retrieve(
        &self,
        snapshot: &Snapshot,
        ticker: &Ticker,
        k: usize,
        filters: &RetrievalFilters,
    ) -> ContextBlock {
        let text = render_snapshot(snapshot, ticker);
        let embedded = tokio::time::timeout(self.embed_timeout, self.store.embed(&text)).await;
        let embedding = match embedded {
            Ok(Ok(v)) => v,
            Ok(Err(e)) => {
                warn!(
                    symbol = %snapshot.symbol,
                    error = %e,
                    "Embedding failed, continuing without context"
                );
                return ContextBlock::degraded(format!("embedding failed: {e}"));
            }
            Err(_) => {
                warn!(
                    symbol = %snapshot.symbol,
                    timeout_ms = self.embed_timeout.as_millis() as u64,
                    "Embedding timed out, continuing without context"
                );
                return ContextBlock::degraded("embedding timed out");
            }
        };

        if k == 0 {
            return ContextBlock::no_prior_context("no matches requested")
                .with_query_embedding(embedding);
        }

        let search_filter = self.search_filter(snapshot, filters);
        let fetch = k.saturating_mul(self.config.oversample);
        let hits = match self.store.similarity_search(&embedding, fetch, &search_filter) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(symbol = %snapshot.symbol, error = %e, "Similarity search failed");
                return ContextBlock::degraded(format!("index query failed: {e}"))
                    .with_query_embedding(embedding);
            }
        };
        let candidates = hits.len();

        let mut scored: Vec<(HistoricalRecord, f64, f64)> = hits
            .into_iter()
            // No look-ahead when backfilling older snapshots.
            .filter(|(record, _)| record.scan_date <= snapshot.scan_date)
            .map(|(record, cosine)| {
                let age = (snapshot.scan_date - record.scan_date).num_days() as f64;
                let mut score = cosine * self.recency_weight(age);
                if record.degraded {
                    score *= DEGRADED_MATCH_DISCOUNT;
                }
                (record, cosine, score)
            })
            .collect();

        if scored.is_empty() {
            debug!(symbol = %snapshot.symbol, candidates, "No eligible history");
            return ContextBlock::no_prior_context("no comparable historical analyses")
                .with_query_embedding(embedding);
        }

        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        let best = scored[0].2;
        let min_similarity = filters.min_similarity.unwrap_or(self.config.min_similarity);
        scored.retain(|(_, _, score)| *score >= min_similarity);
        if scored.is_empty() {
            info!(symbol = %snapshot.symbol, best, min_similarity, "Only weak historical matches");
            return ContextBlock::degraded(format!(
                "only low-similarity matches (best {best:.2} < {min_similarity:.2})"
            ))
            .with_query_embedding(embedding);
        }

        let mut seen = HashSet::new();
        scored.retain(|(record, _, _)| seen.insert((record.symbol.clone(), record.scan_date)));
        scored.truncate(k);

        let matches: Vec<HistoricalMatch> = scored
            .into_iter()
            .map(|(record, cosine, score)| self.to_match(record, cosine, score))
            .collect();

        let block = self.format_block(matches, embedding);
        info!(
            symbol = %snapshot.symbol,
            candidates,
            matches = block.matches.len(),
            chars = block.rendered.len(),
            "Historical context retrieved"
        );
        block
    }

    fn search_filter(&self, snapshot: &Snapshot, filters: &RetrievalFilters) -> SearchFilter {
        SearchFilter {
            kind: Some(RecordKind::Analysis),
            symbol: filters
                .same_symbol_only
                .then(|| snapshot.symbol.clone()),
            exclude_symbol: filters.exclude_symbol.clone(),
            sector: filters.sector.clone(),
            since: filters.since,
            before: filters.before,
            verdicts: filters.verdicts.clone(),
        }
    }

    fn to_match(&self, record: HistoricalRecord, cosine: f64, score: f64) -> HistoricalMatch {
        let outcome = match self.store.outcome_for_analysis(record.analysis_id) {
            Ok(outcome) => outcome.map(|o| OutcomeSummary {
                signal_id: o.signal_id,
                realized_return_pct: o.realized_return_pct,
                thesis_validated: o.thesis_validated,
                horizon_days: o.longest_observation().map(|obs| obs.horizon.days()),
            }),
            Err(e) => {
                warn!(analysis_id = %record.analysis_id, error = %e, "Outcome lookup failed");
                None
            }
        };
        HistoricalMatch {
            analysis_id: record.analysis_id,
            symbol: record.symbol,
            scan_date: record.scan_date,
            verdict: record.verdict,
            confidence: record.confidence,
            raw_similarity: cosine,
            similarity: score,
            degraded: record.degraded,
            outcome,
        }
    }

    /// Header plus one line per match, appended until the character budget runs out.
    fn format_block(&self, matches: Vec<HistoricalMatch>, embedding: Vec<f32>) -> ContextBlock {
        let budget = self.config.max_context_chars;
        let mut kept: Vec<HistoricalMatch> = Vec::new();
        let mut body = String::new();
        for m in matches {
            let line = render_match(&m);
            kept.push(m);
            let header = render_header(&kept);
            if header.len() + body.len() + line.len() + 2 > budget && kept.len() > 1 {
                kept.pop();
                break;
            }
            body.push_str(&line);
            body.push('\n');
        }
        let header = render_header(&kept);
        let mut rendered = format!("{header}\n{body}");
        truncate_chars(&mut rendered, budget);

        ContextBlock {
            status: ContextStatus::Available,
            header,
            matches: kept,
            rendered,
            query_embedding: Some(embedding),
        }
    }
}

fn render_header(matches: &[HistoricalMatch]) -> String {
    if matches.is_empty() {
        return "Historical context: none".to_string();
    }
    let mean = matches.iter().map(|m| m.similarity).sum::<f64>() / matches.len() as f64;
    let judged: Vec<bool> = matches
        .iter()
        .filter_map(|m| m.outcome.as_ref().and_then(|o| o.thesis_validated))
        .collect();
    let returns: Vec<f64> = matches
        .iter()
        .filter_map(|m| m.outcome.as_ref().and_then(|o| o.realized_return_pct))
        .collect();
    let mut header = format!(
        "Historical context: {} similar past setups (mean similarity {mean:.2})",
        matches.len()
    );
    if judged.is_empty() {
        header.push_str("; no realized outcomes yet");
    } else {
        let wins = judged.iter().filter(|v| **v).count();
        header.push_str(&format!(
            "; thesis held {wins}/{} ({:.0}%)",
            judged.len(),
            wins as f64 / judged.len() as f64 * 100.0
        ));
    }
    if !returns.is_empty() {
        let mean_ret = returns.iter().sum::<f64>() / returns.len() as f64;
        header.push_str(&format!("; mean realized return {mean_ret:+.1}%"));
    }
    header
}

fn render_match(m: &HistoricalMatch) -> String {
    let outcome = match &m.outcome {
        None => "no signal".to_string(),
        Some(o) => match (o.realized_return_pct, o.horizon_days, o.thesis_validated) {
            (Some(r), Some(h), Some(v)) => format!(
                "{r:+.1}% after {h}d, thesis {}",
                if v { "held" } else { "failed" }
            ),
            _ => "outcome pending".to_string(),
        },
    };
    let degraded = if m.degraded { " [degraded run]" } else { "" };
    format!(
        "- {} {}: {} confidence {:.0}, similarity {:.2}; {}{}",
        m.symbol, m.scan_date, m.verdict, m.confidence, m.similarity, outcome, degraded
    )
}

fn truncate_chars(s: &mut String, max: usize) {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
    }
}
