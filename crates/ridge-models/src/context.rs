use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analysis::Verdict;

/// Marker text carried by every block without usable history.
pub const NO_PRIOR_CONTEXT: &str = "no prior context";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContextStatus {
    Available,
    /// Nothing similar exists yet. Not a failure.
    NoPriorContext,
    /// Retrieval failed or only found weak matches; downstream confidence is discounted.
    Degraded { reason: String },
}

/// Realized performance of a historical match's signal, when known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutcomeSummary {
    pub signal_id: Uuid,
    pub realized_return_pct: Option<f64>,
    pub thesis_validated: Option<bool>,
    /// Longest horizon observed so far, days.
    pub horizon_days: Option<u32>,
}

/// One retrieved historical analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalMatch {
    pub analysis_id: Uuid,
    pub symbol: String,
    pub scan_date: NaiveDate,
    pub verdict: Verdict,
    /// 0-100.
    pub confidence: f64,
    /// Raw cosine similarity.
    pub raw_similarity: f64,
    /// Recency-adjusted similarity. Matches are ordered by this.
    pub similarity: f64,
    /// The historical analysis itself ran degraded.
    pub degraded: bool,
    pub outcome: Option<OutcomeSummary>,
}

/// Bounded historical context injected into deliberation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextBlock {
    pub status: ContextStatus,
    pub header: String,
    pub matches: Vec<HistoricalMatch>,
    /// Text handed to the reasoning roles.
    pub rendered: String,
    /// Embedding of the query snapshot, reused when the analysis is persisted.
    #[serde(skip)]
    pub query_embedding: Option<Vec<f32>>,
}

impl ContextBlock {
    pub fn no_prior_context(detail: &str) -> Self {
        let header = format!("{NO_PRIOR_CONTEXT}: {detail}");
        Self {
            status: ContextStatus::NoPriorContext,
            rendered: header.clone(),
            header,
            matches: Vec::new(),
            query_embedding: None,
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let header = format!("{NO_PRIOR_CONTEXT} (retrieval degraded: {reason})");
        Self {
            status: ContextStatus::Degraded { reason },
            rendered: header.clone(),
            header,
            matches: Vec::new(),
            query_embedding: None,
        }
    }

    pub fn with_query_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.query_embedding = Some(embedding);
        self
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, ContextStatus::Degraded { .. })
    }

    pub fn has_context(&self) -> bool {
        self.status == ContextStatus::Available && !self.matches.is_empty()
    }

    /// Matches whose thesis has been judged.
    pub fn judged_outcomes(&self) -> usize {
        self.matches
            .iter()
            .filter(|m| {
                m.outcome
                    .as_ref()
                    .and_then(|o| o.thesis_validated)
                    .is_some()
            })
            .count()
    }

    /// Fraction of judged similar setups whose thesis held.
    pub fn success_rate(&self) -> Option<f64> {
        let judged: Vec<bool> = self
            .matches
            .iter()
            .filter_map(|m| m.outcome.as_ref().and_then(|o| o.thesis_validated))
            .collect();
        if judged.is_empty() {
            return None;
        }
        let wins = judged.iter().filter(|v| **v).count();
        Some(wins as f64 / judged.len() as f64)
    }

    pub fn mean_realized_return(&self) -> Option<f64> {
        let returns: Vec<f64> = self
            .matches
            .iter()
            .filter_map(|m| m.outcome.as_ref().and_then(|o| o.realized_return_pct))
            .collect();
        if returns.is_empty() {
            None
        } else {
            Some(returns.iter().sum::<f64>() / returns.len() as f64)
        }
    }

    pub fn top_similarity(&self) -> Option<f64> {
        self.matches.first().map(|m| m.similarity)
    }

    /// Median horizon of matches with known outcomes, days.
    pub fn median_outcome_horizon(&self) -> Option<u32> {
        let mut horizons: Vec<u32> = self
            .matches
            .iter()
            .filter_map(|m| m.outcome.as_ref().and_then(|o| o.horizon_days))
            .collect();
        if horizons.is_empty() {
            return None;
        }
        horizons.sort_unstable();
        Some(horizons[horizons.len() / 2])
    }
}
