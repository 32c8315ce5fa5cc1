use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IndependentAnalysis,
    Debate,
    Synthesis,
    RiskDebate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::IndependentAnalysis => "independent_analysis",
            Stage::Debate => "debate",
            Stage::Synthesis => "synthesis",
            Stage::RiskDebate => "risk_debate",
        };
        f.write_str(name)
    }
}

/// The closed set of reasoning roles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    Technical,
    Fundamental,
    Sentiment,
    News,
    Macro,
    Bull,
    Bear,
    Trader,
    Aggressive,
    Conservative,
    RiskJudge,
}

impl RoleKind {
    const ANALYSTS: [RoleKind; 5] = [
        RoleKind::Technical,
        RoleKind::Fundamental,
        RoleKind::Sentiment,
        RoleKind::News,
        RoleKind::Macro,
    ];

    pub fn analysts() -> &'static [RoleKind] {
        &Self::ANALYSTS
    }

    pub fn name(&self) -> &'static str {
        match self {
            RoleKind::Technical => "technical",
            RoleKind::Fundamental => "fundamental",
            RoleKind::Sentiment => "sentiment",
            RoleKind::News => "news",
            RoleKind::Macro => "macro",
            RoleKind::Bull => "bull",
            RoleKind::Bear => "bear",
            RoleKind::Trader => "trader",
            RoleKind::Aggressive => "aggressive",
            RoleKind::Conservative => "conservative",
            RoleKind::RiskJudge => "risk_judge",
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            RoleKind::Technical
            | RoleKind::Fundamental
            | RoleKind::Sentiment
            | RoleKind::News
            | RoleKind::Macro => Stage::IndependentAnalysis,
            RoleKind::Bull | RoleKind::Bear => Stage::Debate,
            RoleKind::Trader => Stage::Synthesis,
            RoleKind::Aggressive | RoleKind::Conservative | RoleKind::RiskJudge => {
                Stage::RiskDebate
            }
        }
    }

    pub fn is_analyst(&self) -> bool {
        self.stage() == Stage::IndependentAnalysis
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl Stance {
    /// Map a 0..1 bullishness score onto a stance with a neutral band around 0.5.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.6 {
            Stance::Bullish
        } else if score <= 0.4 {
            Stance::Bearish
        } else {
            Stance::Neutral
        }
    }
}

/// One appended line of deliberation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptEntry {
    pub stage: Stage,
    pub role: RoleKind,
    /// Debate round (1-based). None outside debate stages.
    pub round: Option<u32>,
    pub content: String,
    pub stance: Option<Stance>,
    /// 0.0 to 1.0.
    pub conviction: Option<f64>,
    /// Names of tools the backend asked for while producing this entry.
    #[serde(default)]
    pub tool_calls: Vec<String>,
    /// True when the backend failed and a neutral stand-in was substituted.
    pub placeholder: bool,
    pub recorded_at: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn new(role: RoleKind, content: impl Into<String>) -> Self {
        Self {
            stage: role.stage(),
            role,
            round: None,
            content: content.into(),
            stance: None,
            conviction: None,
            tool_calls: Vec::new(),
            placeholder: false,
            recorded_at: Utc::now(),
        }
    }

    pub fn in_round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }

    pub fn with_position(mut self, stance: Stance, conviction: f64) -> Self {
        self.stance = Some(stance);
        self.conviction = Some(conviction.clamp(0.0, 1.0));
        self
    }

    pub fn as_placeholder(mut self) -> Self {
        self.placeholder = true;
        self
    }
}

/// Append-only deliberation log.
///
/// Stages never mutate a transcript they were handed; they return a new one
/// with their entries appended, so concurrent readers always see a stable view.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn appended(&self, entry: TranscriptEntry) -> Transcript {
        self.extended(std::iter::once(entry))
    }

    pub fn extended(&self, entries: impl IntoIterator<Item = TranscriptEntry>) -> Transcript {
        let mut next = self.entries.clone();
        next.extend(entries);
        Transcript { entries: next }
    }

    /// Entries from `stage` onward. Later stages use this to hide raw analyst output.
    pub fn since_stage(&self, stage: Stage) -> Transcript {
        Transcript {
            entries: self
                .entries
                .iter()
                .filter(|e| e.stage >= stage)
                .cloned()
                .collect(),
        }
    }

    pub fn stage_entries(&self, stage: Stage) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter().filter(move |e| e.stage == stage)
    }

    pub fn last_by(&self, role: RoleKind) -> Option<&TranscriptEntry> {
        self.entries.iter().rev().find(|e| e.role == role)
    }

    pub fn placeholder_count(&self) -> usize {
        self.entries.iter().filter(|e| e.placeholder).count()
    }

    /// Plain-text rendering fed to the reasoning backend.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let round = entry
                .round
                .map(|r| format!(" round {r}"))
                .unwrap_or_default();
            let marker = if entry.placeholder { " (unavailable)" } else { "" };
            out.push_str(&format!(
                "[{}:{}{}{}] {}\n",
                entry.stage, entry.role, round, marker, entry.content
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appended_leaves_original_untouched() {
        let base = Transcript::new().appended(TranscriptEntry::new(RoleKind::Technical, "ok"));
        let next = base.appended(TranscriptEntry::new(RoleKind::Bull, "buy it").in_round(1));
        assert_eq!(base.len(), 1);
        assert_eq!(next.len(), 2);
        assert_eq!(next.entries()[1].stage, Stage::Debate);
    }

    #[test]
    fn since_stage_hides_earlier_stages() {
        let t = Transcript::new()
            .appended(TranscriptEntry::new(RoleKind::News, "headline"))
            .appended(TranscriptEntry::new(RoleKind::Bear, "too rich").in_round(1))
            .appended(TranscriptEntry::new(RoleKind::Trader, "plan"));
        let view = t.since_stage(Stage::Synthesis);
        assert_eq!(view.len(), 1);
        assert_eq!(view.entries()[0].role, RoleKind::Trader);
    }

    #[test]
    fn render_marks_placeholders() {
        let t = Transcript::new()
            .appended(TranscriptEntry::new(RoleKind::Macro, "no data").as_placeholder());
        let text = t.render();
        assert!(text.contains("[independent_analysis:macro (unavailable)]"));
        assert_eq!(t.placeholder_count(), 1);
    }

    #[test]
    fn stance_bands() {
        assert_eq!(Stance::from_score(0.75), Stance::Bullish);
        assert_eq!(Stance::from_score(0.5), Stance::Neutral);
        assert_eq!(Stance::from_score(0.2), Stance::Bearish);
    }

    #[test]
    fn role_serialization() {
        assert_eq!(
            serde_json::to_string(&RoleKind::RiskJudge).unwrap(),
            "\"risk_judge\""
        );
        assert!(RoleKind::Macro.is_analyst());
        assert!(!RoleKind::Trader.is_analyst());
    }
}
