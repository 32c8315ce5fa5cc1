use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::transcript::RoleKind;

/// Top-level configuration for RIDGE.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RidgeConfig {
    pub store: StoreConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub deliberation: DeliberationConfig,
    pub decision: DecisionConfig,
    pub portfolio: PortfolioConfig,
}

impl RidgeConfig {
    /// Check every section. Any failure is a configuration error that aborts `analyze()`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.embedding.validate()?;
        self.retrieval.validate()?;
        self.deliberation.validate()?;
        self.decision.validate()?;
        self.portfolio.validate()
    }
}

/// Configuration for the context store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database holding tickers, snapshots, analyses, signals and outcomes.
    pub sqlite_path: String,
    /// Maximum number of analyses kept in the in-memory moka cache.
    pub memory_max_capacity: u64,
    /// How long a read analysis stays in memory.
    pub memory_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/ridge.db".to_string(),
            memory_max_capacity: 10_000,
            memory_ttl_seconds: 300,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.sqlite_path.trim().is_empty() {
            return Err(ConfigError::Missing("store.sqlite_path"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// Deterministic local feature hashing. No network.
    #[default]
    Hashing,
    /// OpenAI-compatible `/v1/embeddings` endpoint.
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    /// Fixed vector dimension. Every stored embedding must have exactly this many components.
    pub dimension: usize,
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Environment variable holding the API key for remote providers.
    pub api_key_env: String,
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Hashing,
            dimension: 256,
            model: None,
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl EmbeddingConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.dimension == 0 {
            return Err(ConfigError::invalid("embedding.dimension", "must be > 0"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("embedding.timeout_ms", "must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of historical matches injected into deliberation.
    pub k: usize,
    /// Index query oversampling factor (3-5x k).
    pub oversample: usize,
    /// Age in days at which the recency weight halves.
    pub half_life_days: f64,
    /// Lower bound of the recency weight, so very old matches still count.
    pub recency_floor: f64,
    /// Matches below this recency-adjusted similarity are dropped.
    pub min_similarity: f64,
    /// Character budget for the rendered context block.
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 5,
            oversample: 4,
            half_life_days: 180.0,
            recency_floor: 0.5,
            min_similarity: 0.35,
            max_context_chars: 4_000,
        }
    }
}

impl RetrievalConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(3..=5).contains(&self.oversample) {
            return Err(ConfigError::invalid(
                "retrieval.oversample",
                format!("{} is outside 3..=5", self.oversample),
            ));
        }
        if self.half_life_days <= 0.0 {
            return Err(ConfigError::invalid("retrieval.half_life_days", "must be > 0"));
        }
        check_unit("retrieval.recency_floor", self.recency_floor)?;
        check_unit("retrieval.min_similarity", self.min_similarity)?;
        if self.max_context_chars == 0 {
            return Err(ConfigError::invalid("retrieval.max_context_chars", "must be > 0"));
        }
        Ok(())
    }
}

/// Configuration for the deliberation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeliberationConfig {
    /// Analyst roles fanned out in the independent-analysis stage, in report order.
    pub analysts: Vec<RoleKind>,
    /// Bull/bear debate round bound (R).
    pub debate_rounds: u32,
    /// Risk debate round bound (R2).
    pub risk_rounds: u32,
    /// Hard timeout for a single backend call.
    pub call_timeout_ms: u64,
    /// Aggregate timeout for one stage across all of its calls.
    pub stage_timeout_ms: u64,
    /// Circuit breaker for a whole `analyze()` run.
    pub run_timeout_ms: u64,
    /// Retries per role after the first failed attempt.
    pub max_retries: u32,
    /// Linear backoff step between retries.
    pub retry_backoff_ms: u64,
    /// Model for analyst, debate and risk roles.
    pub model: String,
    /// Model for the synthesis and risk-judge roles.
    pub synthesis_model: String,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            analysts: RoleKind::analysts().to_vec(),
            debate_rounds: 2,
            risk_rounds: 1,
            call_timeout_ms: 45_000,
            stage_timeout_ms: 120_000,
            run_timeout_ms: 600_000,
            max_retries: 2,
            retry_backoff_ms: 500,
            model: "claude-3-5-haiku-latest".to_string(),
            synthesis_model: "claude-sonnet-4-5-20250929".to_string(),
        }
    }
}

impl DeliberationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.analysts.is_empty() {
            return Err(ConfigError::Missing("deliberation.analysts"));
        }
        if let Some(role) = self.analysts.iter().find(|r| !r.is_analyst()) {
            return Err(ConfigError::invalid(
                "deliberation.analysts",
                format!("{role} is not an analyst role"),
            ));
        }
        if self.debate_rounds == 0 {
            return Err(ConfigError::invalid("deliberation.debate_rounds", "must be >= 1"));
        }
        if self.risk_rounds == 0 {
            return Err(ConfigError::invalid("deliberation.risk_rounds", "must be >= 1"));
        }
        if self.call_timeout_ms == 0 || self.stage_timeout_ms == 0 || self.run_timeout_ms == 0 {
            return Err(ConfigError::invalid("deliberation timeouts", "must be > 0"));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Missing("deliberation.model"));
        }
        Ok(())
    }
}

/// Thresholds for the four decision gates. Percent fields are in percent units (3.0 = 3%).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DecisionConfig {
    pub min_pullback_pct: f64,
    pub support_tolerance_pct: f64,
    pub overbought_rsi: f64,
    /// Historical success rate of similar setups must exceed this fraction.
    pub success_rate_threshold: f64,
    /// Fewer known outcomes than this and the success-rate check is skipped.
    pub min_outcome_samples: usize,
    pub extreme_relative_pe: f64,
    pub elevated_relative_pe: f64,
    pub growth_offset_pct: f64,
    pub drawdown_ceiling_pct: f64,
    pub default_stop_pct: f64,
    pub reward_risk_ratio: f64,
    pub default_holding_days: u32,
    /// A BUY below this confidence is downgraded to WAIT.
    pub min_buy_confidence: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_pullback_pct: 3.0,
            support_tolerance_pct: 2.0,
            overbought_rsi: 80.0,
            success_rate_threshold: 0.60,
            min_outcome_samples: 3,
            extreme_relative_pe: 2.0,
            elevated_relative_pe: 1.4,
            growth_offset_pct: 25.0,
            drawdown_ceiling_pct: 15.0,
            default_stop_pct: 8.0,
            reward_risk_ratio: 2.0,
            default_holding_days: 90,
            min_buy_confidence: 40.0,
        }
    }
}

impl DecisionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_pullback_pct < 0.0 {
            return Err(ConfigError::invalid("decision.min_pullback_pct", "must be >= 0"));
        }
        check_unit("decision.success_rate_threshold", self.success_rate_threshold)?;
        if self.elevated_relative_pe <= 1.0 || self.extreme_relative_pe < self.elevated_relative_pe
        {
            return Err(ConfigError::invalid(
                "decision.extreme_relative_pe",
                "requires 1 < elevated_relative_pe <= extreme_relative_pe",
            ));
        }
        if self.drawdown_ceiling_pct <= 0.0 || self.drawdown_ceiling_pct >= 100.0 {
            return Err(ConfigError::invalid(
                "decision.drawdown_ceiling_pct",
                "must be in (0, 100)",
            ));
        }
        if self.default_stop_pct <= 0.0 || self.default_stop_pct >= self.drawdown_ceiling_pct {
            return Err(ConfigError::invalid(
                "decision.default_stop_pct",
                "must be in (0, drawdown_ceiling_pct)",
            ));
        }
        if self.reward_risk_ratio <= 0.0 {
            return Err(ConfigError::invalid("decision.reward_risk_ratio", "must be > 0"));
        }
        if !(0.0..=100.0).contains(&self.min_buy_confidence) {
            return Err(ConfigError::invalid(
                "decision.min_buy_confidence",
                "must be in [0, 100]",
            ));
        }
        Ok(())
    }
}

/// Portfolio constraints for position sizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PortfolioConfig {
    /// Upper bound for a single position, percent of portfolio.
    pub max_position_pct: f64,
    /// Upper bound for the loss one position may cost if its stop is hit, percent of portfolio.
    pub max_portfolio_risk_pct: f64,
    /// Daily volatility at which a full-confidence position gets the full allocation.
    pub target_volatility_pct: f64,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            max_position_pct: 10.0,
            max_portfolio_risk_pct: 1.5,
            target_volatility_pct: 2.0,
        }
    }
}

impl PortfolioConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_position_pct <= 0.0 || self.max_position_pct > 100.0 {
            return Err(ConfigError::invalid(
                "portfolio.max_position_pct",
                "must be in (0, 100]",
            ));
        }
        if self.max_portfolio_risk_pct <= 0.0 {
            return Err(ConfigError::invalid(
                "portfolio.max_portfolio_risk_pct",
                "must be > 0",
            ));
        }
        if self.target_volatility_pct <= 0.0 {
            return Err(ConfigError::invalid(
                "portfolio.target_volatility_pct",
                "must be > 0",
            ));
        }
        Ok(())
    }
}

fn check_unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} is outside [0, 1]")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RidgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.deliberation.analysts.len(), 5);
        assert_eq!(config.retrieval.k, 5);
    }

    #[test]
    fn roundtrip_ridge_config() {
        let config = RidgeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RidgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn config_from_partial_toml() {
        let toml_str = r#"
[store]
sqlite_path = "/tmp/ridge_test.db"

[deliberation]
analysts = ["technical", "fundamental"]
debate_rounds = 3

[decision]
min_pullback_pct = 5.0

[portfolio]
max_position_pct = 5.0
"#;

        let config: RidgeConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.store.sqlite_path, "/tmp/ridge_test.db");
        assert_eq!(config.deliberation.analysts.len(), 2);
        assert_eq!(config.deliberation.debate_rounds, 3);
        // Untouched fields keep their defaults
        assert_eq!(config.deliberation.risk_rounds, 1);
        assert_eq!(config.decision.min_pullback_pct, 5.0);
        assert_eq!(config.decision.drawdown_ceiling_pct, 15.0);
        assert_eq!(config.retrieval.oversample, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut config = RidgeConfig::default();
        config.decision.success_rate_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "decision.success_rate_threshold",
                ..
            }
        ));
    }

    #[test]
    fn rejects_missing_portfolio_limit() {
        let mut config = RidgeConfig::default();
        config.portfolio.max_position_pct = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_non_analyst_role_in_fan_out() {
        let mut config = RidgeConfig::default();
        config.deliberation.analysts = vec![RoleKind::Technical, RoleKind::Bull];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_oversample_outside_band() {
        let mut config = RidgeConfig::default();
        config.retrieval.oversample = 10;
        assert!(config.validate().is_err());
    }
}
