use ridge_models::ConfigError;
use ridge_store::StoreError;
use thiserror::Error;

/// Errors `analyze()` surfaces. Everything else degrades into the returned Decision.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error("Invalid snapshot for {symbol}: {reason}")]
    InvalidSnapshot { symbol: String, reason: String },

    /// Only from the outcome hooks and watchlist calls, never from `analyze()`.
    #[error(transparent)]
    Store(#[from] StoreError),
}
