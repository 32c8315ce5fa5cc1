use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Outcome for signal {signal_id} at {horizon} already observed at a later time")]
    OutcomeRegression { signal_id: Uuid, horizon: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Store not available: {0}")]
    Unavailable(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),
}
