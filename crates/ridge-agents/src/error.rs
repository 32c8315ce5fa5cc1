use thiserror::Error;

/// A failed reasoning-backend call. Recovered inside the pipeline, never returned from it.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Agent response parse error: {0}")]
    Parse(String),

    #[error("Backend call timed out after {0} ms")]
    Timeout(u64),

    #[error("Backend returned an empty response")]
    EmptyResponse,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
