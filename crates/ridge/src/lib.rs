//! RIDGE - Retrieval-Informed Deliberation and Gated Entry
//!
//! Decides BUY, WAIT or PASS for a ticker snapshot: similar past setups are
//! retrieved from the context store, a panel of reasoning roles deliberates,
//! four gates vet the plan, and the run is written back so later analyses
//! can learn from its outcome.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use ridge::models::{RidgeConfig, Snapshot, Ticker};
//!
//! # async fn run(snapshot: Snapshot) -> anyhow::Result<()> {
//! let engine = ridge::build_engine(RidgeConfig::default())?;
//! let decision = engine.analyze(&Ticker::new("ACME"), snapshot).await?;
//! println!("{} {}", decision.verdict, decision.confidence);
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;

pub use ridge_agents as agents;
pub use ridge_decision as decision;
pub use ridge_models as models;
pub use ridge_retrieval as retrieval;
pub use ridge_store as store;

pub use engine::Engine;
pub use error::EngineError;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use ridge_agents::ClaudeCliBackend;
use ridge_models::RidgeConfig;
use ridge_store::{build_embedder, ContextStore};

/// Read a TOML config file. Missing sections and fields take their defaults.
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<RidgeConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: RidgeConfig = toml::from_str(&text)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Open the configured store and wire the engine to the Claude CLI backend.
pub fn build_engine(config: RidgeConfig) -> anyhow::Result<Engine> {
    let embedder = build_embedder(&config.embedding).context("Failed to build embedder")?;
    let store = ContextStore::open(&config.store, embedder)
        .with_context(|| format!("Failed to open store: {}", config.store.sqlite_path))?;
    let backend = Arc::new(ClaudeCliBackend::from_config(&config.deliberation));
    Ok(Engine::new(config, Arc::new(store), backend)?)
}
