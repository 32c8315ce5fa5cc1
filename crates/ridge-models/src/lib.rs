pub mod analysis;
pub mod config;
pub mod context;
pub mod decision;
pub mod deliberation;
pub mod error;
pub mod signal;
pub mod snapshot;
pub mod store_schema;
pub mod ticker;
pub mod transcript;

pub use analysis::{
    Analysis, GateKind, GateOutcome, TradeParameters, Verdict, ANALYSIS_SCHEMA_VERSION,
};
pub use config::{
    DecisionConfig, DeliberationConfig, EmbeddingConfig, EmbeddingProviderKind, PortfolioConfig,
    RetrievalConfig, RidgeConfig, StoreConfig,
};
pub use context::{ContextBlock, ContextStatus, HistoricalMatch, OutcomeSummary, NO_PRIOR_CONTEXT};
pub use decision::{Decision, DECISION_SCHEMA_VERSION};
pub use deliberation::{
    DebateSummary, DegradedRole, DeliberationResult, Report, ReportStatus, RiskPlan, TradingPlan,
};
pub use error::ConfigError;
pub use signal::{Horizon, HorizonObservation, Outcome, OutcomeUpdate, Signal, SignalDirection};
pub use snapshot::{indicators, Fundamentals, Snapshot};
pub use store_schema::{STORE_DDL, STORE_TABLES};
pub use ticker::{Ticker, WatchStatus};
pub use transcript::{RoleKind, Stage, Stance, Transcript, TranscriptEntry};
