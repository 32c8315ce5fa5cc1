//! Engine tests: full `analyze()` runs against the scenario backend and an in-memory store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use ridge::models::{
    indicators, ContextStatus, DeliberationConfig, Horizon, OutcomeUpdate, RidgeConfig, RoleKind,
    Snapshot, Ticker, Verdict,
};
use ridge::store::{ContextStore, Embedder, HashingEmbedder, StoreError};
use ridge::{Engine, EngineError};
use ridge_agents::test_support::{Fault, ScenarioBackend};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn acme() -> Snapshot {
    Snapshot::new("ACME", dec!(100.00), 72)
        .with_indicator(indicators::MA50, 95.0)
        .with_indicator(indicators::RSI, 28.0)
}

fn config() -> RidgeConfig {
    RidgeConfig {
        deliberation: DeliberationConfig {
            call_timeout_ms: 500,
            stage_timeout_ms: 2_000,
            run_timeout_ms: 10_000,
            max_retries: 1,
            retry_backoff_ms: 5,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn store() -> Arc<ContextStore> {
    Arc::new(ContextStore::open_in_memory(Arc::new(HashingEmbedder::new(256))).unwrap())
}

fn engine_with(backend: ScenarioBackend, config: RidgeConfig, store: Arc<ContextStore>) -> Engine {
    Engine::new(config, store, Arc::new(backend)).unwrap()
}

#[tokio::test]
async fn acme_with_empty_store() {
    let store = store();
    let engine = engine_with(ScenarioBackend::new(), config(), Arc::clone(&store));

    let d = engine.analyze(&Ticker::new("ACME"), acme()).await.unwrap();

    assert!(matches!(d.verdict, Verdict::Buy | Verdict::Wait));
    assert!(d.confidence >= Decimal::ZERO && d.confidence <= dec!(100));
    assert!(d.entry <= dec!(100.00));
    assert!(d.stop < d.entry);
    assert!(!d.timed_out);
    assert!(d.notes.iter().any(|n| n.contains("no prior context")));

    let id = d.analysis_id.expect("analysis persisted");
    let stored = store.get_analysis(id).await.unwrap().expect("stored row");
    assert_eq!(stored.verdict, d.verdict);
    assert_eq!(stored.context_status, ContextStatus::NoPriorContext);
    assert_eq!(stored.embedding.len(), 256);
    assert_eq!(stored.transcript.len(), 13);
    assert_eq!(d.signal_id.is_some(), d.verdict == Verdict::Buy);
}

#[tokio::test]
async fn repeated_runs_keep_gate_pattern() {
    let first = engine_with(ScenarioBackend::new(), config(), store())
        .analyze(&Ticker::new("ACME"), acme())
        .await
        .unwrap();
    let second = engine_with(ScenarioBackend::new(), config(), store())
        .analyze(&Ticker::new("ACME"), acme())
        .await
        .unwrap();
    assert_eq!(first.gate_pattern(), second.gate_pattern());
    assert_eq!(first.verdict, second.verdict);
}

#[tokio::test]
async fn history_feeds_the_next_run() {
    let store = store();
    let engine = engine_with(ScenarioBackend::new(), config(), Arc::clone(&store));
    let ticker = Ticker::new("ACME");

    let first = engine.analyze(&ticker, acme()).await.unwrap();
    let signal_id = first.signal_id.expect("ACME buys against the scenario backend");
    let pending = engine.pending_outcomes(Utc::now() + chrono::Duration::days(31)).unwrap();
    assert!(pending
        .iter()
        .any(|p| p.signal_id == signal_id && p.horizon == Horizon::D30));

    let outcome = engine
        .write_outcome(
            signal_id,
            Horizon::D30,
            &OutcomeUpdate {
                realized_price: dec!(108.00),
                realized_return_pct: 8.0,
                observed_at: Utc::now(),
            },
        )
        .unwrap();
    assert_eq!(outcome.thesis_validated, Some(true));
    assert_eq!(
        engine.get_outcome(signal_id).unwrap().and_then(|o| o.realized_return_pct),
        Some(8.0)
    );

    let mut next_day = acme();
    next_day.scan_date = next_day.scan_date.succ_opt().unwrap();
    let second = engine.analyze(&ticker, next_day).await.unwrap();

    assert!(!second.notes.iter().any(|n| n.contains("no prior context")));
    assert!(second.confidence > first.confidence);
    let stored = store
        .get_analysis(second.analysis_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.context_status, ContextStatus::Available);
}

#[tokio::test]
async fn run_timeout_forces_unpersisted_pass() {
    let store = store();
    let config = RidgeConfig {
        deliberation: DeliberationConfig {
            call_timeout_ms: 5_000,
            stage_timeout_ms: 10_000,
            run_timeout_ms: 300,
            max_retries: 0,
            ..Default::default()
        },
        ..Default::default()
    };
    let backend =
        ScenarioBackend::new().with_fault(RoleKind::Trader, Fault::Slow(Duration::from_secs(3)));
    let engine = engine_with(backend, config, Arc::clone(&store));

    let started = Instant::now();
    let d = engine.analyze(&Ticker::new("ACME"), acme()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(d.verdict, Verdict::Pass);
    assert!(d.timed_out);
    assert!(d.notes.iter().any(|n| n.contains("timed out")));
    assert!(d.analysis_id.is_none());
    assert_eq!(store.index_len(), 0);
}

/// Answers the first call at once and stalls on every later one.
struct StallsAfterFirst {
    inner: HashingEmbedder,
    calls: AtomicUsize,
}

#[async_trait]
impl Embedder for StallsAfterFirst {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

#[tokio::test]
async fn run_timeout_during_signal_embedding_stores_nothing() {
    let embedder = StallsAfterFirst {
        inner: HashingEmbedder::new(256),
        calls: AtomicUsize::new(0),
    };
    let store = Arc::new(ContextStore::open_in_memory(Arc::new(embedder)).unwrap());
    let mut config = config();
    config.deliberation.run_timeout_ms = 1_000;
    let engine = engine_with(ScenarioBackend::new(), config, Arc::clone(&store));

    let d = engine.analyze(&Ticker::new("ACME"), acme()).await.unwrap();

    assert_eq!(d.verdict, Verdict::Pass);
    assert!(d.timed_out);
    assert!(d.analysis_id.is_none());
    assert!(store.analyses_for_symbol("ACME", 10).unwrap().is_empty());
    assert_eq!(store.index_len(), 0);
}

#[tokio::test]
async fn concurrent_runs_share_only_the_store() {
    let store = store();
    let engine = Arc::new(engine_with(ScenarioBackend::new(), config(), Arc::clone(&store)));
    let runs = [("ACME", 72), ("BOLT", 64), ("CRUX", 58), ("ACME", 72)];

    let mut tasks = tokio::task::JoinSet::new();
    for (symbol, priority) in runs {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move {
            let snapshot = Snapshot::new(symbol, dec!(100.00), priority)
                .with_indicator(indicators::MA50, 95.0)
                .with_indicator(indicators::RSI, 28.0);
            engine.analyze(&Ticker::new(symbol), snapshot).await
        });
    }

    let mut decisions = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        decisions.push(joined.unwrap().unwrap());
    }

    assert_eq!(decisions.len(), runs.len());
    assert!(decisions.iter().all(|d| d.analysis_id.is_some() && !d.timed_out));
    let stored: usize = ["ACME", "BOLT", "CRUX"]
        .iter()
        .map(|s| store.analyses_for_symbol(s, 10).unwrap().len())
        .sum();
    assert_eq!(stored, runs.len());
    assert_eq!(store.analyses_for_symbol("ACME", 10).unwrap().len(), 2);
}

#[tokio::test]
async fn failing_role_degrades_instead_of_erroring() {
    let store = store();
    let backend = ScenarioBackend::new().always_failing(RoleKind::Macro);
    let engine = engine_with(backend, config(), Arc::clone(&store));

    let d = engine.analyze(&Ticker::new("ACME"), acme()).await.unwrap();
    assert!(d.degraded);
    assert!(d.notes.iter().any(|n| n.starts_with("macro")));

    let stored = store.get_analysis(d.analysis_id.unwrap()).await.unwrap().unwrap();
    assert!(stored.is_degraded());
}

#[tokio::test]
async fn invalid_snapshot_is_rejected() {
    let engine = engine_with(ScenarioBackend::new(), config(), store());
    let err = engine
        .analyze(&Ticker::new("ACME"), Snapshot::new("ACME", Decimal::ZERO, 50))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSnapshot { .. }));

    let err = engine
        .analyze(&Ticker::new("OTHER"), acme())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidSnapshot { .. }));
}

#[test]
fn invalid_config_is_rejected() {
    let mut config = config();
    config.portfolio.max_position_pct = 0.0;
    let result = Engine::new(config, store(), Arc::new(ScenarioBackend::new()));
    assert!(matches!(result, Err(EngineError::Configuration(_))));
}

#[test]
fn shipped_config_matches_defaults() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/ridge.toml");
    let config = ridge::load_config(path).unwrap();
    assert_eq!(config, RidgeConfig::default());
}
