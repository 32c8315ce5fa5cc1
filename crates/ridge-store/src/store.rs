use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use ridge_models::{
    Analysis, Horizon, Outcome, OutcomeUpdate, Signal, Snapshot, StoreConfig, Ticker,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::embedding::Embedder;
use crate::error::StoreError;
use crate::memory::MemoryCache;
use crate::sqlite::{PendingOutcome, SqliteStore};
use crate::vector_index::{HistoricalRecord, SearchFilter, VectorIndex};

/// The context store: SQLite rows, the vector index over their embeddings,
/// and a moka hot cache for analysis reads.
///
/// Row writes and index writes are coupled: a record is published to the
/// index only after its SQLite transaction commits, and `rebuild_index`
/// (run on open) reloads the index from the rows. A record is therefore
/// durable before it is searchable; the window between commit and publish
/// is a single pointer swap. If publishing ever fails the row is still
/// durable and the next `rebuild_index` picks it up.
///
/// SQLite access is synchronized via `Mutex` since `rusqlite::Connection` is not `Sync`.
/// Similarity queries never take that mutex.
pub struct ContextStore {
    sqlite: Mutex<SqliteStore>,
    index: VectorIndex,
    memory: MemoryCache,
    embedder: Arc<dyn Embedder>,
}

impl ContextStore {
    pub fn new(
        sqlite: SqliteStore,
        embedder: Arc<dyn Embedder>,
        config: &StoreConfig,
    ) -> Result<Self, StoreError> {
        let store = Self {
            sqlite: Mutex::new(sqlite),
            index: VectorIndex::new(embedder.dimension()),
            memory: MemoryCache::new(
                config.memory_max_capacity,
                Duration::from_secs(config.memory_ttl_seconds),
            ),
            embedder,
        };
        store.rebuild_index()?;
        Ok(store)
    }

    /// Open the configured database file.
    pub fn open(config: &StoreConfig, embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        if let Some(parent) = std::path::Path::new(&config.sqlite_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        Self::new(SqliteStore::open(&config.sqlite_path)?, embedder, config)
    }

    pub fn open_in_memory(embedder: Arc<dyn Embedder>) -> Result<Self, StoreError> {
        Self::new(
            SqliteStore::open_in_memory()?,
            embedder,
            &StoreConfig::default(),
        )
    }

    fn with_sqlite<T>(
        &self,
        f: impl FnOnce(&mut SqliteStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut sqlite = self
            .sqlite
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("SQLite mutex poisoned: {e}")))?;
        f(&mut sqlite)
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    pub fn hot_cache_size(&self) -> u64 {
        self.memory.entry_count()
    }

    /// Embed text with the configured embedder.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        let vector = self.embedder.embed(text).await?;
        self.index.check_dimension(&vector)?;
        Ok(vector)
    }

    /// At most `k` records, by descending cosine similarity to `vector`.
    pub fn similarity_search(
        &self,
        vector: &[f32],
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<(HistoricalRecord, f64)>, StoreError> {
        let hits = self.index.search(vector, k, filter)?;
        debug!(k, hits = hits.len(), indexed = self.index.len(), "Similarity search");
        Ok(hits)
    }

    /// Reload the vector index from the embedding columns.
    pub fn rebuild_index(&self) -> Result<usize, StoreError> {
        let rows = self.with_sqlite(|s| s.load_index_rows())?;
        let total = rows.len();
        let indexed = self.index.replace_all(rows)?;
        info!(indexed, skipped = total - indexed, "Vector index rebuilt");
        Ok(indexed)
    }

    // -- learning loop writes --

    pub fn write_analysis(&self, analysis: &Analysis) -> Result<(), StoreError> {
        self.index.check_dimension(&analysis.embedding)?;
        let record = self.with_sqlite(|s| s.insert_analysis(analysis))?;
        self.publish(record, &analysis.embedding);
        info!(
            analysis_id = %analysis.id,
            symbol = %analysis.symbol,
            verdict = %analysis.verdict,
            "Analysis stored"
        );
        Ok(())
    }

    /// Store a signal and its empty outcome shell.
    pub fn write_signal(&self, signal: &Signal) -> Result<(), StoreError> {
        self.index.check_dimension(&signal.embedding)?;
        let record = self.with_sqlite(|s| s.insert_signal(signal))?;
        self.publish(record, &signal.embedding);
        info!(
            signal_id = %signal.id,
            analysis_id = %signal.analysis_id,
            direction = signal.direction.as_str(),
            "Signal stored"
        );
        Ok(())
    }

    fn publish(&self, record: HistoricalRecord, vector: &[f32]) {
        let id = record.id;
        if let Err(e) = self.index.insert(record, vector) {
            error!(
                id = %id,
                error = %e,
                "Row committed but not indexed; rebuild_index will reconcile"
            );
        }
    }

    // -- reads --

    /// Read-through: moka first, then SQLite. SQLite hits are promoted to moka.
    pub async fn get_analysis(&self, id: Uuid) -> Result<Option<Arc<Analysis>>, StoreError> {
        if let Some(hit) = self.memory.get(&id).await {
            return Ok(Some(hit));
        }
        let row = self.with_sqlite(|s| s.get_analysis(id))?;
        match row {
            Some(analysis) => {
                let analysis = Arc::new(analysis);
                self.memory.insert(Arc::clone(&analysis)).await;
                Ok(Some(analysis))
            }
            None => Ok(None),
        }
    }

    pub fn analyses_for_symbol(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Analysis>, StoreError> {
        self.with_sqlite(|s| s.analyses_for_symbol(symbol, limit))
    }

    pub fn get_signal(&self, id: Uuid) -> Result<Option<Signal>, StoreError> {
        self.with_sqlite(|s| s.get_signal(id))
    }

    // -- outcomes --

    pub fn get_outcome(&self, signal_id: Uuid) -> Result<Option<Outcome>, StoreError> {
        self.with_sqlite(|s| s.get_outcome(signal_id))
    }

    pub fn outcome_for_analysis(&self, analysis_id: Uuid) -> Result<Option<Outcome>, StoreError> {
        self.with_sqlite(|s| s.outcome_for_analysis(analysis_id))
    }

    pub fn write_outcome(
        &self,
        signal_id: Uuid,
        horizon: Horizon,
        update: &OutcomeUpdate,
    ) -> Result<Outcome, StoreError> {
        let outcome = self.with_sqlite(|s| s.write_outcome(signal_id, horizon, update))?;
        info!(
            signal_id = %signal_id,
            horizon = horizon.days(),
            return_pct = update.realized_return_pct,
            validated = ?outcome.thesis_validated,
            "Outcome recorded"
        );
        Ok(outcome)
    }

    pub fn annotate_outcome(&self, signal_id: Uuid, lessons: &str) -> Result<(), StoreError> {
        self.with_sqlite(|s| s.annotate_outcome(signal_id, lessons))
    }

    pub fn pending_outcomes(&self, now: DateTime<Utc>) -> Result<Vec<PendingOutcome>, StoreError> {
        self.with_sqlite(|s| s.pending_outcomes(now))
    }

    // -- tickers & snapshots --

    pub fn add_ticker(&self, ticker: &Ticker) -> Result<(), StoreError> {
        self.with_sqlite(|s| s.add_ticker(ticker))
    }

    pub fn remove_ticker(&self, symbol: &str) -> Result<bool, StoreError> {
        self.with_sqlite(|s| s.remove_ticker(symbol))
    }

    pub fn get_ticker(&self, symbol: &str) -> Result<Option<Ticker>, StoreError> {
        self.with_sqlite(|s| s.get_ticker(symbol))
    }

    pub fn watchlist(&self) -> Result<Vec<Ticker>, StoreError> {
        self.with_sqlite(|s| s.watchlist())
    }

    pub fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<i64, StoreError> {
        self.with_sqlite(|s| s.insert_snapshot(snapshot))
    }

    pub fn correct_snapshot(&self, snapshot: &Snapshot) -> Result<Snapshot, StoreError> {
        self.with_sqlite(|s| s.correct_snapshot(snapshot))
    }

    pub fn get_snapshot(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<Snapshot>, StoreError> {
        self.with_sqlite(|s| s.get_snapshot(symbol, date))
    }
}
