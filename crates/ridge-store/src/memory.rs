use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use ridge_models::Analysis;
use uuid::Uuid;

/// In-memory hot cache of recently read analyses, backed by moka.
///
/// Analyses are immutable once written, so entries never need invalidation;
/// they only age out after the TTL.
pub struct MemoryCache {
    inner: Cache<Uuid, Arc<Analysis>>,
}

impl MemoryCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, id: &Uuid) -> Option<Arc<Analysis>> {
        self.inner.get(id).await
    }

    pub async fn insert(&self, analysis: Arc<Analysis>) {
        self.inner.insert(analysis.id, analysis).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}
