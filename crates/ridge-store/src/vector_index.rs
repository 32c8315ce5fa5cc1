use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use ridge_models::Verdict;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Analysis,
    Signal,
}

/// Metadata of an embedded row, carried in the index so queries never touch SQLite.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoricalRecord {
    pub kind: RecordKind,
    /// Analysis or signal id.
    pub id: Uuid,
    /// The analysis this record belongs to (itself for analyses).
    pub analysis_id: Uuid,
    pub symbol: String,
    pub sector: Option<String>,
    pub scan_date: NaiveDate,
    pub verdict: Verdict,
    /// 0-100.
    pub confidence: f64,
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub record: HistoricalRecord,
    /// Unit-normalized.
    pub vector: Vec<f32>,
}

/// Structured constraints applied during the index scan.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub kind: Option<RecordKind>,
    pub symbol: Option<String>,
    pub exclude_symbol: Option<String>,
    pub sector: Option<String>,
    pub since: Option<NaiveDate>,
    pub before: Option<NaiveDate>,
    pub verdicts: Vec<Verdict>,
}

impl SearchFilter {
    pub fn analyses() -> Self {
        Self {
            kind: Some(RecordKind::Analysis),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &HistoricalRecord) -> bool {
        if self.kind.is_some_and(|k| k != record.kind) {
            return false;
        }
        if self.symbol.as_ref().is_some_and(|s| *s != record.symbol) {
            return false;
        }
        if self.exclude_symbol.as_ref().is_some_and(|s| *s == record.symbol) {
            return false;
        }
        if let Some(sector) = &self.sector {
            if record.sector.as_deref() != Some(sector.as_str()) {
                return false;
            }
        }
        if self.since.is_some_and(|d| record.scan_date < d) {
            return false;
        }
        if self.before.is_some_and(|d| record.scan_date >= d) {
            return false;
        }
        self.verdicts.is_empty() || self.verdicts.contains(&record.verdict)
    }
}

/// In-memory cosine-similarity index over every stored embedding.
///
/// Copy-on-write: a query clones the current `Arc` and scans it without
/// holding any lock. Writers are serialized on `write_lock`, build the next
/// generation off to the side, and only take the `RwLock` to swap the
/// pointer. SQLite rows are the source of truth; `replace_all` rebuilds
/// the index from them.
pub struct VectorIndex {
    dimension: usize,
    entries: RwLock<Arc<Vec<Arc<IndexEntry>>>>,
    write_lock: Mutex<()>,
}

impl VectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(Arc::new(Vec::new())),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.snapshot().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<Arc<Vec<Arc<IndexEntry>>>, StoreError> {
        let guard = self
            .entries
            .read()
            .map_err(|e| StoreError::Unavailable(format!("vector index lock poisoned: {e}")))?;
        Ok(Arc::clone(&guard))
    }

    fn publish(&self, next: Vec<Arc<IndexEntry>>) -> Result<(), StoreError> {
        let mut guard = self
            .entries
            .write()
            .map_err(|e| StoreError::Unavailable(format!("vector index lock poisoned: {e}")))?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// Add one record. A record with the same id replaces the old entry.
    pub fn insert(&self, record: HistoricalRecord, vector: &[f32]) -> Result<(), StoreError> {
        self.check_dimension(vector)?;
        let entry = Arc::new(IndexEntry {
            record,
            vector: normalize(vector),
        });
        let _writer = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("vector index writer poisoned: {e}")))?;
        let current = self.snapshot()?;
        let mut next: Vec<Arc<IndexEntry>> = current
            .iter()
            .filter(|e| e.record.id != entry.record.id)
            .cloned()
            .collect();
        next.push(entry);
        self.publish(next)
    }

    /// Swap in a fresh generation built from `entries`. Wrong-dimension rows are skipped.
    pub fn replace_all(
        &self,
        entries: impl IntoIterator<Item = (HistoricalRecord, Vec<f32>)>,
    ) -> Result<usize, StoreError> {
        let next: Vec<Arc<IndexEntry>> = entries
            .into_iter()
            .filter(|(record, v)| {
                let ok = v.len() == self.dimension;
                if !ok {
                    tracing::warn!(
                        id = %record.id,
                        expected = self.dimension,
                        actual = v.len(),
                        "Skipping embedding with wrong dimension"
                    );
                }
                ok
            })
            .map(|(record, v)| {
                Arc::new(IndexEntry {
                    record,
                    vector: normalize(&v),
                })
            })
            .collect();
        let count = next.len();
        let _writer = self
            .write_lock
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("vector index writer poisoned: {e}")))?;
        self.publish(next)?;
        Ok(count)
    }

    /// Top `limit` records by cosine similarity, descending.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<(HistoricalRecord, f64)>, StoreError> {
        self.check_dimension(query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let query = normalize(query);
        let entries = self.snapshot()?;
        let mut scored: Vec<(&IndexEntry, f64)> = entries
            .iter()
            .filter(|e| filter.matches(&e.record))
            .map(|e| (e.as_ref(), dot(&query, &e.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored
            .into_iter()
            .map(|(e, score)| (e.record.clone(), score))
            .collect())
    }
}

/// Cosine similarity of two vectors. Zero for empty or mismatched inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| *x as f64 * *y as f64)
        .sum()
}

pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| (*x as f64 / norm) as f32).collect()
}

pub fn serialize_vector(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn deserialize_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(symbol: &str, date: (i32, u32, u32), verdict: Verdict) -> HistoricalRecord {
        let id = Uuid::new_v4();
        HistoricalRecord {
            kind: RecordKind::Analysis,
            id,
            analysis_id: id,
            symbol: symbol.to_string(),
            sector: Some("Industrials".to_string()),
            scan_date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            verdict,
            confidence: 55.0,
            degraded: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn cosine_identical_is_one() {
        let v = vec![0.3, -0.2, 0.9];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&v, &[1.0]), 0.0);
    }

    #[test]
    fn blob_roundtrip() {
        let v = vec![1.5_f32, -0.25, 0.0, 3.75];
        assert_eq!(deserialize_vector(&serialize_vector(&v)), v);
    }

    #[test]
    fn search_orders_descending_and_truncates() {
        let index = VectorIndex::new(3);
        index
            .insert(record("AAA", (2026, 1, 2), Verdict::Buy), &[1.0, 0.0, 0.0])
            .unwrap();
        index
            .insert(record("BBB", (2026, 1, 2), Verdict::Wait), &[0.7, 0.7, 0.0])
            .unwrap();
        index
            .insert(record("CCC", (2026, 1, 2), Verdict::Pass), &[0.0, 0.0, 1.0])
            .unwrap();

        let hits = index.search(&[1.0, 0.1, 0.0], 2, &SearchFilter::default()).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.symbol, "AAA");
        assert_eq!(hits[1].0.symbol, "BBB");
        assert!(hits[0].1 >= hits[1].1);
    }

    #[test]
    fn search_applies_filter() {
        let index = VectorIndex::new(2);
        index
            .insert(record("AAA", (2025, 6, 1), Verdict::Buy), &[1.0, 0.0])
            .unwrap();
        index
            .insert(record("BBB", (2026, 2, 1), Verdict::Pass), &[1.0, 0.0])
            .unwrap();

        let filter = SearchFilter {
            since: NaiveDate::from_ymd_opt(2026, 1, 1),
            ..Default::default()
        };
        let hits = index.search(&[1.0, 0.0], 5, &filter).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.symbol, "BBB");

        let filter = SearchFilter {
            verdicts: vec![Verdict::Buy],
            ..Default::default()
        };
        let hits = index.search(&[1.0, 0.0], 5, &filter).unwrap();
        assert_eq!(hits[0].0.symbol, "AAA");
    }

    #[test]
    fn rejects_wrong_dimension() {
        let index = VectorIndex::new(4);
        let err = index
            .insert(record("AAA", (2026, 1, 2), Verdict::Buy), &[1.0, 0.0])
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::DimensionMismatch {
                expected: 4,
                actual: 2
            }
        ));
        assert!(index.search(&[1.0], 1, &SearchFilter::default()).is_err());
    }

    #[test]
    fn zero_limit_returns_nothing() {
        let index = VectorIndex::new(2);
        index
            .insert(record("AAA", (2026, 1, 2), Verdict::Buy), &[1.0, 0.0])
            .unwrap();
        assert!(index.search(&[1.0, 0.0], 0, &SearchFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn reader_snapshot_survives_concurrent_insert() {
        let index = VectorIndex::new(2);
        index
            .insert(record("AAA", (2026, 1, 2), Verdict::Buy), &[1.0, 0.0])
            .unwrap();
        let held = index.snapshot().unwrap();
        index
            .insert(record("BBB", (2026, 1, 2), Verdict::Buy), &[0.0, 1.0])
            .unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn replace_all_skips_bad_rows() {
        let index = VectorIndex::new(2);
        let count = index
            .replace_all(vec![
                (record("AAA", (2026, 1, 2), Verdict::Buy), vec![1.0, 0.0]),
                (record("BBB", (2026, 1, 2), Verdict::Buy), vec![1.0, 0.0, 0.0]),
            ])
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(index.len(), 1);
    }
}
