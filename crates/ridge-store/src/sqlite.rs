use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use ridge_models::{
    Analysis, Horizon, HorizonObservation, Outcome, OutcomeUpdate, Signal, SignalDirection,
    Snapshot, Ticker, Verdict, WatchStatus,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::vector_index::{deserialize_vector, serialize_vector, HistoricalRecord, RecordKind};

/// A signal horizon that has elapsed without a recorded observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingOutcome {
    pub signal_id: Uuid,
    pub symbol: String,
    pub direction: SignalDirection,
    pub entry_price: Decimal,
    pub horizon: Horizon,
    pub due_at: DateTime<Utc>,
}

/// Read-write SQLite accessor for the context store tables.
///
/// Opens in WAL mode so readers in other processes are never blocked by
/// the engine's appends.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file. Creates the schema and enables WAL.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Open an in-memory database with the schema applied.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(ridge_models::STORE_DDL)?;
        Ok(Self { conn })
    }

    // -- tickers --

    /// Insert or refresh a ticker. Re-adding a removed ticker reactivates it.
    pub fn add_ticker(&self, ticker: &Ticker) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO tickers \
             (symbol, name, sector, market_cap, watch_status, added_at, removed_at) \
             VALUES (?1, ?2, ?3, ?4, 'watching', ?5, NULL) \
             ON CONFLICT(symbol) DO UPDATE SET \
                 name = COALESCE(excluded.name, tickers.name), \
                 sector = COALESCE(excluded.sector, tickers.sector), \
                 market_cap = COALESCE(excluded.market_cap, tickers.market_cap), \
                 watch_status = 'watching', \
                 removed_at = NULL",
            params![
                ticker.symbol,
                ticker.name,
                ticker.sector,
                ticker.market_cap.map(|d| d.to_string()),
                ticker.added_at,
            ],
        )?;
        Ok(())
    }

    /// Soft delete. Returns false when the ticker was not on the watchlist.
    pub fn remove_ticker(&self, symbol: &str) -> Result<bool, StoreError> {
        let changed = self.conn.execute(
            "UPDATE tickers SET watch_status = 'removed', removed_at = ?2 \
             WHERE symbol = ?1 AND watch_status = 'watching'",
            params![symbol, Utc::now()],
        )?;
        Ok(changed > 0)
    }

    pub fn get_ticker(&self, symbol: &str) -> Result<Option<Ticker>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT symbol, name, sector, market_cap, watch_status, added_at, removed_at \
             FROM tickers WHERE symbol = ?1",
        )?;
        Ok(stmt.query_row(params![symbol], ticker_from_row).optional()?)
    }

    /// Tickers currently being watched, by symbol.
    pub fn watchlist(&self) -> Result<Vec<Ticker>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT symbol, name, sector, market_cap, watch_status, added_at, removed_at \
             FROM tickers WHERE watch_status = 'watching' ORDER BY symbol",
        )?;
        let rows = stmt
            .query_map([], ticker_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn ensure_ticker(
        conn: &Connection,
        symbol: &str,
        sector: Option<&str>,
    ) -> Result<(), StoreError> {
        conn.execute(
            "INSERT OR IGNORE INTO tickers (symbol, sector, watch_status, added_at) \
             VALUES (?1, ?2, 'watching', ?3)",
            params![symbol, sector, Utc::now()],
        )?;
        Ok(())
    }

    // -- snapshots --

    /// Insert the day's snapshot. One per (symbol, date); ranks are unique per date.
    pub fn insert_snapshot(&mut self, snapshot: &Snapshot) -> Result<i64, StoreError> {
        let tx = self.conn.transaction()?;
        Self::ensure_ticker(&tx, &snapshot.symbol, snapshot.sector.as_deref())?;
        let result = tx.execute(
            "INSERT INTO snapshots \
             (symbol, scan_date, price, volume, priority_score, priority_rank, \
              snapshot_json, captured_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                snapshot.symbol,
                snapshot.scan_date,
                snapshot.price.to_string(),
                snapshot.volume as i64,
                snapshot.priority_score,
                snapshot.priority_rank,
                serde_json::to_string(snapshot)?,
                snapshot.captured_at,
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_constraint(&e) => {
                return Err(StoreError::Constraint(format!(
                    "snapshot {} {} (rank {:?}): {e}",
                    snapshot.symbol, snapshot.scan_date, snapshot.priority_rank
                )));
            }
            Err(e) => return Err(e.into()),
        }
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// Corrective backfill: replace the body of an existing snapshot, keeping
    /// its identity and rank.
    pub fn correct_snapshot(&mut self, corrected: &Snapshot) -> Result<Snapshot, StoreError> {
        let tx = self.conn.transaction()?;
        let rank: Option<Option<u32>> = tx
            .query_row(
                "SELECT priority_rank FROM snapshots WHERE symbol = ?1 AND scan_date = ?2",
                params![corrected.symbol, corrected.scan_date],
                |row| row.get(0),
            )
            .optional()?;
        let Some(rank) = rank else {
            return Err(StoreError::NotFound(format!(
                "snapshot {} {}",
                corrected.symbol, corrected.scan_date
            )));
        };
        let mut body = corrected.clone();
        body.priority_rank = rank;
        tx.execute(
            "UPDATE snapshots SET price = ?3, volume = ?4, priority_score = ?5, \
                 snapshot_json = ?6, corrected_at = ?7 \
             WHERE symbol = ?1 AND scan_date = ?2",
            params![
                body.symbol,
                body.scan_date,
                body.price.to_string(),
                body.volume as i64,
                body.priority_score,
                serde_json::to_string(&body)?,
                Utc::now(),
            ],
        )?;
        tx.commit()?;
        Ok(body)
    }

    pub fn get_snapshot(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<Snapshot>, StoreError> {
        let json: Option<String> = self
            .conn
            .prepare_cached(
                "SELECT snapshot_json FROM snapshots WHERE symbol = ?1 AND scan_date = ?2",
            )?
            .query_row(params![symbol, date], |row| row.get(0))
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from))
            .transpose()
    }

    // -- analyses --

    /// Insert an analysis row and its embedding in one transaction.
    pub fn insert_analysis(&mut self, analysis: &Analysis) -> Result<HistoricalRecord, StoreError> {
        if analysis.embedding.is_empty() {
            return Err(StoreError::Constraint(format!(
                "analysis {} has no embedding",
                analysis.id
            )));
        }
        let record = analysis_record(analysis);
        let tx = self.conn.transaction()?;
        Self::ensure_ticker(&tx, &analysis.symbol, record.sector.as_deref())?;
        tx.execute(
            "INSERT INTO analyses \
             (id, symbol, scan_date, sector, verdict, confidence, degraded, \
              analysis_json, embedding, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                analysis.id.to_string(),
                analysis.symbol,
                analysis.scan_date,
                record.sector,
                analysis.verdict.as_str(),
                analysis.confidence.to_string(),
                analysis.is_degraded(),
                serde_json::to_string(analysis)?,
                serialize_vector(&analysis.embedding),
                analysis.created_at,
            ],
        )?;
        tx.commit()?;
        Ok(record)
    }

    pub fn get_analysis(&self, id: Uuid) -> Result<Option<Analysis>, StoreError> {
        let row: Option<(String, Vec<u8>)> = self
            .conn
            .prepare_cached("SELECT analysis_json, embedding FROM analyses WHERE id = ?1")?
            .query_row(params![id.to_string()], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        row.map(|(json, blob)| analysis_from_parts(&json, &blob))
            .transpose()
    }

    /// Most recent analyses for a symbol, newest first.
    pub fn analyses_for_symbol(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<Analysis>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT analysis_json, embedding FROM analyses WHERE symbol = ?1 \
             ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![symbol, limit as i64], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|(json, blob)| analysis_from_parts(json, blob))
            .collect()
    }

    // -- signals & outcomes --

    /// Insert a signal and its empty outcome shell in one transaction.
    /// The referenced analysis must already exist.
    pub fn insert_signal(&mut self, signal: &Signal) -> Result<HistoricalRecord, StoreError> {
        if signal.embedding.is_empty() {
            return Err(StoreError::Constraint(format!(
                "signal {} has no embedding",
                signal.id
            )));
        }
        let tx = self.conn.transaction()?;
        let parent = tx
            .query_row(
                "SELECT symbol, sector, scan_date, verdict, confidence, degraded \
                 FROM analyses WHERE id = ?1",
                params![signal.analysis_id.to_string()],
                |row| {
                    Ok(HistoricalRecord {
                        kind: RecordKind::Signal,
                        id: signal.id,
                        analysis_id: signal.analysis_id,
                        symbol: row.get(0)?,
                        sector: row.get(1)?,
                        scan_date: row.get(2)?,
                        verdict: parse_verdict(3, row.get(3)?)?,
                        confidence: parse_decimal(4, row.get(4)?)?.to_f64().unwrap_or(0.0),
                        degraded: row.get(5)?,
                        created_at: signal.created_at,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("analysis {}", signal.analysis_id)))?;

        tx.execute(
            "INSERT INTO signals \
             (id, analysis_id, symbol, direction, pattern_label, nearest_similarity, \
              expected_return_pct, expected_holding_days, entry_price, embedding, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                signal.id.to_string(),
                signal.analysis_id.to_string(),
                signal.symbol,
                signal.direction.as_str(),
                signal.pattern_label,
                signal.nearest_similarity,
                signal.expected_return_pct,
                signal.expected_holding_days,
                signal.entry_price.to_string(),
                serialize_vector(&signal.embedding),
                signal.created_at,
            ],
        )?;
        tx.execute(
            "INSERT INTO outcomes (signal_id, entry_price, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?3)",
            params![
                signal.id.to_string(),
                signal.entry_price.to_string(),
                signal.created_at
            ],
        )?;
        tx.commit()?;
        Ok(parent)
    }

    pub fn get_signal(&self, id: Uuid) -> Result<Option<Signal>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, analysis_id, symbol, direction, pattern_label, nearest_similarity, \
                    expected_return_pct, expected_holding_days, entry_price, embedding, created_at \
             FROM signals WHERE id = ?1",
        )?;
        Ok(stmt.query_row(params![id.to_string()], signal_from_row).optional()?)
    }

    pub fn get_outcome(&self, signal_id: Uuid) -> Result<Option<Outcome>, StoreError> {
        Self::read_outcome(&self.conn, signal_id)
    }

    /// Outcome of the earliest signal derived from an analysis.
    pub fn outcome_for_analysis(&self, analysis_id: Uuid) -> Result<Option<Outcome>, StoreError> {
        let signal_id: Option<String> = self
            .conn
            .prepare_cached(
                "SELECT id FROM signals WHERE analysis_id = ?1 ORDER BY created_at LIMIT 1",
            )?
            .query_row(params![analysis_id.to_string()], |row| row.get(0))
            .optional()?;
        match signal_id {
            Some(id) => Self::read_outcome(&self.conn, parse_uuid(0, id)?),
            None => Ok(None),
        }
    }

    fn read_outcome(conn: &Connection, signal_id: Uuid) -> Result<Option<Outcome>, StoreError> {
        let mut stmt = conn.prepare_cached(
            "SELECT o.signal_id, s.direction, o.entry_price, \
                    o.price_30d, o.return_30d, o.observed_30d, \
                    o.price_90d, o.return_90d, o.observed_90d, \
                    o.price_180d, o.return_180d, o.observed_180d, \
                    o.realized_return, o.thesis_validated, o.lessons, o.created_at, o.updated_at \
             FROM outcomes o JOIN signals s ON s.id = o.signal_id \
             WHERE o.signal_id = ?1",
        )?;
        Ok(stmt
            .query_row(params![signal_id.to_string()], outcome_from_row)
            .optional()?)
    }

    /// Fill one horizon. Observations may be refreshed but never moved back in time.
    pub fn write_outcome(
        &mut self,
        signal_id: Uuid,
        horizon: Horizon,
        update: &OutcomeUpdate,
    ) -> Result<Outcome, StoreError> {
        let tx = self.conn.transaction()?;
        let mut outcome = Self::read_outcome(&tx, signal_id)?
            .ok_or_else(|| StoreError::NotFound(format!("outcome for signal {signal_id}")))?;

        if let Some(existing) = outcome.observation(horizon) {
            if update.observed_at < existing.observed_at {
                return Err(StoreError::OutcomeRegression {
                    signal_id,
                    horizon: horizon.column_suffix().to_string(),
                });
            }
        }
        outcome.observations.retain(|o| o.horizon != horizon);
        outcome.observations.push(HorizonObservation {
            horizon,
            price: update.realized_price,
            return_pct: update.realized_return_pct,
            observed_at: update.observed_at,
        });
        let realized = outcome.longest_observation().map(|o| o.return_pct);
        let validated = realized.map(|r| outcome.direction.validates(r));

        let suffix = horizon.column_suffix();
        let sql = format!(
            "UPDATE outcomes SET \
                 price_{suffix} = ?2, return_{suffix} = ?3, observed_{suffix} = ?4, \
                 realized_return = ?5, thesis_validated = ?6, updated_at = ?7 \
             WHERE signal_id = ?1"
        );
        tx.execute(
            &sql,
            params![
                signal_id.to_string(),
                update.realized_price.to_string(),
                update.realized_return_pct,
                update.observed_at,
                realized,
                validated,
                Utc::now(),
            ],
        )?;
        let stored = Self::read_outcome(&tx, signal_id)?
            .ok_or_else(|| StoreError::NotFound(format!("outcome for signal {signal_id}")))?;
        tx.commit()?;
        Ok(stored)
    }

    pub fn annotate_outcome(&self, signal_id: Uuid, lessons: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE outcomes SET lessons = ?2, updated_at = ?3 WHERE signal_id = ?1",
            params![signal_id.to_string(), lessons, Utc::now()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("outcome for signal {signal_id}")));
        }
        Ok(())
    }

    /// Horizons that have elapsed by `now` without an observation, oldest first.
    pub fn pending_outcomes(&self, now: DateTime<Utc>) -> Result<Vec<PendingOutcome>, StoreError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT s.id, s.symbol, s.direction, o.entry_price, s.created_at, \
                    o.observed_30d IS NOT NULL, o.observed_90d IS NOT NULL, \
                    o.observed_180d IS NOT NULL \
             FROM signals s JOIN outcomes o ON o.signal_id = s.id \
             WHERE o.observed_180d IS NULL \
             ORDER BY s.created_at",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let filled: [bool; 3] = [row.get(5)?, row.get(6)?, row.get(7)?];
                Ok((
                    parse_uuid(0, row.get(0)?)?,
                    row.get::<_, String>(1)?,
                    parse_direction(2, row.get(2)?)?,
                    parse_decimal(3, row.get(3)?)?,
                    row.get::<_, DateTime<Utc>>(4)?,
                    filled,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut pending = Vec::new();
        for (signal_id, symbol, direction, entry_price, created_at, filled) in rows {
            for (horizon, done) in Horizon::ALL.into_iter().zip(filled) {
                let due_at = created_at + Duration::days(horizon.days() as i64);
                if !done && due_at <= now {
                    pending.push(PendingOutcome {
                        signal_id,
                        symbol: symbol.clone(),
                        direction,
                        entry_price,
                        horizon,
                        due_at,
                    });
                }
            }
        }
        Ok(pending)
    }

    /// Every embedded row, for rebuilding the vector index.
    pub fn load_index_rows(&self) -> Result<Vec<(HistoricalRecord, Vec<f32>)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, symbol, sector, scan_date, verdict, confidence, degraded, \
                    created_at, embedding \
             FROM analyses",
        )?;
        let mut rows = stmt
            .query_map([], |row| {
                let id = parse_uuid(0, row.get(0)?)?;
                Ok((
                    HistoricalRecord {
                        kind: RecordKind::Analysis,
                        id,
                        analysis_id: id,
                        symbol: row.get(1)?,
                        sector: row.get(2)?,
                        scan_date: row.get(3)?,
                        verdict: parse_verdict(4, row.get(4)?)?,
                        confidence: parse_decimal(5, row.get(5)?)?.to_f64().unwrap_or(0.0),
                        degraded: row.get(6)?,
                        created_at: row.get(7)?,
                    },
                    deserialize_vector(&row.get::<_, Vec<u8>>(8)?),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            "SELECT s.id, s.analysis_id, a.symbol, a.sector, a.scan_date, a.verdict, a.confidence, \
                    a.degraded, s.created_at, s.embedding \
             FROM signals s JOIN analyses a ON a.id = s.analysis_id",
        )?;
        let signals = stmt
            .query_map([], |row| {
                Ok((
                    HistoricalRecord {
                        kind: RecordKind::Signal,
                        id: parse_uuid(0, row.get(0)?)?,
                        analysis_id: parse_uuid(1, row.get(1)?)?,
                        symbol: row.get(2)?,
                        sector: row.get(3)?,
                        scan_date: row.get(4)?,
                        verdict: parse_verdict(5, row.get(5)?)?,
                        confidence: parse_decimal(6, row.get(6)?)?.to_f64().unwrap_or(0.0),
                        degraded: row.get(7)?,
                        created_at: row.get(8)?,
                    },
                    deserialize_vector(&row.get::<_, Vec<u8>>(9)?),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.extend(signals);
        Ok(rows)
    }

    /// Row count of one of the store tables.
    pub fn count(&self, table: &str) -> Result<usize, StoreError> {
        if !ridge_models::STORE_TABLES.contains(&table) {
            return Err(StoreError::NotFound(format!("table {table}")));
        }
        let count: usize =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count)
    }
}

fn analysis_record(analysis: &Analysis) -> HistoricalRecord {
    HistoricalRecord {
        kind: RecordKind::Analysis,
        id: analysis.id,
        analysis_id: analysis.id,
        symbol: analysis.symbol.clone(),
        sector: analysis.snapshot.sector.clone(),
        scan_date: analysis.scan_date,
        verdict: analysis.verdict,
        confidence: analysis.confidence.to_f64().unwrap_or(0.0),
        degraded: analysis.is_degraded(),
        created_at: analysis.created_at,
    }
}

fn analysis_from_parts(json: &str, blob: &[u8]) -> Result<Analysis, StoreError> {
    let mut analysis: Analysis = serde_json::from_str(json)?;
    analysis.embedding = deserialize_vector(blob);
    Ok(analysis)
}

fn is_constraint(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn parse_uuid(idx: usize, s: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| conversion_error(idx, format!("bad uuid {s}: {e}")))
}

fn parse_decimal(idx: usize, s: String) -> rusqlite::Result<Decimal> {
    Decimal::from_str(&s).map_err(|e| conversion_error(idx, format!("bad decimal {s}: {e}")))
}

fn parse_verdict(idx: usize, s: String) -> rusqlite::Result<Verdict> {
    Verdict::parse(&s).ok_or_else(|| conversion_error(idx, format!("bad verdict {s}")))
}

fn parse_direction(idx: usize, s: String) -> rusqlite::Result<SignalDirection> {
    SignalDirection::parse(&s).ok_or_else(|| conversion_error(idx, format!("bad direction {s}")))
}

fn ticker_from_row(row: &Row<'_>) -> rusqlite::Result<Ticker> {
    let status: String = row.get(4)?;
    Ok(Ticker {
        symbol: row.get(0)?,
        name: row.get(1)?,
        sector: row.get(2)?,
        market_cap: row
            .get::<_, Option<String>>(3)?
            .map(|s| parse_decimal(3, s))
            .transpose()?,
        watch_status: WatchStatus::parse(&status)
            .ok_or_else(|| conversion_error(4, format!("bad watch status {status}")))?,
        added_at: row.get(5)?,
        removed_at: row.get(6)?,
    })
}

fn signal_from_row(row: &Row<'_>) -> rusqlite::Result<Signal> {
    Ok(Signal {
        id: parse_uuid(0, row.get(0)?)?,
        analysis_id: parse_uuid(1, row.get(1)?)?,
        symbol: row.get(2)?,
        direction: parse_direction(3, row.get(3)?)?,
        pattern_label: row.get(4)?,
        nearest_similarity: row.get(5)?,
        expected_return_pct: row.get(6)?,
        expected_holding_days: row.get(7)?,
        entry_price: parse_decimal(8, row.get(8)?)?,
        embedding: deserialize_vector(&row.get::<_, Vec<u8>>(9)?),
        created_at: row.get(10)?,
    })
}

fn outcome_from_row(row: &Row<'_>) -> rusqlite::Result<Outcome> {
    let mut observations = Vec::new();
    for (i, horizon) in Horizon::ALL.into_iter().enumerate() {
        let base = 3 + i * 3;
        let price: Option<String> = row.get(base)?;
        let return_pct: Option<f64> = row.get(base + 1)?;
        let observed_at: Option<DateTime<Utc>> = row.get(base + 2)?;
        if let (Some(price), Some(return_pct), Some(observed_at)) = (price, return_pct, observed_at)
        {
            observations.push(HorizonObservation {
                horizon,
                price: parse_decimal(base, price)?,
                return_pct,
                observed_at,
            });
        }
    }
    Ok(Outcome {
        signal_id: parse_uuid(0, row.get(0)?)?,
        direction: parse_direction(1, row.get(1)?)?,
        entry_price: parse_decimal(2, row.get(2)?)?,
        observations,
        realized_return_pct: row.get(12)?,
        thesis_validated: row.get(13)?,
        lessons: row.get(14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{analysis, signal_for};
    use ridge_models::snapshot::indicators;
    use rust_decimal_macros::dec;

    fn snapshot(symbol: &str, date: NaiveDate, rank: Option<u32>) -> Snapshot {
        let mut s = Snapshot::new(symbol, dec!(100.00), 60).with_indicator(indicators::RSI, 45.0);
        s.scan_date = date;
        s.priority_rank = rank;
        s
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn ticker_soft_delete_and_reactivate() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.add_ticker(&Ticker::new("acme").with_sector("Industrials")).unwrap();
        assert_eq!(store.watchlist().unwrap().len(), 1);

        assert!(store.remove_ticker("ACME").unwrap());
        assert!(!store.remove_ticker("ACME").unwrap());
        let removed = store.get_ticker("ACME").unwrap().unwrap();
        assert_eq!(removed.watch_status, WatchStatus::Removed);
        assert!(removed.removed_at.is_some());
        assert!(store.watchlist().unwrap().is_empty());

        store.add_ticker(&Ticker::new("ACME")).unwrap();
        let back = store.get_ticker("ACME").unwrap().unwrap();
        assert!(back.is_watched());
        assert_eq!(back.sector.as_deref(), Some("Industrials"));
    }

    #[test]
    fn snapshot_rank_unique_per_date() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_snapshot(&snapshot("AAA", day(2), Some(1))).unwrap();
        store.insert_snapshot(&snapshot("BBB", day(2), Some(2))).unwrap();
        store.insert_snapshot(&snapshot("CCC", day(3), Some(1))).unwrap();

        let err = store.insert_snapshot(&snapshot("DDD", day(2), Some(1))).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        let err = store.insert_snapshot(&snapshot("AAA", day(2), Some(9))).unwrap_err();
        assert!(matches!(err, StoreError::Constraint(_)));
        assert_eq!(store.count("snapshots").unwrap(), 3);
    }

    #[test]
    fn correct_snapshot_keeps_rank() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_snapshot(&snapshot("AAA", day(2), Some(4))).unwrap();
        let mut fixed = snapshot("AAA", day(2), None);
        fixed.price = dec!(101.25);
        let stored = store.correct_snapshot(&fixed).unwrap();
        assert_eq!(stored.priority_rank, Some(4));
        let read = store.get_snapshot("AAA", day(2)).unwrap().unwrap();
        assert_eq!(read.price, dec!(101.25));
        assert_eq!(read.priority_rank, Some(4));

        let missing = snapshot("ZZZ", day(2), None);
        assert!(matches!(
            store.correct_snapshot(&missing),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn analysis_roundtrip_keeps_embedding() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = analysis("ACME", day(2), Verdict::Buy, vec![0.5, 0.5, 0.5, 0.5]);
        let record = store.insert_analysis(&a).unwrap();
        assert_eq!(record.id, a.id);
        let read = store.get_analysis(a.id).unwrap().unwrap();
        assert_eq!(read.embedding, a.embedding);
        assert_eq!(read.verdict, Verdict::Buy);
        assert!(store.get_analysis(Uuid::new_v4()).unwrap().is_none());
        assert_eq!(store.analyses_for_symbol("ACME", 10).unwrap().len(), 1);
        // The ticker row is created on demand
        assert!(store.get_ticker("ACME").unwrap().is_some());
    }

    #[test]
    fn analysis_without_embedding_is_rejected() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = analysis("ACME", day(2), Verdict::Wait, vec![]);
        assert!(matches!(
            store.insert_analysis(&a),
            Err(StoreError::Constraint(_))
        ));
        assert_eq!(store.count("analyses").unwrap(), 0);
    }

    #[test]
    fn signal_requires_analysis_and_creates_shell() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let orphan = signal_for(Uuid::new_v4(), "ACME", SignalDirection::Buy);
        assert!(matches!(
            store.insert_signal(&orphan),
            Err(StoreError::NotFound(_))
        ));

        let a = analysis("ACME", day(2), Verdict::Buy, vec![1.0, 0.0, 0.0, 0.0]);
        store.insert_analysis(&a).unwrap();
        let s = signal_for(a.id, "ACME", SignalDirection::Buy);
        let record = store.insert_signal(&s).unwrap();
        assert_eq!(record.kind, RecordKind::Signal);
        assert_eq!(record.scan_date, day(2));

        let outcome = store.get_outcome(s.id).unwrap().unwrap();
        assert!(outcome.is_empty());
        assert_eq!(outcome.realized_return_pct, None);
        assert_eq!(store.outcome_for_analysis(a.id).unwrap().unwrap().signal_id, s.id);
        assert_eq!(store.get_signal(s.id).unwrap().unwrap().embedding, s.embedding);
    }

    #[test]
    fn outcome_fills_horizons_and_rejects_regression() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = analysis("ACME", day(2), Verdict::Buy, vec![1.0, 0.0, 0.0, 0.0]);
        store.insert_analysis(&a).unwrap();
        let s = signal_for(a.id, "ACME", SignalDirection::Buy);
        store.insert_signal(&s).unwrap();

        let t0 = Utc::now();
        let out = store
            .write_outcome(
                s.id,
                Horizon::D30,
                &OutcomeUpdate {
                    realized_price: dec!(96),
                    realized_return_pct: -4.0,
                    observed_at: t0,
                },
            )
            .unwrap();
        assert_eq!(out.thesis_validated, Some(false));

        let out = store
            .write_outcome(
                s.id,
                Horizon::D90,
                &OutcomeUpdate {
                    realized_price: dec!(112),
                    realized_return_pct: 12.0,
                    observed_at: t0 + Duration::days(60),
                },
            )
            .unwrap();
        assert_eq!(out.observations.len(), 2);
        assert_eq!(out.realized_return_pct, Some(12.0));
        assert_eq!(out.thesis_validated, Some(true));

        let err = store
            .write_outcome(
                s.id,
                Horizon::D30,
                &OutcomeUpdate {
                    realized_price: dec!(90),
                    realized_return_pct: -10.0,
                    observed_at: t0 - Duration::days(1),
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::OutcomeRegression { .. }));
        let kept = store.get_outcome(s.id).unwrap().unwrap();
        assert_eq!(kept.observation(Horizon::D30).unwrap().price, dec!(96));

        store.annotate_outcome(s.id, "held support").unwrap();
        assert_eq!(
            store.get_outcome(s.id).unwrap().unwrap().lessons.as_deref(),
            Some("held support")
        );
        assert!(store.annotate_outcome(Uuid::new_v4(), "x").is_err());
    }

    #[test]
    fn pending_outcomes_lists_elapsed_horizons() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = analysis("ACME", day(2), Verdict::Buy, vec![1.0, 0.0, 0.0, 0.0]);
        store.insert_analysis(&a).unwrap();
        let s = signal_for(a.id, "ACME", SignalDirection::Buy);
        store.insert_signal(&s).unwrap();

        assert!(store.pending_outcomes(s.created_at).unwrap().is_empty());
        let later = s.created_at + Duration::days(100);
        let pending = store.pending_outcomes(later).unwrap();
        let horizons: Vec<Horizon> = pending.iter().map(|p| p.horizon).collect();
        assert_eq!(horizons, vec![Horizon::D30, Horizon::D90]);

        store
            .write_outcome(
                s.id,
                Horizon::D30,
                &OutcomeUpdate {
                    realized_price: dec!(104),
                    realized_return_pct: 4.0,
                    observed_at: later,
                },
            )
            .unwrap();
        let pending = store.pending_outcomes(later).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].horizon, Horizon::D90);
    }

    #[test]
    fn load_index_rows_covers_analyses_and_signals() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let a = analysis("ACME", day(2), Verdict::Buy, vec![1.0, 0.0, 0.0, 0.0]);
        store.insert_analysis(&a).unwrap();
        store
            .insert_signal(&signal_for(a.id, "ACME", SignalDirection::Buy))
            .unwrap();
        let rows = store.load_index_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|(_, v)| v.len() == 4));
    }

    #[test]
    fn wal_mode_on_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ridge.db");
        let store = SqliteStore::open(path.to_str().unwrap()).unwrap();
        let mode: String = store
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
