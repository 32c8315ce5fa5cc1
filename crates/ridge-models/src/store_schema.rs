/// SQLite schema for the context store.
///
/// Analyses, signals and outcomes are append-mostly. Embeddings live in a
/// BLOB column of little-endian f32s on the same row as the record they
/// describe; the in-memory vector index is rebuilt from these columns.
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS analyses (
///     id          TEXT PRIMARY KEY,
///     symbol      TEXT NOT NULL REFERENCES tickers(symbol),
///     scan_date   TEXT NOT NULL,
///     sector      TEXT,
///     verdict     TEXT NOT NULL,
///     confidence  TEXT NOT NULL,
///     degraded    INTEGER NOT NULL,
///     analysis_json TEXT NOT NULL,
///     embedding   BLOB NOT NULL,
///     created_at  TEXT NOT NULL
/// );
/// ```
pub const STORE_DDL: &str = "\
CREATE TABLE IF NOT EXISTS tickers (
    symbol        TEXT PRIMARY KEY,
    name          TEXT,
    sector        TEXT,
    market_cap    TEXT,
    watch_status  TEXT NOT NULL,
    added_at      TEXT NOT NULL,
    removed_at    TEXT
);

CREATE TABLE IF NOT EXISTS snapshots (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol         TEXT NOT NULL REFERENCES tickers(symbol),
    scan_date      TEXT NOT NULL,
    price          TEXT NOT NULL,
    volume         INTEGER NOT NULL,
    priority_score INTEGER NOT NULL,
    priority_rank  INTEGER,
    snapshot_json  TEXT NOT NULL,
    captured_at    TEXT NOT NULL,
    corrected_at   TEXT,
    UNIQUE(symbol, scan_date),
    UNIQUE(scan_date, priority_rank)
);

CREATE TABLE IF NOT EXISTS analyses (
    id            TEXT PRIMARY KEY,
    symbol        TEXT NOT NULL REFERENCES tickers(symbol),
    scan_date     TEXT NOT NULL,
    sector        TEXT,
    verdict       TEXT NOT NULL,
    confidence    TEXT NOT NULL,
    degraded      INTEGER NOT NULL,
    analysis_json TEXT NOT NULL,
    embedding     BLOB NOT NULL,
    created_at    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_analyses_symbol ON analyses(symbol, scan_date);

CREATE TABLE IF NOT EXISTS signals (
    id                    TEXT PRIMARY KEY,
    analysis_id           TEXT NOT NULL REFERENCES analyses(id),
    symbol                TEXT NOT NULL,
    direction             TEXT NOT NULL,
    pattern_label         TEXT NOT NULL,
    nearest_similarity    REAL NOT NULL,
    expected_return_pct   REAL NOT NULL,
    expected_holding_days INTEGER NOT NULL,
    entry_price           TEXT NOT NULL,
    embedding             BLOB NOT NULL,
    created_at            TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_signals_analysis ON signals(analysis_id);

CREATE TABLE IF NOT EXISTS outcomes (
    signal_id        TEXT PRIMARY KEY REFERENCES signals(id),
    entry_price      TEXT NOT NULL,
    price_30d        TEXT,
    return_30d       REAL,
    observed_30d     TEXT,
    price_90d        TEXT,
    return_90d       REAL,
    observed_90d     TEXT,
    price_180d       TEXT,
    return_180d      REAL,
    observed_180d    TEXT,
    realized_return  REAL,
    thesis_validated INTEGER,
    lessons          TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);
";

/// Tables in creation order.
pub const STORE_TABLES: [&str; 5] = ["tickers", "snapshots", "analyses", "signals", "outcomes"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ddl_declares_every_table() {
        for table in STORE_TABLES {
            assert!(
                STORE_DDL.contains(&format!("CREATE TABLE IF NOT EXISTS {table} (")),
                "missing {table}"
            );
        }
    }

    #[test]
    fn embeddings_are_mandatory() {
        assert_eq!(STORE_DDL.matches("BLOB NOT NULL").count(), 2);
    }

    #[test]
    fn rank_is_unique_per_scan_date() {
        assert!(STORE_DDL.contains("UNIQUE(scan_date, priority_rank)"));
    }
}
