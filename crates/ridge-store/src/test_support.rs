//! Builders for stored records, shared by this crate's tests and downstream crates.

use chrono::{NaiveDate, TimeZone, Utc};
use ridge_models::{
    Analysis, ContextStatus, DebateSummary, RiskPlan, Signal, SignalDirection, Snapshot,
    TradeParameters, TradingPlan, Transcript, Verdict, ANALYSIS_SCHEMA_VERSION,
};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A minimal persisted analysis for `symbol` on `scan_date` with the given embedding.
pub fn analysis(
    symbol: &str,
    scan_date: NaiveDate,
    verdict: Verdict,
    embedding: Vec<f32>,
) -> Analysis {
    let created_at = scan_date
        .and_hms_opt(21, 0, 0)
        .map(|dt| Utc.from_utc_datetime(&dt))
        .unwrap_or_else(Utc::now);
    let mut snapshot = Snapshot::new(symbol, Decimal::new(10_000, 2), 60);
    snapshot.scan_date = scan_date;
    snapshot.captured_at = created_at;
    snapshot.sector = Some("Industrials".to_string());
    Analysis {
        id: Uuid::new_v4(),
        schema_version: ANALYSIS_SCHEMA_VERSION,
        symbol: snapshot.symbol.clone(),
        scan_date,
        created_at,
        snapshot,
        reports: Vec::new(),
        transcript: Transcript::new(),
        debate: DebateSummary::empty(2),
        synthesis: TradingPlan::placeholder("fixture"),
        risk_debate: DebateSummary::empty(1),
        risk_plan: RiskPlan::placeholder("fixture"),
        verdict,
        confidence: Decimal::new(55, 0),
        gates: Vec::new(),
        timing_score: 50.0,
        trade: TradeParameters {
            entry: Decimal::new(9_900, 2),
            stop: Decimal::new(9_100, 2),
            target: Decimal::new(11_500, 2),
            position_size_pct: Decimal::ZERO,
            holding_period_days: 90,
        },
        context_status: ContextStatus::NoPriorContext,
        degradations: Vec::new(),
        embedding,
    }
}

/// A signal tied to `analysis_id`, entered at 100.
pub fn signal_for(analysis_id: Uuid, symbol: &str, direction: SignalDirection) -> Signal {
    Signal {
        id: Uuid::new_v4(),
        analysis_id,
        symbol: symbol.to_string(),
        direction,
        pattern_label: "fixture_pattern".to_string(),
        nearest_similarity: 0.0,
        expected_return_pct: 10.0,
        expected_holding_days: 90,
        entry_price: Decimal::new(100, 0),
        created_at: Utc::now(),
        embedding: vec![0.0, 1.0, 0.0, 0.0],
    }
}
