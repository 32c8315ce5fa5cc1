use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Well-known indicator names in `Snapshot::indicators`.
///
/// The market-data collaborator may send any names; these are the ones the
/// decision gates and scenario backend read.
pub mod indicators {
    pub const RSI: &str = "rsi";
    pub const MA20: &str = "ma20";
    pub const MA50: &str = "ma50";
    pub const MA200: &str = "ma200";
    pub const RECENT_HIGH: &str = "recent_high";
    pub const HIGH_52W: &str = "high_52w";
    pub const SUPPORT: &str = "support";
    pub const ATR: &str = "atr";
    pub const AVG_VOLUME: &str = "avg_volume";
    pub const DAYS_TO_EARNINGS: &str = "days_to_earnings";
    pub const MARKET_TREND: &str = "market_trend";
    pub const VIX: &str = "vix";
}

/// Fundamental ratios supplied with a snapshot. Any field may be missing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Fundamentals {
    pub pe_ratio: Option<f64>,
    pub sector_median_pe: Option<f64>,
    pub pe_5y_low: Option<f64>,
    pub pe_5y_high: Option<f64>,
    /// Year-over-year, percent.
    pub revenue_growth_pct: Option<f64>,
    /// Year-over-year, percent.
    pub eps_growth_pct: Option<f64>,
    pub debt_to_equity: Option<f64>,
}

impl Fundamentals {
    pub fn is_empty(&self) -> bool {
        self.pe_ratio.is_none()
            && self.revenue_growth_pct.is_none()
            && self.eps_growth_pct.is_none()
    }

    /// P/E relative to the sector median, when both are known and the median is positive.
    pub fn relative_pe(&self) -> Option<f64> {
        match (self.pe_ratio, self.sector_median_pe) {
            (Some(pe), Some(median)) if median > 0.0 => Some(pe / median),
            _ => None,
        }
    }

    /// Strongest growth signal available, percent.
    pub fn best_growth_pct(&self) -> Option<f64> {
        match (self.revenue_growth_pct, self.eps_growth_pct) {
            (Some(r), Some(e)) => Some(r.max(e)),
            (r, e) => r.or(e),
        }
    }
}

/// Point-in-time market, technical and fundamental state of one ticker.
///
/// Produced by the market-data collaborator once per ticker per trading day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub symbol: String,
    pub scan_date: NaiveDate,
    pub captured_at: DateTime<Utc>,
    pub price: Decimal,
    #[serde(default)]
    pub volume: u64,
    #[serde(default)]
    pub sector: Option<String>,
    /// Named technical signals (see [`indicators`]).
    #[serde(default)]
    pub indicators: BTreeMap<String, f64>,
    #[serde(default)]
    pub fundamentals: Fundamentals,
    /// Aggregate news sentiment in [-1, 1].
    #[serde(default)]
    pub news_sentiment: f64,
    /// Scanner priority, 0-100.
    pub priority_score: u8,
    /// Rank among tickers scanned on the same date (1 = highest priority).
    #[serde(default)]
    pub priority_rank: Option<u32>,
    /// Discrete alerts the scanner triggered (e.g. "rsi_oversold", "volume_spike").
    #[serde(default)]
    pub alerts: Vec<String>,
}

impl Snapshot {
    pub fn new(symbol: &str, price: Decimal, priority_score: u8) -> Self {
        let now = Utc::now();
        Self {
            symbol: symbol.to_uppercase(),
            scan_date: now.date_naive(),
            captured_at: now,
            price,
            volume: 0,
            sector: None,
            indicators: BTreeMap::new(),
            fundamentals: Fundamentals::default(),
            news_sentiment: 0.0,
            priority_score,
            priority_rank: None,
            alerts: Vec::new(),
        }
    }

    pub fn with_indicator(mut self, name: &str, value: f64) -> Self {
        self.indicators.insert(name.to_string(), value);
        self
    }

    pub fn indicator(&self, name: &str) -> Option<f64> {
        self.indicators.get(name).copied().filter(|v| v.is_finite())
    }

    pub fn price_f64(&self) -> f64 {
        self.price.to_f64().unwrap_or(0.0)
    }

    /// Most recent swing high the price is measured against.
    pub fn recent_high(&self) -> Option<f64> {
        self.indicator(indicators::RECENT_HIGH)
            .or_else(|| self.indicator(indicators::HIGH_52W))
    }

    /// Nearest support level: explicit support, else the 50-day, else the 200-day average.
    pub fn support_level(&self) -> Option<(&'static str, f64)> {
        [indicators::SUPPORT, indicators::MA50, indicators::MA200]
            .into_iter()
            .find_map(|name| self.indicator(name).map(|v| (name, v)))
    }

    /// Pullback from the recent high, percent. Negative when priced above it.
    pub fn pullback_pct(&self) -> Option<f64> {
        let high = self.recent_high()?;
        if high <= 0.0 {
            return None;
        }
        Some((high - self.price_f64()) / high * 100.0)
    }

    /// Average true range as percent of price.
    pub fn atr_pct(&self) -> Option<f64> {
        let atr = self.indicator(indicators::ATR)?;
        let price = self.price_f64();
        if price <= 0.0 {
            return None;
        }
        Some(atr / price * 100.0)
    }

    /// Reject snapshots the engine cannot reason about.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("symbol is empty".to_string());
        }
        if self.price <= Decimal::ZERO {
            return Err(format!("price must be positive, got {}", self.price));
        }
        if self.priority_score > 100 {
            return Err(format!(
                "priority_score must be 0-100, got {}",
                self.priority_score
            ));
        }
        if !(-1.0..=1.0).contains(&self.news_sentiment) {
            return Err(format!(
                "news_sentiment must be in [-1, 1], got {}",
                self.news_sentiment
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn acme() -> Snapshot {
        Snapshot::new("ACME", dec!(100.00), 72)
            .with_indicator(indicators::MA50, 95.0)
            .with_indicator(indicators::RSI, 28.0)
    }

    #[test]
    fn roundtrip_snapshot() {
        let mut snapshot = acme();
        snapshot.fundamentals.pe_ratio = Some(18.5);
        snapshot.alerts.push("rsi_oversold".to_string());
        let json = serde_json::to_string(&snapshot).unwrap();
        let parsed: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, parsed);
    }

    #[test]
    fn minimal_json_uses_defaults() {
        let json = r#"{
            "symbol": "ACME",
            "scan_date": "2026-03-02",
            "captured_at": "2026-03-02T21:00:00Z",
            "price": "100.00",
            "priority_score": 72
        }"#;
        let snapshot: Snapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.indicators.is_empty());
        assert!(snapshot.fundamentals.is_empty());
        assert_eq!(snapshot.priority_rank, None);
    }

    #[test]
    fn support_prefers_explicit_level() {
        let snapshot = acme().with_indicator(indicators::SUPPORT, 97.0);
        assert_eq!(snapshot.support_level(), Some((indicators::SUPPORT, 97.0)));
        assert_eq!(acme().support_level(), Some((indicators::MA50, 95.0)));
    }

    #[test]
    fn pullback_from_recent_high() {
        let snapshot = acme().with_indicator(indicators::RECENT_HIGH, 110.0);
        let pullback = snapshot.pullback_pct().unwrap();
        assert!((pullback - 9.0909).abs() < 0.001);
        assert_eq!(acme().pullback_pct(), None);
    }

    #[test]
    fn relative_pe_requires_positive_median() {
        let f = Fundamentals {
            pe_ratio: Some(30.0),
            sector_median_pe: Some(15.0),
            ..Default::default()
        };
        assert_eq!(f.relative_pe(), Some(2.0));
        let f = Fundamentals {
            pe_ratio: Some(30.0),
            sector_median_pe: Some(0.0),
            ..Default::default()
        };
        assert_eq!(f.relative_pe(), None);
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(acme().validate().is_ok());
        let mut bad = acme();
        bad.price = dec!(0);
        assert!(bad.validate().is_err());
        let mut bad = acme();
        bad.priority_score = 101;
        assert!(bad.validate().is_err());
        let mut bad = acme();
        bad.news_sentiment = 2.0;
        assert!(bad.validate().is_err());
    }
}
