//! Canonical text rendering of a snapshot for embedding.
//!
//! Exact numbers are bucketed into coarse bands so two setups with similar
//! structure produce mostly the same tokens. The output is deterministic:
//! identical snapshots always render identically.

use ridge_models::snapshot::indicators;
use ridge_models::{Snapshot, Ticker};

pub fn render_snapshot(snapshot: &Snapshot, ticker: &Ticker) -> String {
    let mut lines = Vec::new();
    lines.push(format!("symbol={}", snapshot.symbol.to_lowercase()));
    let sector = ticker
        .sector
        .as_deref()
        .or(snapshot.sector.as_deref())
        .unwrap_or("unknown");
    lines.push(format!("sector={}", token(sector)));

    if let Some(rsi) = snapshot.indicator(indicators::RSI) {
        lines.push(format!("rsi={}", rsi_band(rsi)));
    }
    for (name, label) in [
        (indicators::MA20, "ma20"),
        (indicators::MA50, "ma50"),
        (indicators::MA200, "ma200"),
    ] {
        if let Some(ma) = snapshot.indicator(name) {
            lines.push(format!("price_vs_{label}={}", ma_band(snapshot.price_f64(), ma)));
        }
    }
    if let Some(pullback) = snapshot.pullback_pct() {
        lines.push(format!("pullback={}", pullback_band(pullback)));
    }
    if let Some(avg) = snapshot.indicator(indicators::AVG_VOLUME) {
        if avg > 0.0 {
            lines.push(format!("volume={}", volume_band(snapshot.volume as f64 / avg)));
        }
    }
    lines.push(format!("priority={}", priority_band(snapshot.priority_score)));
    if let Some(rel) = snapshot.fundamentals.relative_pe() {
        lines.push(format!("valuation={}", valuation_band(rel)));
    }
    if let Some(growth) = snapshot.fundamentals.best_growth_pct() {
        lines.push(format!("growth={}", growth_band(growth)));
    }
    lines.push(format!("sentiment={}", sentiment_band(snapshot.news_sentiment)));

    if !snapshot.indicators.is_empty() {
        let names: Vec<String> = snapshot.indicators.keys().map(|k| token(k)).collect();
        lines.push(format!("indicators {}", names.join(" ")));
    }
    if !snapshot.alerts.is_empty() {
        let mut alerts: Vec<String> = snapshot.alerts.iter().map(|a| token(a)).collect();
        alerts.sort();
        alerts.dedup();
        lines.push(format!("alerts {}", alerts.join(" ")));
    }
    lines.join("\n")
}

fn token(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

fn rsi_band(rsi: f64) -> &'static str {
    match rsi {
        r if r < 30.0 => "oversold",
        r if r < 45.0 => "weak",
        r if r < 55.0 => "neutral",
        r if r < 70.0 => "strong",
        _ => "overbought",
    }
}

fn ma_band(price: f64, ma: f64) -> &'static str {
    if ma <= 0.0 {
        return "unknown";
    }
    match (price - ma) / ma * 100.0 {
        d if d < -5.0 => "far_below",
        d if d < -1.0 => "below",
        d if d <= 1.0 => "at",
        d if d <= 5.0 => "above",
        _ => "far_above",
    }
}

fn pullback_band(pct: f64) -> &'static str {
    match pct {
        p if p <= 0.0 => "none",
        p if p < 3.0 => "shallow",
        p if p < 8.0 => "moderate",
        p if p < 15.0 => "deep",
        _ => "severe",
    }
}

fn volume_band(ratio: f64) -> &'static str {
    match ratio {
        r if r < 0.7 => "light",
        r if r < 1.3 => "normal",
        r if r < 2.0 => "heavy",
        _ => "spike",
    }
}

fn priority_band(score: u8) -> &'static str {
    match score {
        s if s < 40 => "low",
        s if s < 70 => "medium",
        _ => "high",
    }
}

fn valuation_band(relative_pe: f64) -> &'static str {
    match relative_pe {
        r if r < 0.8 => "cheap",
        r if r < 1.2 => "fair",
        r if r < 2.0 => "rich",
        _ => "extreme",
    }
}

fn growth_band(pct: f64) -> &'static str {
    match pct {
        g if g < 0.0 => "shrinking",
        g if g < 10.0 => "slow",
        g if g < 25.0 => "moderate",
        _ => "fast",
    }
}

fn sentiment_band(s: f64) -> &'static str {
    match s {
        v if v < -0.3 => "negative",
        v if v > 0.3 => "positive",
        _ => "neutral",
    }
}
