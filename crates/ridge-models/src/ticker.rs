use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WatchStatus {
    #[default]
    Watching,
    /// Soft-deleted from the watchlist. The row and its history stay.
    Removed,
}

impl WatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchStatus::Watching => "watching",
            WatchStatus::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "watching" => Some(WatchStatus::Watching),
            "removed" => Some(WatchStatus::Removed),
            _ => None,
        }
    }
}

/// A watchlist ticker. The symbol is the identity; name, sector and market
/// cap are mutable metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticker {
    pub symbol: String,
    pub name: Option<String>,
    pub sector: Option<String>,
    pub market_cap: Option<Decimal>,
    pub watch_status: WatchStatus,
    pub added_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl Ticker {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            name: None,
            sector: None,
            market_cap: None,
            watch_status: WatchStatus::Watching,
            added_at: Utc::now(),
            removed_at: None,
        }
    }

    pub fn with_sector(mut self, sector: &str) -> Self {
        self.sector = Some(sector.to_string());
        self
    }

    pub fn is_watched(&self) -> bool {
        self.watch_status == WatchStatus::Watching
    }
}
