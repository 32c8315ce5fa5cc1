use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Buy,
    Sell,
}

impl SignalDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalDirection::Buy => "BUY",
            SignalDirection::Sell => "SELL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(SignalDirection::Buy),
            "SELL" => Some(SignalDirection::Sell),
            _ => None,
        }
    }

    /// Whether a realized return vindicates a signal in this direction.
    pub fn validates(&self, realized_return_pct: f64) -> bool {
        match self {
            SignalDirection::Buy => realized_return_pct > 0.0,
            SignalDirection::Sell => realized_return_pct < 0.0,
        }
    }
}

/// A BUY/SELL assertion derived from one actionable analysis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signal {
    pub id: Uuid,
    pub analysis_id: Uuid,
    pub symbol: String,
    pub direction: SignalDirection,
    /// Short label for the setup (e.g. "oversold_pullback").
    pub pattern_label: String,
    /// Similarity to the nearest historical pattern at signal time.
    pub nearest_similarity: f64,
    /// Expected price move to the exit in percent. Negative for a SELL, so it
    /// carries the same sign convention as `Outcome::realized_return_pct`.
    pub expected_return_pct: f64,
    pub expected_holding_days: u32,
    pub entry_price: Decimal,
    pub created_at: DateTime<Utc>,
    /// Embedding of the pattern rendering. Stored in its own column.
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// Fixed outcome-tracking horizons.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Horizon {
    #[serde(rename = "30d")]
    D30,
    #[serde(rename = "90d")]
    D90,
    #[serde(rename = "180d")]
    D180,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::D30, Horizon::D90, Horizon::D180];

    pub fn days(&self) -> u32 {
        match self {
            Horizon::D30 => 30,
            Horizon::D90 => 90,
            Horizon::D180 => 180,
        }
    }

    pub fn from_days(days: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|h| h.days() == days)
    }

    /// Column suffix used in the outcomes table.
    pub fn column_suffix(&self) -> &'static str {
        match self {
            Horizon::D30 => "30d",
            Horizon::D90 => "90d",
            Horizon::D180 => "180d",
        }
    }
}

/// Realized price at one horizon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HorizonObservation {
    pub horizon: Horizon,
    pub price: Decimal,
    pub return_pct: f64,
    pub observed_at: DateTime<Utc>,
}

/// Input to `write_outcome`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeUpdate {
    pub realized_price: Decimal,
    pub realized_return_pct: f64,
    pub observed_at: DateTime<Utc>,
}

/// Performance tracking for a signal. Created empty with the signal, filled as horizons elapse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outcome {
    pub signal_id: Uuid,
    pub direction: SignalDirection,
    pub entry_price: Decimal,
    pub observations: Vec<HorizonObservation>,
    /// Return at the longest filled horizon.
    pub realized_return_pct: Option<f64>,
    pub thesis_validated: Option<bool>,
    pub lessons: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Outcome {
    pub fn shell(signal: &Signal) -> Self {
        Self {
            signal_id: signal.id,
            direction: signal.direction,
            entry_price: signal.entry_price,
            observations: Vec::new(),
            realized_return_pct: None,
            thesis_validated: None,
            lessons: None,
            created_at: signal.created_at,
            updated_at: signal.created_at,
        }
    }

    pub fn observation(&self, horizon: Horizon) -> Option<&HorizonObservation> {
        self.observations.iter().find(|o| o.horizon == horizon)
    }

    pub fn longest_observation(&self) -> Option<&HorizonObservation> {
        self.observations.iter().max_by_key(|o| o.horizon)
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn horizon_days_roundtrip() {
        for h in Horizon::ALL {
            assert_eq!(Horizon::from_days(h.days()), Some(h));
        }
        assert_eq!(Horizon::from_days(45), None);
        assert_eq!(serde_json::to_string(&Horizon::D90).unwrap(), "\"90d\"");
    }

    #[test]
    fn direction_validation() {
        assert!(SignalDirection::Buy.validates(4.2));
        assert!(!SignalDirection::Buy.validates(-1.0));
        assert!(SignalDirection::Sell.validates(-3.0));
    }

    #[test]
    fn shell_is_empty_and_longest_wins() {
        let signal = Signal {
            id: Uuid::new_v4(),
            analysis_id: Uuid::new_v4(),
            symbol: "ACME".to_string(),
            direction: SignalDirection::Buy,
            pattern_label: "oversold_pullback".to_string(),
            nearest_similarity: 0.0,
            expected_return_pct: 12.0,
            expected_holding_days: 90,
            entry_price: dec!(100),
            created_at: Utc::now(),
            embedding: vec![],
        };
        let mut outcome = Outcome::shell(&signal);
        assert!(outcome.is_empty());
        outcome.observations.push(HorizonObservation {
            horizon: Horizon::D90,
            price: dec!(110),
            return_pct: 10.0,
            observed_at: Utc::now(),
        });
        outcome.observations.push(HorizonObservation {
            horizon: Horizon::D30,
            price: dec!(104),
            return_pct: 4.0,
            observed_at: Utc::now(),
        });
        assert_eq!(outcome.longest_observation().unwrap().horizon, Horizon::D90);
        assert!(outcome.observation(Horizon::D180).is_none());
    }
}
