use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A binary market snapshot from the data source.
///
/// Prices are probabilities in [0,1]; each outcome carries its own token id
/// used for live repricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: String,
    pub question: String,
    pub category: String,
    pub yes_price: Decimal,
    pub no_price: Decimal,
    pub volume_24h: Decimal,
    pub yes_token_id: String,
    pub no_token_id: String,
}

impl Market {
    /// Price for an outcome label ("YES"/"NO")
    pub fn price_for(&self, outcome: &str) -> Option<Decimal> {
        match outcome {
            "YES" => Some(self.yes_price),
            "NO" => Some(self.no_price),
            _ => None,
        }
    }

    /// Token id for an outcome label
    pub fn token_for(&self, outcome: &str) -> Option<&str> {
        match outcome {
            "YES" => Some(self.yes_token_id.as_str()),
            "NO" => Some(self.no_token_id.as_str()),
            _ => None,
        }
    }

    /// Distance of the YES price from a coin flip
    pub fn uncertainty(&self) -> Decimal {
        (self.yes_price - rust_decimal_macros::dec!(0.5)).abs()
    }
}

/// One outcome of a multi-outcome event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventOutcome {
    pub name: String,
    pub price: Decimal,
    pub token_id: String,
}

/// A multi-outcome event with ranked outcomes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketEvent {
    pub id: String,
    pub title: String,
    /// Outcomes sorted by price descending
    pub outcomes: Vec<EventOutcome>,
}

impl MarketEvent {
    /// The currently leading outcome, if any
    pub fn favorite(&self) -> Option<&EventOutcome> {
        self.outcomes.first()
    }
}

/// Composite position identity.
///
/// A keyed struct rather than a joined string, so separator characters
/// inside market ids can never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub market_id: String,
    pub outcome: String,
}

impl PositionKey {
    pub fn new(market_id: impl Into<String>, outcome: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            outcome: outcome.into(),
        }
    }
}

impl std::fmt::Display for PositionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.market_id, self.outcome)
    }
}
