use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trade side (buy or sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Order request (what we want to do).
///
/// Carries no derived fields; cost, fees and proceeds are computed by the
/// executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub side: TradeSide,
    pub market_id: String,
    pub outcome: String,
    pub token_id: String,
    pub shares: Decimal,
    pub price: Decimal,
}

impl OrderRequest {
    pub fn buy(
        market_id: impl Into<String>,
        outcome: impl Into<String>,
        token_id: impl Into<String>,
        shares: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            side: TradeSide::Buy,
            market_id: market_id.into(),
            outcome: outcome.into(),
            token_id: token_id.into(),
            shares,
            price,
        }
    }

    pub fn sell(
        market_id: impl Into<String>,
        outcome: impl Into<String>,
        token_id: impl Into<String>,
        shares: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            side: TradeSide::Sell,
            market_id: market_id.into(),
            outcome: outcome.into(),
            token_id: token_id.into(),
            shares,
            price,
        }
    }

    /// Gross dollar value of the order (pre-fee)
    pub fn value(&self) -> Decimal {
        self.shares * self.price
    }
}

/// Immutable record of a fill
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub side: TradeSide,
    pub market_id: String,
    pub outcome: String,
    pub token_id: String,
    pub shares: Decimal,
    pub price: Decimal,
    /// Gross cost for buys / gross proceeds for sells (pre-fee)
    pub total_cost: Decimal,
    pub fees: Decimal,
    /// Realized P&L against cost basis (sells only)
    pub realized_pnl: Option<Decimal>,
    pub executed_at: DateTime<Utc>,
}

/// Result of an order execution. An order either fully succeeds or fully
/// fails with zero side effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub trade: Option<Trade>,
    pub error: Option<String>,
    /// Cash balance after the fill
    pub new_balance: Option<Decimal>,
}

impl OrderResult {
    pub fn filled(trade: Trade, new_balance: Decimal) -> Self {
        Self {
            success: true,
            trade: Some(trade),
            error: None,
            new_balance: Some(new_balance),
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            success: false,
            trade: None,
            error: Some(error.into()),
            new_balance: None,
        }
    }
}
