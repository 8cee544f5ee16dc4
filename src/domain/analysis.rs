use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A strategy's recommended action for a market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    BuyYes,
    BuyNo,
    Hold,
}

impl Signal {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Signal::Hold)
    }

    /// Outcome label the signal buys into, if any
    pub fn outcome(&self) -> Option<&'static str> {
        match self {
            Signal::BuyYes => Some("YES"),
            Signal::BuyNo => Some("NO"),
            Signal::Hold => None,
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Signal::BuyYes => write!(f, "BUY_YES"),
            Signal::BuyNo => write!(f, "BUY_NO"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// Output of one strategy evaluation over one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub market_id: String,
    pub question: String,
    pub signal: Signal,
    /// Self-reported certainty in [0,1]
    pub confidence: f64,
    pub reason: String,
    /// Suggested dollar size before risk sizing
    pub suggested_size: Decimal,
    /// Quoted price of the chosen outcome (0 for HOLD)
    pub entry_price: Decimal,
    /// Token id of the chosen outcome (empty for HOLD)
    pub token_id: String,
}

impl MarketAnalysis {
    /// A HOLD analysis with a reason, used both as the neutral strategy
    /// output and as the degraded result of a failed advisory call.
    pub fn hold(market: &crate::domain::Market, confidence: f64, reason: impl Into<String>) -> Self {
        Self {
            market_id: market.id.clone(),
            question: market.question.clone(),
            signal: Signal::Hold,
            confidence,
            reason: reason.into(),
            suggested_size: Decimal::ZERO,
            entry_price: Decimal::ZERO,
            token_id: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_outcome() {
        assert_eq!(Signal::BuyYes.outcome(), Some("YES"));
        assert_eq!(Signal::BuyNo.outcome(), Some("NO"));
        assert_eq!(Signal::Hold.outcome(), None);
        assert!(!Signal::Hold.is_actionable());
    }
}
