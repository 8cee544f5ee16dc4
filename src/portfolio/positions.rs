//! Open position tracking
//!
//! Positions are keyed by `(market_id, outcome)`. Buys into an existing key
//! merge via weighted-average cost basis; sells realize P&L against the
//! average cost and never move it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::domain::{OrderRequest, PositionKey};
use crate::error::LedgerError;
use crate::persistence::Checkpointable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub market_id: String,
    pub outcome: String,
    pub token_id: String,
    /// Always > 0 while the position exists
    pub shares: Decimal,
    /// Weighted-average cost basis
    pub avg_price: Decimal,
    /// Last known mark
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn key(&self) -> PositionKey {
        PositionKey::new(self.market_id.clone(), self.outcome.clone())
    }

    /// Dollar value at the current mark
    pub fn current_value(&self) -> Decimal {
        self.shares * self.current_price
    }

    /// Dollar cost basis of the remaining shares
    pub fn cost_basis(&self) -> Decimal {
        self.shares * self.avg_price
    }

    fn remark(&mut self, price: Decimal) {
        self.current_price = price;
        self.unrealized_pnl = (price - self.avg_price) * self.shares;
    }
}

/// Outcome of a successful position reduction
#[derive(Debug, Clone, PartialEq)]
pub struct SellFill {
    pub realized_pnl: Decimal,
    pub remaining_shares: Decimal,
}

/// Owns the map of open positions
#[derive(Debug, Clone, Default)]
pub struct PositionTracker {
    positions: HashMap<PositionKey, Position>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add shares for the order's key, merging into an existing position
    /// with a weighted-average cost basis.
    pub fn add_position(&mut self, order: &OrderRequest, shares: Decimal, price: Decimal) {
        assert!(shares > Decimal::ZERO, "shares must be positive");
        assert!(price > Decimal::ZERO, "price must be positive");

        let key = PositionKey::new(order.market_id.clone(), order.outcome.clone());

        match self.positions.get_mut(&key) {
            Some(existing) => {
                let merged_shares = existing.shares + shares;
                existing.avg_price =
                    (existing.shares * existing.avg_price + shares * price) / merged_shares;
                existing.shares = merged_shares;
                existing.remark(price);
                debug!(
                    "Merged {key}: {merged_shares} shares, avg {}",
                    existing.avg_price
                );
            }
            None => {
                let position = Position {
                    market_id: order.market_id.clone(),
                    outcome: order.outcome.clone(),
                    token_id: order.token_id.clone(),
                    shares,
                    avg_price: price,
                    current_price: price,
                    unrealized_pnl: Decimal::ZERO,
                    opened_at: Utc::now(),
                };
                debug!("Opened {key}: {shares} shares @ {price}");
                self.positions.insert(key, position);
            }
        }
    }

    /// Reduce a position by a sell. Fails without mutation when the key is
    /// missing or holds fewer shares than requested; selling never changes
    /// the remaining position's average price. The position is removed when
    /// its shares reach zero.
    pub fn reduce_position(
        &mut self,
        market_id: &str,
        outcome: &str,
        shares: Decimal,
        sell_price: Decimal,
    ) -> Result<SellFill, LedgerError> {
        assert!(shares > Decimal::ZERO, "shares must be positive");
        assert!(sell_price > Decimal::ZERO, "price must be positive");

        let key = PositionKey::new(market_id, outcome);
        let position = self.positions.get_mut(&key).ok_or(LedgerError::NoPosition {
            market_id: market_id.to_string(),
            outcome: outcome.to_string(),
        })?;

        if shares > position.shares {
            return Err(LedgerError::InsufficientShares {
                held: position.shares,
                requested: shares,
            });
        }

        let realized_pnl = (sell_price - position.avg_price) * shares;
        position.shares -= shares;

        let remaining_shares = position.shares;
        if remaining_shares.is_zero() {
            self.positions.remove(&key);
            debug!("Closed {key}, realized {realized_pnl}");
        } else {
            position.remark(sell_price);
            debug!("Reduced {key} to {remaining_shares} shares, realized {realized_pnl}");
        }

        Ok(SellFill {
            realized_pnl,
            remaining_shares,
        })
    }

    /// Repricing pass: positions whose token has a fresh price get a new
    /// mark and unrealized P&L; the rest keep their last mark. A feed can
    /// quote 0 for a resolving market; such marks are ignored so they never
    /// reach the executor as a sell price.
    pub fn update_prices(&mut self, prices: &HashMap<String, Decimal>) {
        for position in self.positions.values_mut() {
            if let Some(price) = prices.get(&position.token_id) {
                if *price > Decimal::ZERO {
                    position.remark(*price);
                } else {
                    warn!(
                        "Ignoring non-positive mark {price} for {}, keeping {}",
                        position.token_id, position.current_price
                    );
                }
            }
        }
    }

    pub fn get(&self, market_id: &str, outcome: &str) -> Option<&Position> {
        self.positions.get(&PositionKey::new(market_id, outcome))
    }

    pub fn has_position(&self, market_id: &str, outcome: &str) -> bool {
        self.get(market_id, outcome).is_some()
    }

    /// All open positions in a market, regardless of outcome
    pub fn in_market(&self, market_id: &str) -> Vec<&Position> {
        self.positions
            .values()
            .filter(|p| p.market_id == market_id)
            .collect()
    }

    pub fn all(&self) -> Vec<&Position> {
        self.positions.values().collect()
    }

    pub fn count(&self) -> usize {
        self.positions.len()
    }

    /// Token ids of every open position (for the repricing fetch)
    pub fn token_ids(&self) -> Vec<String> {
        self.positions
            .values()
            .map(|p| p.token_id.clone())
            .collect()
    }

    /// Total dollar value at current marks
    pub fn total_value(&self) -> Decimal {
        self.positions.values().map(Position::current_value).sum()
    }

    pub fn total_unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
    }
}

impl Checkpointable for PositionTracker {
    fn component_name(&self) -> &str {
        "positions"
    }

    fn to_checkpoint(&self) -> serde_json::Value {
        let entries: Vec<&Position> = self.positions.values().collect();
        serde_json::to_value(entries).unwrap_or(serde_json::Value::Null)
    }

    fn from_checkpoint(&mut self, data: &serde_json::Value) -> Result<(), String> {
        let entries: Vec<Position> = serde_json::from_value(data.clone())
            .map_err(|e| format!("positions checkpoint: {e}"))?;
        if entries.iter().any(|p| p.shares <= Decimal::ZERO) {
            return Err("positions checkpoint: non-positive shares".to_string());
        }
        self.positions = entries.into_iter().map(|p| (p.key(), p)).collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn buy(shares: Decimal, price: Decimal) -> OrderRequest {
        OrderRequest::buy("mkt-1", "YES", "tok-yes", shares, price)
    }

    #[test]
    fn test_first_buy_opens_position() {
        let mut tracker = PositionTracker::new();
        tracker.add_position(&buy(dec!(1000), dec!(0.40)), dec!(1000), dec!(0.40));

        let position = tracker.get("mkt-1", "YES").unwrap();
        assert_eq!(position.shares, dec!(1000));
        assert_eq!(position.avg_price, dec!(0.40));
        assert_eq!(position.current_price, dec!(0.40));
        assert_eq!(position.unrealized_pnl, Decimal::ZERO);
    }

    #[test]
    fn test_merge_uses_weighted_average() {
        let mut tracker = PositionTracker::new();
        tracker.add_position(&buy(dec!(1000), dec!(0.40)), dec!(1000), dec!(0.40));
        tracker.add_position(&buy(dec!(500), dec!(0.50)), dec!(500), dec!(0.50));

        let position = tracker.get("mkt-1", "YES").unwrap();
        assert_eq!(position.shares, dec!(1500));
        // (1000*0.40 + 500*0.50) / 1500 = 650/1500
        assert_eq!(position.avg_price, dec!(650) / dec!(1500));
    }

    #[test]
    fn test_sell_never_moves_avg_price() {
        let mut tracker = PositionTracker::new();
        tracker.add_position(&buy(dec!(1000), dec!(0.40)), dec!(1000), dec!(0.40));
        tracker.add_position(&buy(dec!(500), dec!(0.50)), dec!(500), dec!(0.50));
        let avg_before = tracker.get("mkt-1", "YES").unwrap().avg_price;

        let fill = tracker
            .reduce_position("mkt-1", "YES", dec!(300), dec!(0.60))
            .unwrap();

        // (0.60 - 650/1500) * 300 = 50, up to Decimal's 28-digit precision
        assert_eq!(fill.realized_pnl.round_dp(2), dec!(50.00));
        assert_eq!(fill.remaining_shares, dec!(1200));

        let position = tracker.get("mkt-1", "YES").unwrap();
        assert_eq!(position.avg_price, avg_before);
        assert_eq!(position.current_price, dec!(0.60));
    }

    #[test]
    fn test_full_sell_deletes_position() {
        let mut tracker = PositionTracker::new();
        tracker.add_position(&buy(dec!(100), dec!(0.30)), dec!(100), dec!(0.30));

        let fill = tracker
            .reduce_position("mkt-1", "YES", dec!(100), dec!(0.35))
            .unwrap();
        assert_eq!(fill.remaining_shares, Decimal::ZERO);
        assert!(!tracker.has_position("mkt-1", "YES"));
        assert_eq!(tracker.count(), 0);
    }

    #[test]
    fn test_oversell_fails_without_mutation() {
        let mut tracker = PositionTracker::new();
        tracker.add_position(&buy(dec!(1200), dec!(0.40)), dec!(1200), dec!(0.40));

        let err = tracker
            .reduce_position("mkt-1", "YES", dec!(2000), dec!(0.60))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Insufficient shares. Have 1200, trying to sell 2000"
        );
        assert_eq!(tracker.get("mkt-1", "YES").unwrap().shares, dec!(1200));
    }

    #[test]
    fn test_sell_unknown_key_fails() {
        let mut tracker = PositionTracker::new();
        let err = tracker
            .reduce_position("mkt-9", "NO", dec!(1), dec!(0.50))
            .unwrap_err();
        assert!(matches!(err, LedgerError::NoPosition { .. }));
    }

    #[test]
    fn test_update_prices_skips_missing_tokens() {
        let mut tracker = PositionTracker::new();
        tracker.add_position(&buy(dec!(100), dec!(0.40)), dec!(100), dec!(0.40));
        let other = OrderRequest::buy("mkt-2", "NO", "tok-other", dec!(50), dec!(0.20));
        tracker.add_position(&other, dec!(50), dec!(0.20));

        let prices = HashMap::from([("tok-yes".to_string(), dec!(0.55))]);
        tracker.update_prices(&prices);

        let repriced = tracker.get("mkt-1", "YES").unwrap();
        assert_eq!(repriced.current_price, dec!(0.55));
        assert_eq!(repriced.unrealized_pnl, dec!(15));

        // No fresh price: mark unchanged
        assert_eq!(tracker.get("mkt-2", "NO").unwrap().current_price, dec!(0.20));
    }

    #[test]
    fn test_update_prices_ignores_non_positive_marks() {
        let mut tracker = PositionTracker::new();
        tracker.add_position(&buy(dec!(100), dec!(0.40)), dec!(100), dec!(0.40));

        let prices = HashMap::from([("tok-yes".to_string(), dec!(0))]);
        tracker.update_prices(&prices);
        assert_eq!(tracker.get("mkt-1", "YES").unwrap().current_price, dec!(0.40));

        let prices = HashMap::from([("tok-yes".to_string(), dec!(-0.10))]);
        tracker.update_prices(&prices);
        let position = tracker.get("mkt-1", "YES").unwrap();
        assert_eq!(position.current_price, dec!(0.40));
        assert_eq!(position.unrealized_pnl, Decimal::ZERO);
    }

    #[test]
    fn test_aggregates() {
        let mut tracker = PositionTracker::new();
        tracker.add_position(&buy(dec!(100), dec!(0.40)), dec!(100), dec!(0.40));
        let other = OrderRequest::buy("mkt-2", "NO", "tok-other", dec!(200), dec!(0.25));
        tracker.add_position(&other, dec!(200), dec!(0.25));

        assert_eq!(tracker.count(), 2);
        assert_eq!(tracker.total_value(), dec!(90));
        assert_eq!(tracker.total_unrealized_pnl(), Decimal::ZERO);
        let mut tokens = tracker.token_ids();
        tokens.sort();
        assert_eq!(tokens, vec!["tok-other".to_string(), "tok-yes".to_string()]);
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let mut original = PositionTracker::new();
        original.add_position(&buy(dec!(1000), dec!(0.40)), dec!(1000), dec!(0.40));
        original.add_position(&buy(dec!(500), dec!(0.50)), dec!(500), dec!(0.50));

        let blob = original.to_checkpoint();
        let mut restored = PositionTracker::new();
        restored.from_checkpoint(&blob).unwrap();

        assert_eq!(restored.count(), 1);
        let a = original.get("mkt-1", "YES").unwrap();
        let b = restored.get("mkt-1", "YES").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_corrupt_checkpoint_keeps_state() {
        let mut tracker = PositionTracker::new();
        tracker.add_position(&buy(dec!(10), dec!(0.50)), dec!(10), dec!(0.50));

        assert!(tracker
            .from_checkpoint(&serde_json::json!({"positions": "oops"}))
            .is_err());
        assert_eq!(tracker.count(), 1);
    }
}
