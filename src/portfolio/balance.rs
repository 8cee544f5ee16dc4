//! Virtual cash balance
//!
//! Invariants: `cash >= 0` at all times and
//! `total_value = cash + positions_value`. `initial_balance` is fixed at
//! creation and is the reference point for total P&L.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::persistence::Checkpointable;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualBalance {
    pub cash: Decimal,
    pub total_value: Decimal,
    pub initial_balance: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// Owns the virtual balance record. Deductions are all-or-nothing.
#[derive(Debug, Clone)]
pub struct BalanceManager {
    balance: VirtualBalance,
}

impl BalanceManager {
    pub fn new(initial_balance: Decimal) -> Self {
        assert!(
            initial_balance > Decimal::ZERO,
            "initial balance must be positive"
        );
        Self {
            balance: VirtualBalance {
                cash: initial_balance,
                total_value: initial_balance,
                initial_balance,
                last_updated: Utc::now(),
            },
        }
    }

    pub fn cash(&self) -> Decimal {
        self.balance.cash
    }

    pub fn total_value(&self) -> Decimal {
        self.balance.total_value
    }

    pub fn initial_balance(&self) -> Decimal {
        self.balance.initial_balance
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.balance.last_updated
    }

    pub fn can_afford(&self, amount: Decimal) -> bool {
        amount <= self.balance.cash
    }

    /// Deduct cash. Returns false (no mutation) on shortfall; there are no
    /// partial deductions.
    pub fn deduct_cash(&mut self, amount: Decimal) -> bool {
        assert!(amount >= Decimal::ZERO, "deduction must be non-negative");
        if amount > self.balance.cash {
            return false;
        }
        self.balance.cash -= amount;
        self.touch();
        debug!("Deducted ${amount}, cash now ${}", self.balance.cash);
        true
    }

    pub fn add_cash(&mut self, amount: Decimal) {
        assert!(amount >= Decimal::ZERO, "credit must be non-negative");
        self.balance.cash += amount;
        self.touch();
        debug!("Credited ${amount}, cash now ${}", self.balance.cash);
    }

    /// Refresh the derived total value from the current positions value
    pub fn update_total_value(&mut self, positions_value: Decimal) {
        self.balance.total_value = self.balance.cash + positions_value;
        self.touch();
    }

    /// Restore cash and total value to the initial balance
    pub fn reset(&mut self) {
        self.balance.cash = self.balance.initial_balance;
        self.balance.total_value = self.balance.initial_balance;
        self.touch();
    }

    fn touch(&mut self) {
        self.balance.last_updated = Utc::now();
    }
}

impl Checkpointable for BalanceManager {
    fn component_name(&self) -> &str {
        "balance"
    }

    fn to_checkpoint(&self) -> serde_json::Value {
        serde_json::to_value(&self.balance).unwrap_or(serde_json::Value::Null)
    }

    fn from_checkpoint(&mut self, data: &serde_json::Value) -> Result<(), String> {
        let restored: VirtualBalance = serde_json::from_value(data.clone())
            .map_err(|e| format!("balance checkpoint: {e}"))?;
        if restored.cash < Decimal::ZERO {
            return Err("balance checkpoint: negative cash".to_string());
        }
        self.balance = restored;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deduct_all_or_nothing() {
        let mut balance = BalanceManager::new(dec!(100));

        assert!(balance.deduct_cash(dec!(40)));
        assert_eq!(balance.cash(), dec!(60));

        // Shortfall leaves cash untouched
        assert!(!balance.deduct_cash(dec!(60.01)));
        assert_eq!(balance.cash(), dec!(60));

        // Exact remaining amount is allowed
        assert!(balance.deduct_cash(dec!(60)));
        assert_eq!(balance.cash(), Decimal::ZERO);
    }

    #[test]
    fn test_total_value_derivation() {
        let mut balance = BalanceManager::new(dec!(1000));
        balance.deduct_cash(dec!(400));
        balance.update_total_value(dec!(450));
        assert_eq!(balance.total_value(), dec!(1050));
    }

    #[test]
    fn test_reset() {
        let mut balance = BalanceManager::new(dec!(1000));
        balance.deduct_cash(dec!(999));
        balance.reset();
        assert_eq!(balance.cash(), dec!(1000));
        assert_eq!(balance.total_value(), dec!(1000));
        assert_eq!(balance.initial_balance(), dec!(1000));
    }

    #[test]
    fn test_mutations_touch_timestamp() {
        let mut balance = BalanceManager::new(dec!(100));
        let before = balance.last_updated();
        std::thread::sleep(std::time::Duration::from_millis(2));
        balance.add_cash(dec!(1));
        assert!(balance.last_updated() > before);
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let mut original = BalanceManager::new(dec!(5000));
        original.deduct_cash(dec!(123.45));
        original.update_total_value(dec!(200));

        let blob = original.to_checkpoint();
        let mut restored = BalanceManager::new(dec!(1));
        restored.from_checkpoint(&blob).unwrap();

        assert_eq!(restored.cash(), original.cash());
        assert_eq!(restored.total_value(), original.total_value());
        assert_eq!(restored.initial_balance(), dec!(5000));
        assert_eq!(restored.last_updated(), original.last_updated());
    }

    #[test]
    fn test_corrupt_checkpoint_keeps_state() {
        let mut balance = BalanceManager::new(dec!(500));
        let err = balance
            .from_checkpoint(&serde_json::json!({"cash": []}))
            .unwrap_err();
        assert!(err.contains("balance checkpoint"));
        assert_eq!(balance.cash(), dec!(500));
    }

    #[test]
    #[should_panic(expected = "non-negative")]
    fn test_negative_deduction_is_fatal() {
        let mut balance = BalanceManager::new(dec!(100));
        balance.deduct_cash(dec!(-1));
    }
}
