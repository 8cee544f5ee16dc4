//! Portfolio read model and state bundle
//!
//! Aggregates balance, positions, and trade history behind one API. The
//! summary is derived fresh on every call and never cached.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

use crate::domain::{OrderRequest, OrderResult, Trade};
use crate::persistence::Checkpointable;
use crate::portfolio::{BalanceManager, Position, PositionTracker, TradeExecutor};

/// Derived snapshot of the whole portfolio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub cash: Decimal,
    pub positions_value: Decimal,
    pub total_value: Decimal,
    pub initial_balance: Decimal,
    pub total_pnl: Decimal,
    pub total_pnl_percent: Decimal,
    pub open_positions: usize,
    pub trade_count: usize,
    pub win_rate: f64,
}

/// Owns the three ledger components; the only mutation path is `execute`.
#[derive(Debug, Clone)]
pub struct PortfolioManager {
    balance: BalanceManager,
    positions: PositionTracker,
    executor: TradeExecutor,
}

impl PortfolioManager {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            balance: BalanceManager::new(initial_balance),
            positions: PositionTracker::new(),
            executor: TradeExecutor::new(),
        }
    }

    /// Execute an order against the ledger. The derived total is refreshed
    /// only on a fill; a rejected order leaves the balance record untouched,
    /// timestamp included.
    pub fn execute(&mut self, order: &OrderRequest) -> OrderResult {
        let result = self
            .executor
            .execute(order, &mut self.balance, &mut self.positions);
        if result.success {
            self.balance
                .update_total_value(self.positions.total_value());
        }
        result
    }

    /// Repricing pass, then refresh the balance's derived total value
    pub fn update_prices(&mut self, prices: &HashMap<String, Decimal>) {
        self.positions.update_prices(prices);
        self.balance
            .update_total_value(self.positions.total_value());
    }

    /// Summary recomputed from scratch on every call
    pub fn summary(&self) -> PortfolioSummary {
        let cash = self.balance.cash();
        let positions_value = self.positions.total_value();
        let total_value = cash + positions_value;
        let initial_balance = self.balance.initial_balance();
        let total_pnl = total_value - initial_balance;
        let total_pnl_percent = if initial_balance.is_zero() {
            Decimal::ZERO
        } else {
            total_pnl / initial_balance * Decimal::ONE_HUNDRED
        };

        PortfolioSummary {
            cash,
            positions_value,
            total_value,
            initial_balance,
            total_pnl,
            total_pnl_percent,
            open_positions: self.positions.count(),
            trade_count: self.executor.trade_count(),
            win_rate: self.executor.win_rate(),
        }
    }

    pub fn positions(&self) -> Vec<&Position> {
        self.positions.all()
    }

    pub fn position(&self, market_id: &str, outcome: &str) -> Option<&Position> {
        self.positions.get(market_id, outcome)
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.positions
    }

    pub fn recent_trades(&self, n: usize) -> &[Trade] {
        self.executor.recent(n)
    }

    pub fn trades(&self) -> &[Trade] {
        self.executor.history()
    }

    pub fn cash(&self) -> Decimal {
        self.balance.cash()
    }

    /// Token ids of all open positions, for the repricing fetch
    pub fn held_token_ids(&self) -> Vec<String> {
        self.positions.token_ids()
    }

    /// Reset all three components back to their initial state
    pub fn reset(&mut self) {
        self.balance.reset();
        self.positions.clear();
        self.executor.clear();
    }
}

impl Checkpointable for PortfolioManager {
    fn component_name(&self) -> &str {
        "portfolio"
    }

    fn to_checkpoint(&self) -> serde_json::Value {
        serde_json::json!({
            "balance": self.balance.to_checkpoint(),
            "positions": self.positions.to_checkpoint(),
            "trades": self.executor.to_checkpoint(),
        })
    }

    /// Restore each sub-component independently: a missing or malformed
    /// sub-blob leaves that component at its prior state instead of
    /// corrupting the whole bundle.
    fn from_checkpoint(&mut self, data: &serde_json::Value) -> Result<(), String> {
        let mut failures = Vec::new();

        for (field, component) in [
            ("balance", &mut self.balance as &mut dyn Checkpointable),
            ("positions", &mut self.positions as &mut dyn Checkpointable),
            ("trades", &mut self.executor as &mut dyn Checkpointable),
        ] {
            match data.get(field) {
                Some(blob) => {
                    if let Err(e) = component.from_checkpoint(blob) {
                        warn!("Skipping {field} restore: {e}");
                        failures.push(e);
                    }
                }
                None => {
                    warn!("Checkpoint has no {field} blob, keeping current state");
                    failures.push(format!("missing {field} blob"));
                }
            }
        }

        if failures.len() == 3 {
            Err(format!("no component restored: {}", failures.join("; ")))
        } else {
            Ok(())
        }
    }
}
