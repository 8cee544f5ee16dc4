//! Trade execution against the paper ledger
//!
//! The executor is the single writer over balance and positions: it
//! validates an order, applies it fully or not at all, and appends the fill
//! to the trade history. Fills are instant at the quoted price with a 0.1%
//! fee on gross value. Execution is deliberately not idempotent: two calls
//! with identical content are two independent decisions and two trades.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{OrderRequest, OrderResult, Trade, TradeSide};
use crate::error::LedgerError;
use crate::persistence::Checkpointable;
use crate::portfolio::{BalanceManager, PositionTracker};

/// Fixed fee rate applied to gross order value
pub const FEE_RATE: Decimal = dec!(0.001);

/// Validates and applies orders, recording the append-only trade history
#[derive(Debug, Clone, Default)]
pub struct TradeExecutor {
    trades: Vec<Trade>,
}

impl TradeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute an order against the ledger. A rejected order leaves balance,
    /// positions, and history untouched and reports the reason in the
    /// result.
    pub fn execute(
        &mut self,
        order: &OrderRequest,
        balance: &mut BalanceManager,
        positions: &mut PositionTracker,
    ) -> OrderResult {
        assert!(order.shares > Decimal::ZERO, "order shares must be positive");
        assert!(order.price > Decimal::ZERO, "order price must be positive");

        match order.side {
            TradeSide::Buy => self.execute_buy(order, balance, positions),
            TradeSide::Sell => self.execute_sell(order, balance, positions),
        }
    }

    fn execute_buy(
        &mut self,
        order: &OrderRequest,
        balance: &mut BalanceManager,
        positions: &mut PositionTracker,
    ) -> OrderResult {
        let total_cost = order.value();
        let fees = total_cost * FEE_RATE;
        let total_with_fees = total_cost + fees;

        if !balance.can_afford(total_with_fees) {
            let err = LedgerError::InsufficientFunds {
                needed: total_with_fees,
                available: balance.cash(),
            };
            warn!("Buy rejected: {err}");
            return OrderResult::rejected(err.to_string());
        }

        // can_afford was just checked; a false here would be a logic bug
        let deducted = balance.deduct_cash(total_with_fees);
        debug_assert!(deducted);

        positions.add_position(order, order.shares, order.price);

        let trade = self.record(order, total_cost, fees, None);
        info!(
            "BUY {} {} @ {} (${total_cost} + ${fees} fee)",
            order.shares, order.outcome, order.price
        );
        OrderResult::filled(trade, balance.cash())
    }

    fn execute_sell(
        &mut self,
        order: &OrderRequest,
        balance: &mut BalanceManager,
        positions: &mut PositionTracker,
    ) -> OrderResult {
        let fill = match positions.reduce_position(
            &order.market_id,
            &order.outcome,
            order.shares,
            order.price,
        ) {
            Ok(fill) => fill,
            Err(err) => {
                warn!("Sell rejected: {err}");
                return OrderResult::rejected(err.to_string());
            }
        };

        let proceeds = order.value();
        let fees = proceeds * FEE_RATE;
        let net_proceeds = proceeds - fees;
        balance.add_cash(net_proceeds);

        let trade = self.record(order, proceeds, fees, Some(fill.realized_pnl));
        info!(
            "SELL {} {} @ {} (net ${net_proceeds}, realized {})",
            order.shares, order.outcome, order.price, fill.realized_pnl
        );
        OrderResult::filled(trade, balance.cash())
    }

    fn record(
        &mut self,
        order: &OrderRequest,
        total_cost: Decimal,
        fees: Decimal,
        realized_pnl: Option<Decimal>,
    ) -> Trade {
        let trade = Trade {
            id: Uuid::new_v4(),
            side: order.side,
            market_id: order.market_id.clone(),
            outcome: order.outcome.clone(),
            token_id: order.token_id.clone(),
            shares: order.shares,
            price: order.price,
            total_cost,
            fees,
            realized_pnl,
            executed_at: Utc::now(),
        };
        self.trades.push(trade.clone());
        trade
    }

    // ==================== Queries ====================

    pub fn history(&self) -> &[Trade] {
        &self.trades
    }

    pub fn recent(&self, n: usize) -> &[Trade] {
        let start = self.trades.len().saturating_sub(n);
        &self.trades[start..]
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Fraction of SELL trades with positive realized P&L; 0 when there are
    /// no sells yet.
    pub fn win_rate(&self) -> f64 {
        let sells: Vec<&Trade> = self
            .trades
            .iter()
            .filter(|t| t.side == TradeSide::Sell)
            .collect();
        if sells.is_empty() {
            return 0.0;
        }
        let wins = sells
            .iter()
            .filter(|t| t.realized_pnl.is_some_and(|pnl| pnl > Decimal::ZERO))
            .count();
        wins as f64 / sells.len() as f64
    }

    /// Cumulative realized P&L over all sells
    pub fn total_realized_pnl(&self) -> Decimal {
        self.trades.iter().filter_map(|t| t.realized_pnl).sum()
    }

    /// Cumulative fees paid on both sides
    pub fn total_fees(&self) -> Decimal {
        self.trades.iter().map(|t| t.fees).sum()
    }

    pub fn clear(&mut self) {
        self.trades.clear();
    }
}

impl Checkpointable for TradeExecutor {
    fn component_name(&self) -> &str {
        "trades"
    }

    fn to_checkpoint(&self) -> serde_json::Value {
        serde_json::to_value(&self.trades).unwrap_or(serde_json::Value::Null)
    }

    fn from_checkpoint(&mut self, data: &serde_json::Value) -> Result<(), String> {
        let trades: Vec<Trade> =
            serde_json::from_value(data.clone()).map_err(|e| format!("trades checkpoint: {e}"))?;
        self.trades = trades;
        Ok(())
    }
}
