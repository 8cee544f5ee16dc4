//! Risk gating, position sizing, and exit rules
//!
//! The risk manager reads portfolio state but never mutates it: it decides
//! whether a new position may be opened, how large it may be, and when an
//! existing position must be closed.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::AgentSettings;
use crate::domain::MarketAnalysis;
use crate::error::RiskError;
use crate::portfolio::{PortfolioSummary, Position, PositionTracker};

/// Fraction of cash a single order's estimated cost may not exceed
const MAX_ORDER_CASH_FRACTION: Decimal = dec!(0.20);

/// Fraction of cash used as the sizing ceiling
const SIZING_CASH_FRACTION: Decimal = dec!(0.10);

/// Take-profit threshold: unrealized gain over cost basis
const TAKE_PROFIT_PCT: Decimal = dec!(0.50);

/// Stop-loss threshold: unrealized loss over cost basis
const STOP_LOSS_PCT: Decimal = dec!(-0.30);

/// Marks beyond these are treated as effectively resolved
const NEAR_CERTAIN_PRICE: Decimal = dec!(0.95);
const NEAR_WORTHLESS_PRICE: Decimal = dec!(0.02);

/// Why a position should be closed
#[derive(Debug, Clone, PartialEq)]
pub enum ExitReason {
    TakeProfit { gain_pct: Decimal },
    StopLoss { loss_pct: Decimal },
    NearCertain { price: Decimal },
    NearWorthless { price: Decimal },
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::TakeProfit { gain_pct } => {
                write!(f, "Take profit: up {gain_pct}% on cost basis")
            }
            ExitReason::StopLoss { loss_pct } => {
                write!(f, "Stop loss: down {loss_pct}% on cost basis")
            }
            ExitReason::NearCertain { price } => {
                write!(f, "Near-certain outcome at {price}, exiting before resolution")
            }
            ExitReason::NearWorthless { price } => {
                write!(f, "Near-worthless at {price}, salvaging remaining value")
            }
        }
    }
}

/// Enforces position/exposure limits and exit conditions
#[derive(Debug, Clone)]
pub struct RiskManager {
    settings: AgentSettings,
}

impl RiskManager {
    pub fn new(settings: AgentSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Gate a prospective new position. Checks run in a fixed order and the
    /// first failure short-circuits; the error's Display is the reason
    /// surfaced to the operator.
    pub fn can_open(
        &self,
        analysis: &MarketAnalysis,
        positions: &PositionTracker,
        summary: &PortfolioSummary,
    ) -> Result<(), RiskError> {
        // 1. Portfolio-wide position count
        let open = positions.count();
        if open >= self.settings.max_positions as usize {
            return Err(RiskError::MaxPositionsReached {
                open,
                max: self.settings.max_positions,
            });
        }

        // 2. Per-market dollar cap on existing exposure
        let market_value: Decimal = positions
            .in_market(&analysis.market_id)
            .iter()
            .map(|p| p.current_value())
            .sum();
        if !positions.in_market(&analysis.market_id).is_empty()
            && market_value >= self.settings.max_position_size
        {
            return Err(RiskError::MarketExposureCap {
                market_id: analysis.market_id.clone(),
                value: market_value,
                cap: self.settings.max_position_size,
            });
        }

        // 3. Confidence threshold
        if analysis.confidence < self.settings.min_confidence {
            return Err(RiskError::ConfidenceTooLow {
                confidence: analysis.confidence,
                min: self.settings.min_confidence,
            });
        }

        // 4. Estimated order cost vs available cash
        let estimated_cost = analysis.suggested_size * analysis.entry_price;
        let cash_cap = summary.cash * MAX_ORDER_CASH_FRACTION;
        if estimated_cost > cash_cap {
            return Err(RiskError::OrderTooLarge {
                cost: estimated_cost,
                cap: cash_cap,
            });
        }

        Ok(())
    }

    /// Dollar size for an allowed signal. Confidence is squared so
    /// low-conviction signals shrink superlinearly.
    pub fn position_size(&self, analysis: &MarketAnalysis, summary: &PortfolioSummary) -> Decimal {
        let conviction =
            Decimal::from_f64(analysis.confidence * analysis.confidence).unwrap_or(Decimal::ZERO);
        let scaled = analysis.suggested_size * conviction;
        scaled
            .min(self.settings.max_position_size)
            .min(summary.cash * SIZING_CASH_FRACTION)
    }

    /// Exit ladder, by priority: take-profit, stop-loss, forced exits at
    /// effectively-resolved marks.
    pub fn should_close(&self, position: &Position) -> Option<ExitReason> {
        let cost_basis = position.cost_basis();
        if cost_basis > Decimal::ZERO {
            let pnl_pct = position.unrealized_pnl / cost_basis;
            if pnl_pct > TAKE_PROFIT_PCT {
                return Some(ExitReason::TakeProfit {
                    gain_pct: (pnl_pct * Decimal::ONE_HUNDRED).round_dp(1),
                });
            }
            if pnl_pct < STOP_LOSS_PCT {
                return Some(ExitReason::StopLoss {
                    loss_pct: (pnl_pct * Decimal::ONE_HUNDRED).round_dp(1),
                });
            }
        }

        if position.current_price > NEAR_CERTAIN_PRICE {
            return Some(ExitReason::NearCertain {
                price: position.current_price,
            });
        }
        if position.current_price < NEAR_WORTHLESS_PRICE {
            return Some(ExitReason::NearWorthless {
                price: position.current_price,
            });
        }

        None
    }
}
