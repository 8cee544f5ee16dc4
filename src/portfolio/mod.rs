//! Paper-trading ledger: balance, positions, execution, aggregate read model.
//!
//! Single-writer rule: only the executor path (via `PortfolioManager`)
//! mutates balance and positions.

pub mod balance;
pub mod executor;
pub mod manager;
pub mod positions;

pub use balance::{BalanceManager, VirtualBalance};
pub use executor::{TradeExecutor, FEE_RATE};
pub use manager::{PortfolioManager, PortfolioSummary};
pub use positions::{Position, PositionTracker};
