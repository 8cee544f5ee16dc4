pub mod analysis;
pub mod market;
pub mod order;

pub use analysis::{MarketAnalysis, Signal};
pub use market::{EventOutcome, Market, MarketEvent, PositionKey};
pub use order::{OrderRequest, OrderResult, Trade, TradeSide};
