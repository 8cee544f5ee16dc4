pub mod analyzer;
pub mod risk;

pub use analyzer::MarketAnalyzer;
pub use risk::{ExitReason, RiskManager};
