pub mod adapters;
pub mod agent;
pub mod ai_clients;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod portfolio;
pub mod strategy;

pub use adapters::{GammaClient, MarketDataSource};
pub use agent::{AgentEvent, AgentStatus, TradingAgent};
pub use ai_clients::{AdvisoryBackend, AdvisoryClient, BackendKind, DecisionSuggestion};
pub use config::{AgentSettings, AppConfig, RiskProfile, Strategy};
pub use domain::{
    Market, MarketAnalysis, MarketEvent, OrderRequest, OrderResult, PositionKey, Signal, Trade,
    TradeSide,
};
pub use error::{LedgerError, PolysimError, Result, RiskError};
pub use persistence::{Checkpointable, FileStateStore};
pub use portfolio::{
    BalanceManager, PortfolioManager, PortfolioSummary, Position, PositionTracker, TradeExecutor,
};
pub use strategy::{ExitReason, MarketAnalyzer, RiskManager};
