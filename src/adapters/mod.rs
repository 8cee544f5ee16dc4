//! External data adapters.
//!
//! One capability trait, [`MarketDataSource`], over read-only market data.
//! The production implementation talks to the Polymarket Gamma and CLOB
//! public endpoints; tests substitute a mock.

pub mod gamma;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;

pub use gamma::GammaClient;

use crate::domain::{Market, MarketEvent};
use crate::error::Result;

/// Read-only source of market snapshots and prices
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Active binary markets, highest 24h volume first
    async fn fetch_markets(&self, limit: usize) -> Result<Vec<Market>>;

    /// Active events with their outcome markets
    async fn fetch_events(&self, limit: usize) -> Result<Vec<MarketEvent>>;

    /// Current midpoint price per token id. Tokens that fail to price are
    /// absent from the map rather than failing the whole call.
    async fn fetch_prices(&self, token_ids: &[String]) -> Result<HashMap<String, Decimal>>;
}
