use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for the simulator
#[derive(Error, Debug)]
pub enum PolysimError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Market data errors
    #[error("Market data unavailable: {0}")]
    MarketDataUnavailable(String),

    // Advisory service errors
    #[error("Advisor reply rejected: {0}")]
    AdvisorReply(String),

    // Ledger errors
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    // Risk management errors
    #[error("Risk limit exceeded: {0}")]
    RiskLimitExceeded(String),

    // Persistence errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for PolysimError
pub type Result<T> = std::result::Result<T, PolysimError>;

/// Specific error types for ledger mutations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient funds. Need ${needed}, have ${available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Insufficient shares. Have {held}, trying to sell {requested}")]
    InsufficientShares { held: Decimal, requested: Decimal },

    #[error("No position in {market_id} ({outcome})")]
    NoPosition { market_id: String, outcome: String },

    #[error("Order below minimum size: ${size} < ${floor}")]
    BelowMinimumSize { size: Decimal, floor: Decimal },
}

/// Specific error types for risk gating
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Max positions reached: {open} >= {max}")]
    MaxPositionsReached { open: usize, max: u32 },

    #[error("Position in {market_id} already at ${value} of ${cap} cap")]
    MarketExposureCap {
        market_id: String,
        value: Decimal,
        cap: Decimal,
    },

    #[error("Confidence {confidence:.2} below minimum {min:.2}")]
    ConfidenceTooLow { confidence: f64, min: f64 },

    #[error("Estimated cost ${cost} exceeds 20% of cash (${cap})")]
    OrderTooLarge { cost: Decimal, cap: Decimal },
}

impl From<LedgerError> for PolysimError {
    fn from(err: LedgerError) -> Self {
        PolysimError::OrderRejected(err.to_string())
    }
}

impl From<RiskError> for PolysimError {
    fn from(err: RiskError) -> Self {
        PolysimError::RiskLimitExceeded(err.to_string())
    }
}
