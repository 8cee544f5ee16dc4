use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Strategy selector for the market analyzer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Momentum,
    Contrarian,
    Value,
    Random,
    Balanced,
    Llm,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Strategy::Momentum => "momentum",
            Strategy::Contrarian => "contrarian",
            Strategy::Value => "value",
            Strategy::Random => "random",
            Strategy::Balanced => "balanced",
            Strategy::Llm => "llm",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "momentum" => Ok(Strategy::Momentum),
            "contrarian" => Ok(Strategy::Contrarian),
            "value" => Ok(Strategy::Value),
            "random" => Ok(Strategy::Random),
            "balanced" => Ok(Strategy::Balanced),
            "llm" => Ok(Strategy::Llm),
            other => Err(format!("unknown strategy: {other}")),
        }
    }
}

/// Defaults derived from a 1-10 risk level. Pure lookup, no hidden state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskProfile {
    pub max_positions: u32,
    pub position_size: Decimal,
    pub min_confidence: f64,
    pub dca_enabled: bool,
    pub aggressive: bool,
}

impl RiskProfile {
    /// Derive secondary parameters from a risk level (clamped to 1-10)
    pub fn from_level(level: u8) -> Self {
        let level = level.clamp(1, 10);
        Self {
            max_positions: 5 + u32::from(level) * 3,
            position_size: Decimal::from(50 + u64::from(level) * 50),
            min_confidence: 0.7 - f64::from(level) * 0.05,
            dca_enabled: level >= 5,
            aggressive: level >= 8,
        }
    }
}

/// Trading agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Strategy to run each cycle
    pub strategy: Strategy,
    /// Maximum dollar exposure per market
    pub max_position_size: Decimal,
    /// Maximum concurrent open positions
    pub max_positions: u32,
    /// Minimum signal confidence to act on
    pub min_confidence: f64,
    /// Whether allowed decisions actually execute
    pub auto_trade: bool,
    /// Cycle period in milliseconds
    pub trade_interval_ms: u64,
    /// Risk level 1-10
    pub risk_level: u8,
    /// Allow averaging into existing positions
    pub dca_enabled: bool,
}

impl AgentSettings {
    /// Build settings from a risk level using the derived defaults
    pub fn from_risk_level(strategy: Strategy, level: u8, interval_ms: u64) -> Self {
        let profile = RiskProfile::from_level(level);
        Self {
            strategy,
            max_position_size: profile.position_size,
            max_positions: profile.max_positions,
            min_confidence: profile.min_confidence,
            auto_trade: false,
            trade_interval_ms: interval_ms,
            risk_level: level.clamp(1, 10),
            dca_enabled: profile.dca_enabled,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_risk_level(Strategy::Balanced, 5, 60_000)
    }
}

/// Market data source configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    /// Gamma API base URL for market/event listings
    pub gamma_url: String,
    /// CLOB API base URL for live prices
    pub clob_url: String,
    /// Number of markets to pull per cycle
    #[serde(default = "default_market_limit")]
    pub market_limit: usize,
}

fn default_market_limit() -> usize {
    20
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            gamma_url: "https://gamma-api.polymarket.com".to_string(),
            clob_url: "https://clob.polymarket.com".to_string(),
            market_limit: 20,
        }
    }
}

/// Advisory (LLM) backend configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorConfig {
    /// Which backend variant to construct
    #[serde(default)]
    pub backend: crate::ai_clients::BackendKind,
    /// Backend base URL
    #[serde(default = "default_advisor_url")]
    pub base_url: String,
    /// Model name to request
    #[serde(default = "default_advisor_model")]
    pub model: String,
    /// Max markets sent to the advisor per cycle
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

fn default_advisor_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_advisor_model() -> String {
    "llama3.2".to_string()
}

fn default_max_candidates() -> usize {
    5
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            backend: crate::ai_clients::BackendKind::default(),
            base_url: default_advisor_url(),
            model: default_advisor_model(),
            max_candidates: default_max_candidates(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Starting virtual cash
    pub initial_balance: Decimal,
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub data: MarketDataConfig,
    #[serde(default)]
    pub advisor: AdvisorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Portfolio checkpoint file (default: data dir)
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("initial_balance", "100000")?
            .set_default("logging.level", "info")?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(
                File::from(config_dir.join(
                    std::env::var("POLYSIM_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (POLYSIM_AGENT__STRATEGY, etc.)
            .add_source(
                Environment::with_prefix("POLYSIM")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for CLI usage
    pub fn default_config(strategy: Strategy, risk_level: u8, auto_trade: bool) -> Self {
        use rust_decimal_macros::dec;

        let mut agent = AgentSettings::from_risk_level(strategy, risk_level, 60_000);
        agent.auto_trade = auto_trade;

        Self {
            initial_balance: dec!(100000),
            agent,
            data: MarketDataConfig::default(),
            advisor: AdvisorConfig::default(),
            logging: LoggingConfig::default(),
            state_path: None,
        }
    }

    /// Resolve the checkpoint path, falling back to the user data dir
    pub fn state_path(&self) -> PathBuf {
        self.state_path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("polysim")
                .join("portfolio.json")
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.initial_balance <= Decimal::ZERO {
            errors.push("initial_balance must be positive".to_string());
        }

        if self.agent.max_position_size <= Decimal::ZERO {
            errors.push("max_position_size must be positive".to_string());
        }

        if !(0.0..=1.0).contains(&self.agent.min_confidence) {
            errors.push("min_confidence must be between 0 and 1".to_string());
        }

        if self.agent.trade_interval_ms == 0 {
            errors.push("trade_interval_ms must be positive".to_string());
        }

        if !(1..=10).contains(&self.agent.risk_level) {
            errors.push("risk_level must be between 1 and 10".to_string());
        }

        if self.data.market_limit == 0 {
            errors.push("market_limit must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
