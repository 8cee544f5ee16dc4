use clap::{Parser, Subcommand};
use polysim::adapters::{GammaClient, MarketDataSource};
use polysim::agent::{AgentEvent, TradingAgent};
use polysim::ai_clients::AdvisoryClient;
use polysim::config::{AppConfig, Strategy};
use polysim::error::{PolysimError, Result};
use polysim::persistence::FileStateStore;
use polysim::portfolio::PortfolioManager;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "polysim", about = "Paper-trading simulator for prediction markets")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config directory
    #[arg(short, long, default_value = "config")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the trading agent loop
    Run {
        /// Strategy: momentum, contrarian, value, random, balanced, llm
        #[arg(short, long)]
        strategy: Option<Strategy>,
        /// Risk level 1-10
        #[arg(short, long)]
        risk_level: Option<u8>,
        /// Execute trades instead of only logging decisions
        #[arg(long)]
        auto_trade: bool,
        /// Discard any saved portfolio and start fresh
        #[arg(long)]
        fresh: bool,
    },
    /// List the most active markets
    Markets {
        /// Number of markets to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// List the most active multi-outcome events
    Events {
        /// Number of events to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Check advisory backend availability and list its models
    Advisor,
    /// Show the saved portfolio
    Portfolio,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Some(Commands::Run {
            strategy,
            risk_level,
            auto_trade,
            fresh,
        }) => {
            init_logging(&config);
            let mut config = config;
            if let Some(strategy) = strategy {
                config.agent.strategy = strategy;
            }
            if let Some(level) = risk_level {
                config.agent = polysim::config::AgentSettings::from_risk_level(
                    config.agent.strategy,
                    level,
                    config.agent.trade_interval_ms,
                );
            }
            if auto_trade {
                config.agent.auto_trade = true;
            }
            run_agent(config, fresh).await?;
        }
        Some(Commands::Markets { limit }) => {
            init_logging_simple();
            show_markets(&config, limit).await?;
        }
        Some(Commands::Events { limit }) => {
            init_logging_simple();
            show_events(&config, limit).await?;
        }
        Some(Commands::Advisor) => {
            init_logging_simple();
            check_advisor(&config).await?;
        }
        Some(Commands::Portfolio) | None => {
            init_logging_simple();
            show_portfolio(&config)?;
        }
    }

    Ok(())
}

fn load_config(config_dir: &str) -> Result<AppConfig> {
    let config = AppConfig::load_from(config_dir)?;
    if let Err(errors) = config.validate() {
        return Err(PolysimError::Validation(errors.join("; ")));
    }
    Ok(config)
}

async fn run_agent(config: AppConfig, fresh: bool) -> Result<()> {
    let store = FileStateStore::new(config.state_path());

    let mut portfolio = PortfolioManager::new(config.initial_balance);
    if fresh {
        info!("Starting with a fresh portfolio");
    } else {
        match store.load(&mut portfolio) {
            Ok(true) => {}
            Ok(false) => info!("No saved portfolio, starting fresh"),
            Err(e) => warn!("Could not restore portfolio: {e}"),
        }
    }
    let portfolio = Arc::new(RwLock::new(portfolio));

    let data = Arc::new(GammaClient::new(&config.data)?);
    let advisor = build_advisor(&config).await;

    let agent = TradingAgent::new(&config, data, advisor, portfolio.clone());
    let mut events = agent.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let AgentEvent::TradeExecuted(trade) = event {
                info!(
                    "{} {} x{} @ {} (fees {})",
                    trade.side, trade.market_id, trade.shares, trade.price, trade.fees
                );
            }
        }
    });

    agent.start().await;
    shutdown_signal().await;
    agent.stop().await;

    // Final checkpoint so the next run resumes where this one left off
    let snapshot = portfolio.read().await;
    if let Err(e) = store.save(&*snapshot) {
        error!("Failed to save portfolio checkpoint: {e}");
    }

    let summary = snapshot.summary();
    info!(
        "Final: cash ${}, total ${}, P&L ${} ({}%)",
        summary.cash.round_dp(2),
        summary.total_value.round_dp(2),
        summary.total_pnl.round_dp(2),
        summary.total_pnl_percent.round_dp(2)
    );
    Ok(())
}

/// Build the advisory client when the LLM strategy is selected and the
/// backend answers; anything else runs without an advisor.
async fn build_advisor(config: &AppConfig) -> Option<AdvisoryClient> {
    if config.agent.strategy != Strategy::Llm {
        return None;
    }

    let backend = config.advisor.backend.connect(&config.advisor.base_url);
    let client = AdvisoryClient::new(backend, config.advisor.model.clone());
    if client.is_available().await {
        info!(
            "Advisor ready: {} at {} (model {})",
            client.backend_name(),
            config.advisor.base_url,
            config.advisor.model
        );
        Some(client)
    } else {
        warn!(
            "Advisory backend at {} not reachable, agent will hold",
            config.advisor.base_url
        );
        Some(client)
    }
}

async fn show_markets(config: &AppConfig, limit: usize) -> Result<()> {
    let client = GammaClient::new(&config.data)?;
    let markets = client.fetch_markets(limit).await?;

    println!("{:<12} {:>7} {:>7} {:>12}  QUESTION", "ID", "YES", "NO", "VOL 24H");
    for market in markets {
        println!(
            "{:<12} {:>7} {:>7} {:>12}  {}",
            market.id,
            market.yes_price,
            market.no_price,
            market.volume_24h.round_dp(0),
            market.question
        );
    }
    Ok(())
}

async fn show_events(config: &AppConfig, limit: usize) -> Result<()> {
    let client = GammaClient::new(&config.data)?;
    let events = client.fetch_events(limit).await?;

    for event in events {
        println!("{} [{}]", event.title, event.id);
        match event.favorite() {
            Some(favorite) => println!("  leading: {} @ {}", favorite.name, favorite.price),
            None => println!("  no binary outcomes listed"),
        }
        for outcome in &event.outcomes {
            println!("    {:>6}  {}", outcome.price, outcome.name);
        }
    }
    Ok(())
}

async fn check_advisor(config: &AppConfig) -> Result<()> {
    let backend = config.advisor.backend.connect(&config.advisor.base_url);
    let client = AdvisoryClient::new(backend, config.advisor.model.clone());

    if !client.is_available().await {
        println!(
            "{} at {} is not reachable",
            client.backend_name(),
            config.advisor.base_url
        );
        return Ok(());
    }

    println!("{} at {} is up", client.backend_name(), config.advisor.base_url);
    for model in client.list_models().await? {
        let marker = if model == config.advisor.model { " (configured)" } else { "" };
        println!("  {model}{marker}");
    }
    Ok(())
}

fn show_portfolio(config: &AppConfig) -> Result<()> {
    let store = FileStateStore::new(config.state_path());
    let mut portfolio = PortfolioManager::new(config.initial_balance);
    let restored = store.load(&mut portfolio)?;
    if !restored {
        println!("No saved portfolio at {}", store.path().display());
        return Ok(());
    }

    let summary = portfolio.summary();
    println!("Cash:        ${}", summary.cash.round_dp(2));
    println!("Positions:   ${}", summary.positions_value.round_dp(2));
    println!("Total:       ${}", summary.total_value.round_dp(2));
    println!(
        "P&L:         ${} ({}%)",
        summary.total_pnl.round_dp(2),
        summary.total_pnl_percent.round_dp(2)
    );
    println!("Open:        {}", summary.open_positions);
    println!("Trades:      {}", summary.trade_count);
    println!("Win rate:    {:.0}%", summary.win_rate * 100.0);

    for position in portfolio.positions() {
        println!(
            "  {} x{} @ {} (now {}, unrealized {})",
            position.key(),
            position.shares,
            position.avg_price,
            position.current_price,
            position.unrealized_pnl.round_dp(2)
        );
    }
    Ok(())
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},polysim=debug", config.logging.level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn init_logging_simple() {
    // Minimal logging for one-shot CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
