//! Autonomous trading agent
//!
//! Periodic cycle over the paper portfolio: refresh market data, reprice
//! holdings, walk the exit ladder, then scan for at most one new entry.
//! Observers subscribe to a broadcast channel; the agent never blocks on
//! slow or absent subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::adapters::MarketDataSource;
use crate::ai_clients::AdvisoryClient;
use crate::config::{AgentSettings, AppConfig, Strategy};
use crate::domain::{Market, MarketAnalysis, OrderRequest, Trade};
use crate::error::LedgerError;
use crate::portfolio::{PortfolioManager, Position};
use crate::strategy::{MarketAnalyzer, RiskManager};

/// Orders below this dollar value are noise and are not placed
const MIN_ORDER_VALUE: Decimal = dec!(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Stopped,
    Running,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Stopped => write!(f, "stopped"),
            AgentStatus::Running => write!(f, "running"),
        }
    }
}

/// Events published on the agent's broadcast channel
#[derive(Debug, Clone)]
pub enum AgentEvent {
    StatusChanged(AgentStatus),
    TradeExecuted(Trade),
    Log(String),
}

struct AgentInner {
    settings: AgentSettings,
    market_limit: usize,
    advisor_candidates: usize,
    data: Arc<dyn MarketDataSource>,
    advisor: Option<AdvisoryClient>,
    analyzer: MarketAnalyzer,
    risk: RiskManager,
    portfolio: Arc<RwLock<PortfolioManager>>,
    events: broadcast::Sender<AgentEvent>,
    running: AtomicBool,
    cycle_in_flight: AtomicBool,
    shutdown: Notify,
}

impl AgentInner {
    fn emit(&self, event: AgentEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.emit(AgentEvent::Log(message));
    }
}

/// Periodic paper-trading agent over one portfolio
pub struct TradingAgent {
    inner: Arc<AgentInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TradingAgent {
    pub fn new(
        config: &AppConfig,
        data: Arc<dyn MarketDataSource>,
        advisor: Option<AdvisoryClient>,
        portfolio: Arc<RwLock<PortfolioManager>>,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        let settings = config.agent.clone();
        Self {
            inner: Arc::new(AgentInner {
                risk: RiskManager::new(settings.clone()),
                settings,
                market_limit: config.data.market_limit,
                advisor_candidates: config.advisor.max_candidates,
                data,
                advisor,
                analyzer: MarketAnalyzer::new(),
                portfolio,
                events,
                running: AtomicBool::new(false),
                cycle_in_flight: AtomicBool::new(false),
                shutdown: Notify::new(),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn status(&self) -> AgentStatus {
        if self.inner.running.load(Ordering::SeqCst) {
            AgentStatus::Running
        } else {
            AgentStatus::Stopped
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.inner.events.subscribe()
    }

    pub fn portfolio(&self) -> Arc<RwLock<PortfolioManager>> {
        self.inner.portfolio.clone()
    }

    /// Start the periodic loop. Already running is a no-op. The first cycle
    /// runs immediately rather than waiting a full interval.
    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("Agent already running, start ignored");
            return;
        }
        self.inner.emit(AgentEvent::StatusChanged(AgentStatus::Running));
        info!(
            "Agent started: strategy={}, interval={}ms, auto_trade={}",
            self.inner.settings.strategy,
            self.inner.settings.trade_interval_ms,
            self.inner.settings.auto_trade
        );

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_millis(inner.settings.trade_interval_ms));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                // Shutdown only interrupts the wait, never a running cycle.
                // The running flag decides; a stale wakeup falls through.
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = inner.shutdown.notified() => {}
                }
                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
                run_cycle(&inner).await;
            }
        });
        *self.task.lock().await = Some(handle);
    }

    /// Stop the loop. Idempotent; a cycle already in flight finishes.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        // Wake the loop out of its inter-cycle wait; the task exits on its
        // own once any in-flight cycle completes.
        self.inner.shutdown.notify_one();
        self.task.lock().await.take();
        self.inner.emit(AgentEvent::StatusChanged(AgentStatus::Stopped));
        info!("Agent stopped");
    }

    pub async fn toggle(&self) -> AgentStatus {
        match self.status() {
            AgentStatus::Running => self.stop().await,
            AgentStatus::Stopped => self.start().await,
        }
        self.status()
    }

    /// Run one cycle now, outside the periodic schedule. Used by the CLI's
    /// one-shot mode and by tests.
    pub async fn tick(&self) {
        run_cycle(&self.inner).await;
    }
}

/// Clears the in-flight flag on every exit path, cancellation and panic
/// included, so a dropped cycle can never wedge future ticks.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One full cycle. Overlap is skipped rather than queued: if the previous
/// cycle is still in flight this tick does nothing.
async fn run_cycle(inner: &AgentInner) {
    if inner.cycle_in_flight.swap(true, Ordering::SeqCst) {
        warn!("Previous cycle still in flight, skipping this tick");
        return;
    }
    let _guard = CycleGuard(&inner.cycle_in_flight);
    cycle_body(inner).await;
}

async fn cycle_body(inner: &AgentInner) {
    debug!("Cycle start");

    // Phase 1: market snapshot. Without fresh data nothing else is safe.
    let markets = match inner.data.fetch_markets(inner.market_limit).await {
        Ok(markets) => markets,
        Err(e) => {
            error!("Market fetch failed, ending cycle: {e}");
            inner.emit(AgentEvent::Log(format!("market fetch failed: {e}")));
            return;
        }
    };

    // Phase 2: reprice holdings at current marks
    reprice_holdings(inner).await;

    // Phase 3: exit ladder over a snapshot of open positions
    evaluate_exits(inner).await;

    // Phase 4: analyze and maybe open one position
    let analyses = analyze_markets(inner, &markets).await;
    open_best_opportunity(inner, analyses).await;

    debug!("Cycle end");
}

async fn reprice_holdings(inner: &AgentInner) {
    let token_ids = inner.portfolio.read().await.held_token_ids();
    if token_ids.is_empty() {
        return;
    }

    match inner.data.fetch_prices(&token_ids).await {
        Ok(prices) => {
            debug!("Repriced {} of {} held tokens", prices.len(), token_ids.len());
            inner.portfolio.write().await.update_prices(&prices);
        }
        Err(e) => warn!("Repricing failed, keeping stale marks: {e}"),
    }
}

async fn evaluate_exits(inner: &AgentInner) {
    let positions: Vec<Position> = inner
        .portfolio
        .read()
        .await
        .positions()
        .into_iter()
        .cloned()
        .collect();

    for position in positions {
        let Some(reason) = inner.risk.should_close(&position) else {
            continue;
        };

        if !inner.settings.auto_trade {
            inner.log(format!("Would close {}: {reason}", position.key()));
            continue;
        }

        let order = OrderRequest::sell(
            position.market_id.clone(),
            position.outcome.clone(),
            position.token_id.clone(),
            position.shares,
            position.current_price,
        );
        let result = inner.portfolio.write().await.execute(&order);
        match result.trade {
            Some(trade) if result.success => {
                inner.log(format!("Closed {}: {reason}", position.key()));
                inner.emit(AgentEvent::TradeExecuted(trade));
            }
            _ => warn!(
                "Exit order rejected for {}: {}",
                position.key(),
                result.error.unwrap_or_default()
            ),
        }
    }
}

async fn analyze_markets(inner: &AgentInner, markets: &[Market]) -> Vec<MarketAnalysis> {
    if inner.settings.strategy == Strategy::Llm {
        let Some(advisor) = &inner.advisor else {
            warn!("LLM strategy configured but no advisor available, holding");
            return Vec::new();
        };

        // Advisory calls are slow, so only the most uncertain markets go out
        let candidates = inner
            .analyzer
            .most_uncertain(markets, inner.advisor_candidates);

        let mut analyses = Vec::with_capacity(candidates.len());
        for market in candidates {
            let (held, cash) = {
                let portfolio = inner.portfolio.read().await;
                let held = portfolio
                    .tracker()
                    .in_market(&market.id)
                    .first()
                    .map(|p| (*p).clone());
                (held, portfolio.cash())
            };
            let analysis = inner
                .analyzer
                .analyze_with_advisor(
                    market,
                    advisor,
                    inner.settings.risk_level,
                    held.as_ref(),
                    cash,
                    inner.settings.dca_enabled,
                )
                .await;
            analyses.push(analysis);
        }
        return analyses;
    }

    markets
        .iter()
        .map(|m| inner.analyzer.analyze(m, inner.settings.strategy))
        .collect()
}

/// Walk opportunities best-first and open at most one position per cycle
async fn open_best_opportunity(inner: &AgentInner, analyses: Vec<MarketAnalysis>) {
    let ranked = inner.analyzer.top_opportunities(analyses, 10);
    if ranked.is_empty() {
        debug!("No actionable signals this cycle");
        return;
    }

    let mut portfolio = inner.portfolio.write().await;
    for analysis in ranked {
        let summary = portfolio.summary();
        if let Err(e) = inner.risk.can_open(&analysis, portfolio.tracker(), &summary) {
            debug!("Rejected {} ({}): {e}", analysis.market_id, analysis.signal);
            continue;
        }

        if analysis.entry_price <= Decimal::ZERO {
            warn!("Skipping {} with non-positive price", analysis.market_id);
            continue;
        }

        let size = inner.risk.position_size(&analysis, &summary);
        if size < MIN_ORDER_VALUE {
            let err = LedgerError::BelowMinimumSize {
                size,
                floor: MIN_ORDER_VALUE,
            };
            debug!("Skipping {}: {err}", analysis.market_id);
            continue;
        }

        let Some(outcome) = analysis.signal.outcome() else {
            continue;
        };

        if !inner.settings.auto_trade {
            inner.log(format!(
                "Would buy ${size} of {} {} at {} ({})",
                analysis.market_id, outcome, analysis.entry_price, analysis.reason
            ));
            return;
        }

        let shares = (size / analysis.entry_price).round_dp(2);
        let order = OrderRequest::buy(
            analysis.market_id.clone(),
            outcome,
            analysis.token_id.clone(),
            shares,
            analysis.entry_price,
        );

        let result = portfolio.execute(&order);
        match result.trade {
            Some(trade) if result.success => {
                inner.log(format!(
                    "Opened {} {} x{} at {} ({})",
                    analysis.market_id, outcome, shares, analysis.entry_price, analysis.reason
                ));
                inner.emit(AgentEvent::TradeExecuted(trade));
                return;
            }
            _ => {
                warn!(
                    "Buy rejected for {}: {}",
                    analysis.market_id,
                    result.error.unwrap_or_default()
                );
                // Try the next opportunity
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MarketEvent;
    use crate::error::Result;
    use async_trait::async_trait;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        DataSource {}

        #[async_trait]
        impl MarketDataSource for DataSource {
            async fn fetch_markets(&self, limit: usize) -> Result<Vec<Market>>;
            async fn fetch_events(&self, limit: usize) -> Result<Vec<MarketEvent>>;
            async fn fetch_prices(&self, token_ids: &[String]) -> Result<HashMap<String, Decimal>>;
        }
    }

    fn trending_market(id: &str, yes: Decimal) -> Market {
        Market {
            id: id.to_string(),
            question: format!("{id}?"),
            category: "test".to_string(),
            yes_price: yes,
            no_price: Decimal::ONE - yes,
            volume_24h: dec!(50000),
            yes_token_id: format!("{id}-yes"),
            no_token_id: format!("{id}-no"),
        }
    }

    fn agent_with(data: MockDataSource, auto_trade: bool) -> TradingAgent {
        let mut config = AppConfig::default_config(Strategy::Momentum, 5, auto_trade);
        config.agent.trade_interval_ms = 10;
        let portfolio = Arc::new(RwLock::new(PortfolioManager::new(dec!(100000))));
        TradingAgent::new(&config, Arc::new(data), None, portfolio)
    }

    #[tokio::test]
    async fn test_cycle_opens_at_most_one_position() {
        let mut data = MockDataSource::new();
        // Three strongly trending markets, all actionable
        data.expect_fetch_markets().returning(|_| {
            Ok(vec![
                trending_market("m1", dec!(0.75)),
                trending_market("m2", dec!(0.80)),
                trending_market("m3", dec!(0.85)),
            ])
        });
        data.expect_fetch_prices().returning(|_| Ok(HashMap::new()));

        let agent = agent_with(data, true);
        agent.tick().await;

        let portfolio = agent.portfolio();
        let portfolio = portfolio.read().await;
        assert_eq!(portfolio.trades().len(), 1);
        // Best-first: m3 has the highest momentum confidence
        assert_eq!(portfolio.trades()[0].market_id, "m3");
    }

    #[tokio::test]
    async fn test_cycle_closes_near_certain_position() {
        let mut data = MockDataSource::new();
        // Nothing actionable to open
        data.expect_fetch_markets()
            .returning(|_| Ok(vec![trending_market("m1", dec!(0.55))]));
        data.expect_fetch_prices().returning(|_| {
            Ok(HashMap::from([("held-yes".to_string(), dec!(0.97))]))
        });

        let agent = agent_with(data, true);
        {
            let portfolio = agent.portfolio();
            let mut portfolio = portfolio.write().await;
            let buy = OrderRequest::buy("held", "YES", "held-yes", dec!(100), dec!(0.80));
            assert!(portfolio.execute(&buy).success);
        }

        agent.tick().await;

        let portfolio = agent.portfolio();
        let portfolio = portfolio.read().await;
        assert_eq!(portfolio.positions().len(), 0);
        let last = portfolio.trades().last().unwrap();
        assert_eq!(last.price, dec!(0.97));
        assert!(last.realized_pnl.is_some());
    }

    #[tokio::test]
    async fn test_observe_mode_decides_without_trading() {
        let mut data = MockDataSource::new();
        data.expect_fetch_markets()
            .returning(|_| Ok(vec![trending_market("m1", dec!(0.80))]));
        data.expect_fetch_prices().returning(|_| Ok(HashMap::new()));

        let agent = agent_with(data, false);
        let mut events = agent.subscribe();
        agent.tick().await;

        let portfolio = agent.portfolio();
        assert_eq!(portfolio.read().await.trades().len(), 0);

        // The decision is still surfaced as a log event
        let mut saw_decision = false;
        while let Ok(event) = events.try_recv() {
            if let AgentEvent::Log(line) = event {
                if line.contains("Would buy") {
                    saw_decision = true;
                }
            }
        }
        assert!(saw_decision);
    }

    #[tokio::test]
    async fn test_zero_mark_from_feed_does_not_kill_cycle() {
        let mut data = MockDataSource::new();
        data.expect_fetch_markets()
            .returning(|_| Ok(vec![trending_market("m1", dec!(0.55))]));
        // A resolving market can quote 0; the mark must not reach the ledger
        data.expect_fetch_prices()
            .returning(|_| Ok(HashMap::from([("held-yes".to_string(), dec!(0))])));

        let agent = agent_with(data, true);
        {
            let portfolio = agent.portfolio();
            let mut portfolio = portfolio.write().await;
            let buy = OrderRequest::buy("held", "YES", "held-yes", dec!(100), dec!(0.80));
            assert!(portfolio.execute(&buy).success);
        }

        agent.tick().await;

        let portfolio = agent.portfolio();
        let portfolio = portfolio.read().await;
        assert_eq!(portfolio.positions().len(), 1);
        assert_eq!(
            portfolio.position("held", "YES").unwrap().current_price,
            dec!(0.80)
        );
        assert_eq!(portfolio.trades().len(), 1);
    }

    #[tokio::test]
    async fn test_data_failure_ends_cycle_quietly() {
        let mut data = MockDataSource::new();
        data.expect_fetch_markets().returning(|_| {
            Err(crate::error::PolysimError::MarketDataUnavailable(
                "connection refused".to_string(),
            ))
        });

        let agent = agent_with(data, true);
        agent.tick().await;

        let portfolio = agent.portfolio();
        assert_eq!(portfolio.read().await.trades().len(), 0);
    }

    struct SlowFirstFetch {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl MarketDataSource for SlowFirstFetch {
        async fn fetch_markets(&self, _limit: usize) -> Result<Vec<Market>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(150)).await;
            }
            Ok(vec![trending_market("m1", dec!(0.85))])
        }

        async fn fetch_events(&self, _limit: usize) -> Result<Vec<MarketEvent>> {
            Ok(Vec::new())
        }

        async fn fetch_prices(&self, _token_ids: &[String]) -> Result<HashMap<String, Decimal>> {
            Ok(HashMap::new())
        }
    }

    #[tokio::test]
    async fn test_stop_mid_cycle_does_not_wedge_later_cycles() {
        let data = SlowFirstFetch {
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let mut config = AppConfig::default_config(Strategy::Momentum, 5, true);
        // Only the immediate first cycle fires on its own
        config.agent.trade_interval_ms = 3_600_000;
        let portfolio = Arc::new(RwLock::new(PortfolioManager::new(dec!(100000))));
        let agent = TradingAgent::new(&config, Arc::new(data), None, portfolio);

        agent.start().await;
        // First cycle is stuck in the slow fetch when stop lands
        tokio::time::sleep(Duration::from_millis(30)).await;
        agent.stop().await;
        assert_eq!(agent.status(), AgentStatus::Stopped);

        // Let the in-flight cycle run to completion, then cycle again
        tokio::time::sleep(Duration::from_millis(250)).await;
        let before = agent.portfolio().read().await.trades().len();
        agent.tick().await;
        let after = agent.portfolio().read().await.trades().len();

        assert_eq!(after, before + 1);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let mut data = MockDataSource::new();
        data.expect_fetch_markets().returning(|_| Ok(Vec::new()));
        data.expect_fetch_prices().returning(|_| Ok(HashMap::new()));

        let agent = agent_with(data, false);
        assert_eq!(agent.status(), AgentStatus::Stopped);

        agent.start().await;
        assert_eq!(agent.status(), AgentStatus::Running);
        // Second start is a no-op
        agent.start().await;
        assert_eq!(agent.status(), AgentStatus::Running);

        agent.stop().await;
        assert_eq!(agent.status(), AgentStatus::Stopped);
        // Second stop is a no-op
        agent.stop().await;
        assert_eq!(agent.status(), AgentStatus::Stopped);

        assert_eq!(agent.toggle().await, AgentStatus::Running);
        assert_eq!(agent.toggle().await, AgentStatus::Stopped);
    }
}
