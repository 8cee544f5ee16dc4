//! Strategy signal generation
//!
//! Pure functions from a market snapshot to a trading signal, one evaluator
//! per strategy, plus the advisor-delegated path. The analyzer holds no
//! state; the random strategy draws from thread-local entropy.

use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

use crate::ai_clients::{AdvisorAction, AdvisoryClient};
use crate::config::Strategy;
use crate::domain::{Market, MarketAnalysis, Signal};
use crate::portfolio::Position;

/// Momentum threshold: a side above this is trending
const MOMENTUM_THRESHOLD: Decimal = dec!(0.6);

/// Contrarian band: fade sides priced inside this range
const CONTRARIAN_LOW: Decimal = dec!(0.05);
const CONTRARIAN_HIGH: Decimal = dec!(0.25);

/// Value band: |yes - 0.5| below this is a near coin-flip
const VALUE_BAND: Decimal = dec!(0.15);

/// Dollar sizing bounds for edge-scaled suggestions
const MIN_SUGGESTED_SIZE: Decimal = dec!(10);
const MAX_SUGGESTED_SIZE: Decimal = dec!(500);

/// Fixed suggestion for strategies without an edge-scaled size
const FLAT_SUGGESTED_SIZE: Decimal = dec!(50);

/// Stateless strategy evaluator
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketAnalyzer;

impl MarketAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate one market under the selected strategy. The LLM strategy is
    /// asynchronous and goes through [`MarketAnalyzer::analyze_with_advisor`];
    /// calling it here yields HOLD.
    pub fn analyze(&self, market: &Market, strategy: Strategy) -> MarketAnalysis {
        match strategy {
            Strategy::Momentum => self.momentum(market),
            Strategy::Contrarian => self.contrarian(market),
            Strategy::Value => self.value(market),
            Strategy::Random => self.random(market),
            Strategy::Balanced => self.balanced(market),
            Strategy::Llm => MarketAnalysis::hold(market, 0.0, "llm strategy requires advisor"),
        }
    }

    /// Follow the trending side once it clears the momentum threshold.
    fn momentum(&self, market: &Market) -> MarketAnalysis {
        if market.yes_price > MOMENTUM_THRESHOLD {
            let confidence = market.yes_price.to_f64().unwrap_or(0.0).min(0.9);
            return buy(
                market,
                Signal::BuyYes,
                confidence,
                format!("YES trending at {}", market.yes_price),
                edge_scaled_size(market.yes_price),
            );
        }
        if market.no_price > MOMENTUM_THRESHOLD {
            let confidence = market.no_price.to_f64().unwrap_or(0.0).min(0.9);
            return buy(
                market,
                Signal::BuyNo,
                confidence,
                format!("NO trending at {}", market.no_price),
                edge_scaled_size(market.no_price),
            );
        }
        MarketAnalysis::hold(market, 0.3, "no side above momentum threshold")
    }

    /// Fade extreme undervaluation: buy a side priced deep below fair.
    fn contrarian(&self, market: &Market) -> MarketAnalysis {
        if in_contrarian_band(market.yes_price, CONTRARIAN_HIGH) {
            return buy(
                market,
                Signal::BuyYes,
                0.6,
                format!("YES undervalued at {}", market.yes_price),
                FLAT_SUGGESTED_SIZE,
            );
        }
        if in_contrarian_band(market.no_price, CONTRARIAN_HIGH) {
            return buy(
                market,
                Signal::BuyNo,
                0.6,
                format!("NO undervalued at {}", market.no_price),
                FLAT_SUGGESTED_SIZE,
            );
        }
        MarketAnalysis::hold(market, 0.3, "no side in the contrarian band")
    }

    /// Near coin-flips: buy whichever side is cheaper.
    fn value(&self, market: &Market) -> MarketAnalysis {
        if market.uncertainty() < VALUE_BAND {
            let (signal, price) = if market.yes_price <= market.no_price {
                (Signal::BuyYes, market.yes_price)
            } else {
                (Signal::BuyNo, market.no_price)
            };
            return buy(
                market,
                signal,
                0.55,
                format!("near coin-flip, cheaper side at {price}"),
                FLAT_SUGGESTED_SIZE,
            );
        }
        MarketAnalysis::hold(market, 0.3, "price too far from a coin-flip")
    }

    /// Baseline for comparison: 30% BUY_YES, 30% BUY_NO, 40% HOLD.
    fn random(&self, market: &Market) -> MarketAnalysis {
        let roll: f64 = rand::thread_rng().gen();
        if roll < 0.3 {
            buy(market, Signal::BuyYes, 0.5, "random draw: YES", FLAT_SUGGESTED_SIZE)
        } else if roll < 0.6 {
            buy(market, Signal::BuyNo, 0.5, "random draw: NO", FLAT_SUGGESTED_SIZE)
        } else {
            MarketAnalysis::hold(market, 0.5, "random draw: hold")
        }
    }

    /// Layered combination: strong momentum first, then a tighter
    /// contrarian band, else hold.
    fn balanced(&self, market: &Market) -> MarketAnalysis {
        let strong = dec!(0.7);
        if market.yes_price > strong {
            return buy(
                market,
                Signal::BuyYes,
                0.7,
                format!("strong YES momentum at {}", market.yes_price),
                edge_scaled_size(market.yes_price),
            );
        }
        if market.no_price > strong {
            return buy(
                market,
                Signal::BuyNo,
                0.7,
                format!("strong NO momentum at {}", market.no_price),
                edge_scaled_size(market.no_price),
            );
        }

        let band_high = dec!(0.2);
        if in_contrarian_band(market.yes_price, band_high) {
            return buy(
                market,
                Signal::BuyYes,
                0.5,
                format!("YES deeply discounted at {}", market.yes_price),
                FLAT_SUGGESTED_SIZE,
            );
        }
        if in_contrarian_band(market.no_price, band_high) {
            return buy(
                market,
                Signal::BuyNo,
                0.5,
                format!("NO deeply discounted at {}", market.no_price),
                FLAT_SUGGESTED_SIZE,
            );
        }

        MarketAnalysis::hold(market, 0.4, "no momentum or discount edge")
    }

    /// Delegate the decision to the advisory service. Transport or parse
    /// failures degrade to HOLD at confidence 0 with the error as reason.
    pub async fn analyze_with_advisor(
        &self,
        market: &Market,
        advisor: &AdvisoryClient,
        risk_level: u8,
        held: Option<&Position>,
        cash: Decimal,
        dca_enabled: bool,
    ) -> MarketAnalysis {
        let suggestion = match advisor.suggest(market, risk_level, held, cash).await {
            Ok(suggestion) => suggestion,
            Err(e) => {
                warn!("Advisor call failed for {}: {e}", market.id);
                return MarketAnalysis::hold(market, 0.0, e.to_string());
            }
        };

        let signal = match suggestion.action {
            AdvisorAction::BuyYes => Signal::BuyYes,
            AdvisorAction::BuyNo => Signal::BuyNo,
            AdvisorAction::Hold => Signal::Hold,
            // DCA means adding to the side we already hold
            AdvisorAction::Dca => match held {
                Some(p) if dca_enabled && p.outcome == "YES" => Signal::BuyYes,
                Some(p) if dca_enabled && p.outcome == "NO" => Signal::BuyNo,
                _ => Signal::Hold,
            },
            // Exits are owned by the risk ladder, not opportunity scanning
            AdvisorAction::Sell => Signal::Hold,
        };

        match signal.outcome() {
            Some(outcome) => MarketAnalysis {
                market_id: market.id.clone(),
                question: market.question.clone(),
                signal,
                confidence: suggestion.confidence,
                reason: suggestion.rationale,
                suggested_size: if suggestion.size > Decimal::ZERO {
                    suggestion.size
                } else {
                    FLAT_SUGGESTED_SIZE
                },
                entry_price: market.price_for(outcome).unwrap_or_default(),
                token_id: market
                    .token_for(outcome)
                    .unwrap_or_default()
                    .to_string(),
            },
            None => MarketAnalysis::hold(market, suggestion.confidence, suggestion.rationale),
        }
    }

    /// The n markets whose YES price sits nearest 0.5, i.e. the most
    /// uncertain ones. Bounds advisory-call volume per cycle.
    pub fn most_uncertain<'a>(&self, markets: &'a [Market], n: usize) -> Vec<&'a Market> {
        let mut ranked: Vec<&Market> = markets.iter().collect();
        ranked.sort_by(|a, b| a.uncertainty().cmp(&b.uncertainty()));
        ranked.truncate(n);
        ranked
    }

    /// Non-HOLD analyses ranked by confidence descending, top k.
    pub fn top_opportunities(
        &self,
        mut analyses: Vec<MarketAnalysis>,
        k: usize,
    ) -> Vec<MarketAnalysis> {
        analyses.retain(|a| a.signal.is_actionable());
        analyses.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        analyses.truncate(k);
        analyses
    }
}

fn in_contrarian_band(price: Decimal, high: Decimal) -> bool {
    price > CONTRARIAN_LOW && price < high
}

/// Size scaled by the price's distance from 0.5, amplified and clamped
fn edge_scaled_size(price: Decimal) -> Decimal {
    let edge = (price - dec!(0.5)).abs();
    (edge * dec!(5) * dec!(100)).clamp(MIN_SUGGESTED_SIZE, MAX_SUGGESTED_SIZE)
}

fn buy(
    market: &Market,
    signal: Signal,
    confidence: f64,
    reason: impl Into<String>,
    suggested_size: Decimal,
) -> MarketAnalysis {
    let reason = reason.into();
    let Some(outcome) = signal.outcome() else {
        return MarketAnalysis::hold(market, confidence, reason);
    };
    MarketAnalysis {
        market_id: market.id.clone(),
        question: market.question.clone(),
        signal,
        confidence,
        reason,
        suggested_size,
        entry_price: market.price_for(outcome).unwrap_or_default(),
        token_id: market.token_for(outcome).unwrap_or_default().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(yes: Decimal) -> Market {
        Market {
            id: format!("mkt-{yes}"),
            question: "test?".to_string(),
            category: "test".to_string(),
            yes_price: yes,
            no_price: Decimal::ONE - yes,
            volume_24h: dec!(1000),
            yes_token_id: "ty".to_string(),
            no_token_id: "tn".to_string(),
        }
    }

    #[test]
    fn test_momentum_buys_trending_side() {
        let analyzer = MarketAnalyzer::new();

        let a = analyzer.analyze(&market(dec!(0.75)), Strategy::Momentum);
        assert_eq!(a.signal, Signal::BuyYes);
        assert!((a.confidence - 0.75).abs() < 1e-9);
        assert_eq!(a.entry_price, dec!(0.75));
        assert_eq!(a.token_id, "ty");

        let a = analyzer.analyze(&market(dec!(0.25)), Strategy::Momentum);
        assert_eq!(a.signal, Signal::BuyNo);

        let a = analyzer.analyze(&market(dec!(0.55)), Strategy::Momentum);
        assert_eq!(a.signal, Signal::Hold);
        assert!((a.confidence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_momentum_confidence_capped() {
        let analyzer = MarketAnalyzer::new();
        let a = analyzer.analyze(&market(dec!(0.98)), Strategy::Momentum);
        assert!((a.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_momentum_size_scaling() {
        // |0.75 - 0.5| * 5 * 100 = 125
        assert_eq!(edge_scaled_size(dec!(0.75)), dec!(125));
        // Clamped low: |0.51 - 0.5| * 500 = 5 -> 10
        assert_eq!(edge_scaled_size(dec!(0.51)), dec!(10));
        // Clamped high: |0.99 - 0.5| * 500 = 245 stays, 1.0 would exceed 500 only past the clamp
        assert_eq!(edge_scaled_size(dec!(0.99)), dec!(245));
    }

    #[test]
    fn test_contrarian_fades_cheap_side() {
        let analyzer = MarketAnalyzer::new();

        let a = analyzer.analyze(&market(dec!(0.10)), Strategy::Contrarian);
        assert_eq!(a.signal, Signal::BuyYes);
        assert!((a.confidence - 0.6).abs() < 1e-9);

        // NO at 0.10 when YES at 0.90
        let a = analyzer.analyze(&market(dec!(0.90)), Strategy::Contrarian);
        assert_eq!(a.signal, Signal::BuyNo);

        // Band is exclusive at both ends
        let a = analyzer.analyze(&market(dec!(0.05)), Strategy::Contrarian);
        assert_eq!(a.signal, Signal::Hold);
    }

    #[test]
    fn test_value_buys_cheaper_side_near_coin_flip() {
        let analyzer = MarketAnalyzer::new();

        let a = analyzer.analyze(&market(dec!(0.45)), Strategy::Value);
        assert_eq!(a.signal, Signal::BuyYes);
        assert!((a.confidence - 0.55).abs() < 1e-9);

        let a = analyzer.analyze(&market(dec!(0.58)), Strategy::Value);
        assert_eq!(a.signal, Signal::BuyNo);

        let a = analyzer.analyze(&market(dec!(0.70)), Strategy::Value);
        assert_eq!(a.signal, Signal::Hold);
    }

    #[test]
    fn test_balanced_layering() {
        let analyzer = MarketAnalyzer::new();

        // Strong momentum wins
        let a = analyzer.analyze(&market(dec!(0.80)), Strategy::Balanced);
        assert_eq!(a.signal, Signal::BuyYes);
        assert!((a.confidence - 0.7).abs() < 1e-9);

        // Contrarian band at lower conviction
        let a = analyzer.analyze(&market(dec!(0.15)), Strategy::Balanced);
        assert_eq!(a.signal, Signal::BuyYes);
        assert!((a.confidence - 0.5).abs() < 1e-9);

        // Neither
        let a = analyzer.analyze(&market(dec!(0.55)), Strategy::Balanced);
        assert_eq!(a.signal, Signal::Hold);
        assert!((a.confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_random_distribution_is_roughly_partitioned() {
        let analyzer = MarketAnalyzer::new();
        let m = market(dec!(0.50));

        let mut holds = 0;
        let mut buys = 0;
        for _ in 0..1000 {
            let a = analyzer.analyze(&m, Strategy::Random);
            assert!((a.confidence - 0.5).abs() < 1e-9);
            if a.signal == Signal::Hold {
                holds += 1;
            } else {
                buys += 1;
            }
        }
        // 40% hold / 60% buy with generous slack
        assert!(holds > 250 && holds < 550, "holds = {holds}");
        assert!(buys > 450 && buys < 750, "buys = {buys}");
    }

    #[test]
    fn test_most_uncertain_ranks_by_distance_from_half() {
        let analyzer = MarketAnalyzer::new();
        let markets = vec![market(dec!(0.9)), market(dec!(0.52)), market(dec!(0.3))];

        let picked = analyzer.most_uncertain(&markets, 2);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].yes_price, dec!(0.52));
        assert_eq!(picked[1].yes_price, dec!(0.3));
    }

    #[test]
    fn test_top_opportunities_filters_and_ranks() {
        let analyzer = MarketAnalyzer::new();
        let m = market(dec!(0.5));

        let analyses = vec![
            MarketAnalysis::hold(&m, 0.9, "hold"),
            MarketAnalysis {
                confidence: 0.6,
                ..buy(&m, Signal::BuyYes, 0.6, "a", dec!(50))
            },
            MarketAnalysis {
                confidence: 0.8,
                ..buy(&m, Signal::BuyNo, 0.8, "b", dec!(50))
            },
        ];

        let top = analyzer.top_opportunities(analyses, 5);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].signal, Signal::BuyNo);
        assert_eq!(top[1].signal, Signal::BuyYes);

        let top = analyzer.top_opportunities(
            vec![
                buy(&m, Signal::BuyYes, 0.6, "a", dec!(50)),
                buy(&m, Signal::BuyNo, 0.8, "b", dec!(50)),
            ],
            1,
        );
        assert_eq!(top.len(), 1);
        assert!((top[0].confidence - 0.8).abs() < 1e-9);
    }
}
