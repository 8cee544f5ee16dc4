//! Polymarket Gamma / CLOB public-data client (no SDK, raw REST).
//!
//! Gamma serves discovery (markets, events); the CLOB midpoint endpoint
//! serves per-token repricing. Gamma stringifies its JSON arrays, so
//! `outcomePrices` and `clobTokenIds` arrive as JSON-encoded strings that
//! need a second parse.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::adapters::MarketDataSource;
use crate::config::MarketDataConfig;
use crate::domain::{EventOutcome, Market, MarketEvent};
use crate::error::{PolysimError, Result};

/// Raw Gamma market payload, fields we care about only
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaMarket {
    id: String,
    question: Option<String>,
    category: Option<String>,
    /// JSON-encoded array of decimal strings, e.g. `"[\"0.65\", \"0.35\"]"`
    outcome_prices: Option<String>,
    /// JSON-encoded array of token id strings
    clob_token_ids: Option<String>,
    #[serde(rename = "volume24hr")]
    volume_24hr: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GammaEvent {
    id: String,
    title: Option<String>,
    #[serde(default)]
    markets: Vec<GammaMarket>,
}

#[derive(Debug, Deserialize)]
struct MidpointResponse {
    mid: String,
}

/// Client over the Gamma and CLOB public endpoints
#[derive(Clone)]
pub struct GammaClient {
    http: Client,
    gamma_url: String,
    clob_url: String,
}

impl GammaClient {
    pub fn new(config: &MarketDataConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PolysimError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            gamma_url: config.gamma_url.trim_end_matches('/').to_string(),
            clob_url: config.clob_url.trim_end_matches('/').to_string(),
        })
    }

    /// Decode one Gamma market into the domain shape. Markets that are not
    /// clean binaries (missing prices or token ids, or not exactly two of
    /// each) are skipped.
    fn normalize(raw: GammaMarket) -> Option<Market> {
        let prices = parse_stringified_array(raw.outcome_prices.as_deref()?)?;
        let token_ids = parse_stringified_array(raw.clob_token_ids.as_deref()?)?;
        if prices.len() != 2 || token_ids.len() != 2 {
            return None;
        }

        let yes_price: Decimal = prices[0].parse().ok()?;
        let no_price: Decimal = prices[1].parse().ok()?;

        Some(Market {
            id: raw.id,
            question: raw.question.unwrap_or_default(),
            category: raw.category.unwrap_or_else(|| "uncategorized".to_string()),
            yes_price,
            no_price,
            volume_24h: Decimal::try_from(raw.volume_24hr.unwrap_or(0.0)).unwrap_or_default(),
            yes_token_id: token_ids[0].clone(),
            no_token_id: token_ids[1].clone(),
        })
    }
}

/// Gamma double-encodes arrays as JSON strings
fn parse_stringified_array(raw: &str) -> Option<Vec<String>> {
    serde_json::from_str(raw).ok()
}

#[async_trait]
impl MarketDataSource for GammaClient {
    async fn fetch_markets(&self, limit: usize) -> Result<Vec<Market>> {
        let url = format!(
            "{}/markets?active=true&closed=false&order=volume24hr&ascending=false&limit={limit}",
            self.gamma_url
        );
        debug!("Fetching markets from {url}");

        let raw: Vec<GammaMarket> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| PolysimError::MarketDataUnavailable(e.to_string()))?
            .json()
            .await?;

        let markets: Vec<Market> = raw.into_iter().filter_map(GammaClient::normalize).collect();
        if markets.is_empty() {
            return Err(PolysimError::MarketDataUnavailable(
                "no binary markets in Gamma response".to_string(),
            ));
        }
        Ok(markets)
    }

    async fn fetch_events(&self, limit: usize) -> Result<Vec<MarketEvent>> {
        let url = format!(
            "{}/events?active=true&closed=false&order=volume24hr&ascending=false&limit={limit}",
            self.gamma_url
        );

        let raw: Vec<GammaEvent> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| PolysimError::MarketDataUnavailable(e.to_string()))?
            .json()
            .await?;

        let events = raw
            .into_iter()
            .map(|event| MarketEvent {
                id: event.id,
                title: event.title.unwrap_or_default(),
                outcomes: event
                    .markets
                    .into_iter()
                    .filter_map(GammaClient::normalize)
                    .map(|m| EventOutcome {
                        name: m.question,
                        price: m.yes_price,
                        token_id: m.yes_token_id,
                    })
                    .collect(),
            })
            .collect();
        Ok(events)
    }

    async fn fetch_prices(&self, token_ids: &[String]) -> Result<HashMap<String, Decimal>> {
        let mut prices = HashMap::new();

        for token_id in token_ids {
            let url = format!("{}/midpoint?token_id={token_id}", self.clob_url);
            let response = match self.http.get(&url).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!("Midpoint request failed for {token_id}: {e}");
                    continue;
                }
            };

            let midpoint: MidpointResponse = match response.error_for_status() {
                Ok(r) => match r.json().await {
                    Ok(m) => m,
                    Err(e) => {
                        warn!("Midpoint decode failed for {token_id}: {e}");
                        continue;
                    }
                },
                Err(e) => {
                    warn!("Midpoint returned error for {token_id}: {e}");
                    continue;
                }
            };

            match midpoint.mid.parse::<Decimal>() {
                Ok(price) => {
                    prices.insert(token_id.clone(), price);
                }
                Err(e) => warn!("Unparseable midpoint {} for {token_id}: {e}", midpoint.mid),
            }
        }

        Ok(prices)
    }
}
