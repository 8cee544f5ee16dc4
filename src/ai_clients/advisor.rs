//! Advisory client: market context in, structured trading suggestion out
//!
//! The client is constructed once and passed by reference to whatever needs
//! it; there is no process-wide shared instance. Malformed replies degrade
//! to HOLD at confidence 0 rather than erroring.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ai_clients::AdvisoryBackend;
use crate::domain::Market;
use crate::error::Result;
use crate::portfolio::Position;

/// Action suggested by the advisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdvisorAction {
    BuyYes,
    BuyNo,
    Hold,
    Dca,
    Sell,
}

/// Structured suggestion parsed from the advisor's reply
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionSuggestion {
    pub action: AdvisorAction,
    /// Clamped to [0,1]
    pub confidence: f64,
    #[serde(default)]
    pub size: Decimal,
    #[serde(default)]
    pub rationale: String,
}

impl DecisionSuggestion {
    fn hold(rationale: impl Into<String>) -> Self {
        Self {
            action: AdvisorAction::Hold,
            confidence: 0.0,
            size: Decimal::ZERO,
            rationale: rationale.into(),
        }
    }
}

/// Client over one advisory backend and model
pub struct AdvisoryClient {
    backend: Box<dyn AdvisoryBackend>,
    model: String,
}

impl AdvisoryClient {
    pub fn new(backend: Box<dyn AdvisoryBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        self.backend.list_models().await
    }

    /// Ask the advisor for a decision on one market. Transport errors
    /// propagate; malformed content does not (it becomes HOLD).
    pub async fn suggest(
        &self,
        market: &Market,
        risk_level: u8,
        position: Option<&Position>,
        cash: Decimal,
    ) -> Result<DecisionSuggestion> {
        let prompt = build_prompt(market, risk_level, position, cash);
        debug!("Requesting advisory decision for {}", market.id);

        let reply = self.backend.generate(&self.model, &prompt).await?;
        Ok(parse_suggestion(&reply))
    }
}

fn build_prompt(
    market: &Market,
    risk_level: u8,
    position: Option<&Position>,
    cash: Decimal,
) -> String {
    let position_context = match position {
        Some(p) => format!(
            "Existing position: {} shares of {} at avg {} (now {})",
            p.shares, p.outcome, p.avg_price, p.current_price
        ),
        None => "No existing position in this market".to_string(),
    };

    format!(
        r#"You are a prediction-market trading advisor.

Market: {}
Category: {}
YES price: {}
NO price: {}
24h volume: {}
{}
Available cash: ${}
Risk level: {}/10

Decide on one action. Reply with ONLY a JSON object, no other text:
{{"action": "BUY_YES" | "BUY_NO" | "HOLD" | "DCA" | "SELL", "confidence": 0.0-1.0, "size": <dollar amount>, "rationale": "<one sentence>"}}"#,
        market.question,
        market.category,
        market.yes_price,
        market.no_price,
        market.volume_24h,
        position_context,
        cash,
        risk_level,
    )
}

/// Parse a free-text reply into a suggestion. Models wrap JSON in prose and
/// code fences often enough that we extract the first balanced object and
/// fall back to HOLD when nothing parses.
fn parse_suggestion(reply: &str) -> DecisionSuggestion {
    let Some(raw) = extract_json_object(reply) else {
        warn!("Advisor reply had no JSON object, holding");
        return DecisionSuggestion::hold("unparseable advisor reply");
    };

    match serde_json::from_str::<DecisionSuggestion>(raw) {
        Ok(mut suggestion) => {
            suggestion.confidence = suggestion.confidence.clamp(0.0, 1.0);
            if suggestion.size < Decimal::ZERO {
                suggestion.size = Decimal::ZERO;
            }
            suggestion
        }
        Err(e) => {
            warn!("Advisor reply failed to parse ({e}), holding");
            DecisionSuggestion::hold(format!("malformed advisor reply: {e}"))
        }
    }
}

/// First balanced `{...}` in the text, if any
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
