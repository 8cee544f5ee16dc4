//! Advisory (LLM) client integrations.
//!
//! One capability interface over local inference backends, a closed set of
//! variants selected at configuration time, and a client that turns market
//! context into a structured trading suggestion.

pub mod advisor;
pub mod backends;

pub use advisor::{AdvisorAction, AdvisoryClient, DecisionSuggestion};
pub use backends::{AdvisoryBackend, BackendKind, OllamaBackend, OpenAiCompatBackend};
