//! Local inference backends
//!
//! Every backend exposes the same capability set: availability check, model
//! listing, and text generation. The variant set is closed and chosen by
//! configuration, not by runtime probing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::error::{PolysimError, Result};

/// Which backend variant to construct
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Ollama,
    /// Any OpenAI-compatible local server (LM Studio, llama.cpp, vLLM)
    Openai,
}

impl BackendKind {
    /// Build the backend for this variant
    pub fn connect(self, base_url: &str) -> Box<dyn AdvisoryBackend> {
        match self {
            BackendKind::Ollama => Box::new(OllamaBackend::new(base_url)),
            BackendKind::Openai => Box::new(OpenAiCompatBackend::new(base_url)),
        }
    }
}

/// Capability interface over a local inference backend
#[async_trait]
pub trait AdvisoryBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the backend answers at all
    async fn is_available(&self) -> bool;

    async fn list_models(&self) -> Result<Vec<String>>;

    /// Generate a completion for the prompt
    async fn generate(&self, model: &str, prompt: &str) -> Result<String>;
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .unwrap_or_default()
}

/// Ollama native API backend
pub struct OllamaBackend {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AdvisoryBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn is_available(&self) -> bool {
        self.http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let body: serde_json::Value = self
            .http
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let models = body["models"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|m| m["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let body: serde_json::Value = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&json!({
                "model": model,
                "prompt": prompt,
                "stream": false,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        body["response"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| PolysimError::AdvisorReply("response field missing".to_string()))
    }
}

/// OpenAI-compatible chat completions backend
pub struct OpenAiCompatBackend {
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: http_client(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AdvisoryBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn is_available(&self) -> bool {
        self.http
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let body: serde_json::Value = self
            .http
            .get(format!("{}/v1/models", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let models = body["data"]
            .as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|m| m["id"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(models)
    }

    async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let body: serde_json::Value = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&json!({
                "model": model,
                "messages": [{"role": "user", "content": prompt}],
                "temperature": 0.2,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| PolysimError::AdvisorReply("no completion choices".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_selects_variant() {
        let ollama = BackendKind::Ollama.connect("http://localhost:11434");
        assert_eq!(ollama.name(), "ollama");

        let openai = BackendKind::Openai.connect("http://localhost:1234");
        assert_eq!(openai.name(), "openai-compat");
    }

    #[test]
    fn test_kind_deserializes_lowercase() {
        let kind: BackendKind = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(kind, BackendKind::Openai);
    }
}
