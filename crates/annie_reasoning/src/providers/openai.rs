//! Chat-completions shape, shared by OpenAI-compatible endpoints and the
//! self-hosted tata-core server.

use crate::api_types::{ChatRequest, LlmReply};
use crate::llm::LlmClient;
use crate::providers::chat_messages;
use annie_core::settings::ProviderConfig;
use annie_core::ProviderKind;
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    name: &'static str,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompatClient {
    pub fn new(client: Client, kind: ProviderKind, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            name: kind.as_str(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_config(client: Client, kind: ProviderKind, cfg: &ProviderConfig) -> Result<Self> {
        let base_url = cfg
            .url()
            .with_context(|| format!("No base URL configured for provider {}", kind))?;
        Ok(Self::new(
            client,
            kind,
            base_url,
            cfg.api_key.as_deref().unwrap_or_default(),
            &cfg.model,
        ))
    }
}

#[async_trait::async_trait]
impl LlmClient for OpenAiCompatClient {
    async fn generate(&self, request: ChatRequest) -> Result<LlmReply> {
        let payload = json!({
            "model": self.model,
            "messages": chat_messages(&request.system, &request.history, &request.input),
        });
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", self.name))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("{} API error {}: {}", self.name, status, text);
        }

        let json: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to decode {} response", self.name))?;
        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default();
        Ok(LlmReply::text(text))
    }

    fn provider_name(&self) -> &'static str {
        self.name
    }
}
