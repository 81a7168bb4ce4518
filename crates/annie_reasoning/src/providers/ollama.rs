//! Local model server (`/api/chat`, `/api/tags`).

use crate::api_types::{ChatRequest, LlmReply};
use crate::llm::LlmClient;
use crate::providers::chat_messages;
use annie_core::settings::{ProviderConfig, DEFAULT_OLLAMA_URL};
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Value};

pub const DEFAULT_OLLAMA_MODEL: &str = "llama3";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(client: Client, base_url: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    pub fn from_config(client: Client, cfg: &ProviderConfig) -> Self {
        let model = if cfg.model.is_empty() {
            DEFAULT_OLLAMA_MODEL
        } else {
            cfg.model.as_str()
        };
        Self::new(client, cfg.url().unwrap_or(DEFAULT_OLLAMA_URL), model)
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": chat_messages(&request.system, &request.history, &request.input),
            "stream": false,
        });
        if let Some(cfg) = &request.sampling {
            body["options"] = json!({
                "temperature": cfg.temperature,
                "top_p": cfg.top_p,
                "top_k": cfg.top_k,
                "stop": cfg.stop_sequences,
            });
        }
        body
    }
}

#[async_trait::async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, request: ChatRequest) -> Result<LlmReply> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.build_body(&request))
            .send()
            .await
            .context("Failed to send request to Ollama")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Ollama API error {}: {}", status, text);
        }

        let json: Value = response
            .json()
            .await
            .context("Failed to decode Ollama response")?;
        let text = json["message"]["content"].as_str().unwrap_or_default();
        Ok(LlmReply::text(text))
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }
}

/// Names of the models installed on the server. Any failure yields an empty list.
pub async fn list_models(client: &Client, base_url: &str) -> Vec<String> {
    let url = format!("{}/api/tags", base_url.trim_end_matches('/'));
    let response = match client.get(&url).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            tracing::warn!("Ollama model listing returned {}", r.status());
            return vec![];
        }
        Err(e) => {
            tracing::warn!("Failed to fetch Ollama models: {}", e);
            return vec![];
        }
    };
    match response.json::<Value>().await {
        Ok(json) => json["models"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
        Err(e) => {
            tracing::warn!("Malformed Ollama model list: {}", e);
            vec![]
        }
    }
}
