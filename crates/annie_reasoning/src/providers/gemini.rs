//! Managed multimodal API (`generateContent`).

use crate::api_types::{ChatRequest, LlmReply, TurnRole};
use crate::llm::LlmClient;
use annie_core::character::DEFAULT_CHARACTER_MODEL;
use annie_core::message::Source;
use annie_core::settings::{env_api_key, ProviderConfig};
use anyhow::{Context, Result};
use reqwest::Client;
use serde_json::{json, Map, Value};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(client: Client, api_key: &str, model: &str) -> Self {
        Self {
            client,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    /// Key from the provider record, else from the environment.
    pub fn from_config(client: Client, cfg: &ProviderConfig) -> Self {
        let api_key = cfg
            .key()
            .map(str::to_string)
            .or_else(env_api_key)
            .unwrap_or_default();
        let mut c = Self::new(client, &api_key, &cfg.model);
        if let Some(url) = cfg.url() {
            c.base_url = url.to_string();
        }
        c
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Character model, then provider model, then the built-in default.
    fn resolve_model<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .filter(|m| !m.is_empty())
            .or(Some(self.model.as_str()).filter(|m| !m.is_empty()))
            .unwrap_or(DEFAULT_CHARACTER_MODEL)
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        let mut contents: Vec<Value> = request
            .history
            .iter()
            .map(|t| {
                let role = match t.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "model",
                };
                json!({"role": role, "parts": [{"text": t.text}]})
            })
            .collect();

        let mut current: Vec<Value> = request
            .images
            .iter()
            .map(|img| json!({"inlineData": {"mimeType": img.mime_type, "data": img.data}}))
            .collect();
        current.push(json!({"text": request.input}));
        contents.push(json!({"role": "user", "parts": current}));

        let mut body = json!({ "contents": contents });

        if !request.system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": request.system}]});
        }

        let mut gen = Map::new();
        if let Some(cfg) = &request.sampling {
            gen.insert("temperature".into(), json!(cfg.temperature));
            gen.insert("topP".into(), json!(cfg.top_p));
            gen.insert("topK".into(), json!(cfg.top_k));
            gen.insert("maxOutputTokens".into(), json!(cfg.max_output_tokens));
        }
        if let Some(schema) = &request.response_schema {
            gen.insert("responseMimeType".into(), json!("application/json"));
            gen.insert("responseSchema".into(), schema.clone());
        }
        if !gen.is_empty() {
            body["generationConfig"] = Value::Object(gen);
        }

        if request.use_search {
            body["tools"] = json!([{"googleSearch": {}}]);
        }
        body
    }
}

/// Concatenated candidate text and web grounding sources.
fn parse_reply(resp: &Value) -> LlmReply {
    let candidate = &resp["candidates"][0];
    let text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let sources = candidate["groundingMetadata"]["groundingChunks"]
        .as_array()
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|c| {
                    let web = c.get("web")?;
                    Some(Source {
                        title: web["title"].as_str().unwrap_or_default().to_string(),
                        uri: web["uri"].as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    LlmReply {
        text: if text.is_empty() { "...".to_string() } else { text },
        sources,
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, request: ChatRequest) -> Result<LlmReply> {
        let model = self.resolve_model(request.model.as_deref());
        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let body = self.build_body(&request);
        tracing::debug!("Gemini request to model {}", model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Gemini")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini API error {}: {}", status, text);
        }

        let json: Value = response
            .json()
            .await
            .context("Failed to decode Gemini response")?;
        Ok(parse_reply(&json))
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}
