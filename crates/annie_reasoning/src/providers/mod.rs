//! Text backends and the dispatcher that picks one from the settings.

pub mod gemini;
pub mod mock;
pub mod ollama;
pub mod openai;

use crate::api_types::{ChatTurn, TurnRole};
use crate::llm::{ClientFactory, LlmClient};
use annie_core::{AppSettings, ProviderKind};
use anyhow::Result;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

pub use gemini::GeminiClient;
pub use mock::MockLlmClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiCompatClient;

/// Builds a real HTTP client for whichever provider the settings select.
/// All clients share one connection pool.
#[derive(Debug, Clone, Default)]
pub struct ProviderDispatcher {
    http: Client,
}

impl ProviderDispatcher {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientFactory for ProviderDispatcher {
    fn client_for(&self, settings: &AppSettings) -> Result<Arc<dyn LlmClient>> {
        let kind = settings.api_provider;
        let cfg = settings.provider_configs.get(kind);
        let client: Arc<dyn LlmClient> = match kind {
            ProviderKind::Gemini => Arc::new(GeminiClient::from_config(self.http.clone(), cfg)),
            ProviderKind::Ollama => Arc::new(OllamaClient::from_config(self.http.clone(), cfg)),
            ProviderKind::OpenaiCompatible | ProviderKind::TataCore => Arc::new(
                OpenAiCompatClient::from_config(self.http.clone(), kind, cfg)?,
            ),
        };
        tracing::debug!("Dispatching to {} provider", client.provider_name());
        Ok(client)
    }
}

/// Role/content message list shared by the chat-completions shapes:
/// system prompt first, then history, then the current input.
pub(crate) fn chat_messages(system: &str, history: &[ChatTurn], input: &str) -> Vec<Value> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(json!({"role": "system", "content": system}));
    for turn in history {
        let role = match turn.role {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        };
        messages.push(json!({"role": role, "content": turn.text}));
    }
    messages.push(json!({"role": "user", "content": input}));
    messages
}
