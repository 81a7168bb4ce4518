use crate::api_types::{ChatRequest, LlmReply};
use annie_core::AppSettings;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one non-streaming generation. Non-2xx responses are errors.
    async fn generate(&self, request: ChatRequest) -> Result<LlmReply>;

    /// Name of the backend shape, for logs.
    fn provider_name(&self) -> &'static str;
}

/// Picks the client for the provider currently selected in the settings.
pub trait ClientFactory: Send + Sync {
    fn client_for(&self, settings: &AppSettings) -> Result<Arc<dyn LlmClient>>;
}

/// Always hands out the same client regardless of settings.
pub struct FixedClient(pub Arc<dyn LlmClient>);

impl ClientFactory for FixedClient {
    fn client_for(&self, _settings: &AppSettings) -> Result<Arc<dyn LlmClient>> {
        Ok(self.0.clone())
    }
}
