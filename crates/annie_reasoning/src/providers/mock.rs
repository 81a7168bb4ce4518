//! Scripted client for tests and offline runs.

use crate::api_types::{ChatRequest, LlmReply};
use crate::llm::LlmClient;
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::Mutex;

pub const MOCK_REPLY: &str = "(Mock reply) I received your message.";

/// Replays queued replies in order and records every request it sees.
/// Once the script runs out it answers with [`MOCK_REPLY`].
#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<Result<LlmReply, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let m = Self::new();
        for r in replies {
            m.push_reply(LlmReply::text(r));
        }
        m
    }

    pub fn push_reply(&self, reply: LlmReply) {
        if let Ok(mut q) = self.script.lock() {
            q.push_back(Ok(reply));
        }
    }

    pub fn push_error(&self, message: &str) {
        if let Ok(mut q) = self.script.lock() {
            q.push_back(Err(message.to_string()));
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, request: ChatRequest) -> Result<LlmReply> {
        if let Ok(mut r) = self.requests.lock() {
            r.push(request);
        }
        let next = self.script.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => anyhow::bail!(message),
            None => Ok(LlmReply::text(MOCK_REPLY)),
        }
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
