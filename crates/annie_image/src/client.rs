use crate::endpoint::{is_html, normalize_url, view_url};
use crate::error::{ImageError, Result};
use crate::graph::{build_workflow, random_seed, Workflow};
use annie_core::{AppSettings, Character, ImageRenderer};
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;

const NGROK_SKIP_HEADER: &str = "ngrok-skip-browser-warning";
pub(crate) const PROBE_BUDGET: Duration = Duration::from_secs(8);
/// Upper bound on any single HTTP exchange with the server.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long to wait for a queued prompt to produce an image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComfyClient {
    pub(crate) http: Client,
    poll: PollPolicy,
    pub(crate) probe_budget: Duration,
    request_timeout: Duration,
}

impl Default for ComfyClient {
    fn default() -> Self {
        Self::new(Client::new())
    }
}

impl ComfyClient {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            poll: PollPolicy::default(),
            probe_budget: PROBE_BUDGET,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_probe_budget(mut self, budget: Duration) -> Self {
        self.probe_budget = budget;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub(crate) fn request(&self, method: Method, url: &str, skip_warning: bool) -> RequestBuilder {
        let req = self.http.request(method, url).timeout(self.request_timeout);
        if skip_warning {
            req.header(NGROK_SKIP_HEADER, "true")
        } else {
            req
        }
    }

    /// Queue a workflow and return its prompt id.
    pub async fn submit(&self, base: &str, workflow: &Workflow, skip_warning: bool) -> Result<String> {
        let client_id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        let resp = self
            .request(Method::POST, &format!("{}/prompt", base), skip_warning)
            .json(&json!({"prompt": workflow, "client_id": client_id.to_lowercase()}))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            tracing::error!("ComfyUI error ({}): {}", status.as_u16(), text);
            return Err(ImageError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        if is_html(&text) {
            return Err(ImageError::Interstitial);
        }
        let data: Value =
            serde_json::from_str(&text).map_err(|e| ImageError::Malformed(e.to_string()))?;
        data["prompt_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ImageError::Malformed("missing prompt_id".into()))
    }

    /// Poll the history endpoint until an output image appears. Every
    /// attempt counts, including HTML and malformed bodies.
    pub async fn wait_for_image(&self, base: &str, prompt_id: &str, skip_warning: bool) -> Result<String> {
        tokio::time::sleep(self.poll.initial_delay).await;
        let url = format!("{}/history/{}", base, prompt_id);

        for attempt in 1..=self.poll.max_attempts {
            tokio::time::sleep(self.poll.interval).await;
            let text = self
                .request(Method::GET, &url, skip_warning)
                .send()
                .await?
                .text()
                .await?;
            if is_html(&text) {
                tracing::debug!("History attempt {} returned HTML", attempt);
                continue;
            }
            let history: Value = match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!("History attempt {} unparseable: {}", attempt, e);
                    continue;
                }
            };
            if let Some(name) = output_filename(&history, prompt_id) {
                tracing::info!("Image ready after {} attempts", attempt);
                return Ok(name);
            }
        }
        Err(ImageError::Exhausted(self.poll.max_attempts))
    }

    /// Build, submit and await one image; returns its view URL.
    pub async fn generate(&self, prompt: &str, character: &Character, settings: &AppSettings) -> Result<String> {
        let base = normalize_url(&settings.comfy_url);
        let skip = settings.comfy_config.skip_warning();
        let workflow = build_workflow(prompt, &character.appearance, &settings.comfy_config, random_seed());

        let prompt_id = self.submit(&base, &workflow, skip).await?;
        tracing::info!("Queued image prompt {}", prompt_id);
        let filename = self.wait_for_image(&base, &prompt_id, skip).await?;
        Ok(view_url(&base, &filename))
    }
}

/// First image filename among the outputs of `prompt_id`.
fn output_filename(history: &Value, prompt_id: &str) -> Option<String> {
    history
        .get(prompt_id)?
        .get("outputs")?
        .as_object()?
        .values()
        .find_map(|out| out["images"][0]["filename"].as_str())
        .map(str::to_string)
}

#[async_trait]
impl ImageRenderer for ComfyClient {
    async fn render(&self, prompt: &str, character: &Character, settings: &AppSettings) -> Option<String> {
        match self.generate(prompt, character, settings).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("Image generation failed: {}", e);
                None
            }
        }
    }
}
