//! Model and sampler lists advertised by the server.

use crate::client::ComfyClient;
use crate::endpoint::{is_html, normalize_url};
use annie_core::AppSettings;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComfyResources {
    pub checkpoints: Vec<String>,
    pub loras: Vec<String>,
    pub samplers: Vec<String>,
    pub schedulers: Vec<String>,
}

impl ComfyResources {
    /// Store the lists on the settings; the LoRA list gains a leading `None`.
    pub fn apply_to(&self, settings: &mut AppSettings) {
        settings.apply_comfy_resources(
            self.checkpoints.clone(),
            self.loras.clone(),
            self.samplers.clone(),
            self.schedulers.clone(),
        );
    }
}

/// `input.required.<field>[0]` of a node class, as strings.
fn choices(info: &Value, class: &str, field: &str) -> Vec<String> {
    info[class]["input"]["required"][field][0]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Parse an `/object_info` body. HTML and malformed JSON yield `None`.
pub fn parse_object_info(body: &str) -> Option<ComfyResources> {
    if is_html(body) {
        tracing::error!("Received HTML instead of JSON, likely a tunnel warning page");
        return None;
    }
    let info: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Object info is not valid JSON: {}", e);
            return None;
        }
    };
    Some(ComfyResources {
        checkpoints: choices(&info, "CheckpointLoaderSimple", "ckpt_name"),
        loras: choices(&info, "LoraLoader", "lora_name"),
        samplers: choices(&info, "KSampler", "sampler_name"),
        schedulers: choices(&info, "KSampler", "scheduler"),
    })
}

impl ComfyClient {
    pub async fn fetch_resources(&self, url: &str, skip_warning: bool) -> Option<ComfyResources> {
        let target = normalize_url(url);
        let resp = self
            .request(Method::GET, &format!("{}/object_info", target), skip_warning)
            .send()
            .await;
        let resp = match resp {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::error!("Failed to fetch ComfyUI resources: HTTP {}", r.status().as_u16());
                return None;
            }
            Err(e) => {
                tracing::error!("Failed to fetch ComfyUI resources: {}", e);
                return None;
            }
        };
        let text = resp.text().await.ok()?;
        parse_object_info(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object_info() {
        let body = json!({
            "CheckpointLoaderSimple": {"input": {"required": {"ckpt_name": [["a.safetensors", "b.safetensors"]]}}},
            "KSampler": {"input": {"required": {
                "sampler_name": [["euler", "dpmpp_2m"]],
                "scheduler": [["karras"]]
            }}}
        })
        .to_string();
        let res = parse_object_info(&body).unwrap();
        assert_eq!(res.checkpoints, vec!["a.safetensors", "b.safetensors"]);
        assert!(res.loras.is_empty());
        assert_eq!(res.samplers, vec!["euler", "dpmpp_2m"]);
        assert_eq!(res.schedulers, vec!["karras"]);
    }

    #[test]
    fn test_html_and_garbage_rejected() {
        assert_eq!(parse_object_info("<html>ngrok</html>"), None);
        assert_eq!(parse_object_info("{oops"), None);
    }

    #[test]
    fn test_apply_prefixes_none() {
        let res = ComfyResources {
            checkpoints: vec!["c".into()],
            loras: vec!["l".into()],
            samplers: vec!["s".into()],
            schedulers: vec!["k".into()],
        };
        let mut settings = AppSettings::default();
        res.apply_to(&mut settings);
        assert_eq!(settings.saved_loras, vec!["None", "l"]);
        assert_eq!(settings.saved_checkpoints, vec!["c"]);
        assert_eq!(settings.available_schedulers, vec!["k"]);
    }
}
