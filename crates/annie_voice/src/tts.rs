//! Text-to-speech dispatch.

use crate::error::{Result, VoiceError};
use annie_core::settings::env_api_key;
use annie_core::voice::{HttpMethod, TtsProvider, VoiceProfile};
use annie_core::AppSettings;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::LazyLock;
use std::time::Duration;

pub const GEMINI_TTS_MODEL: &str = "gemini-2.5-flash-preview-tts";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

static RE_ACTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*.*?\*").unwrap());
static RE_ASIDE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(.*?\)").unwrap());
static RE_AUDIO_DATA_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data:audio/.*?;base64,").unwrap());

/// Synthesized audio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum AudioResult {
    Base64(String),
    Url(String),
}

/// Drop `*actions*` and `(asides)` so only spoken words remain.
pub fn sanitize_for_speech(text: &str) -> String {
    let without_actions = RE_ACTION.replace_all(text, "");
    RE_ASIDE.replace_all(&without_actions, "").trim().to_string()
}

/// Reference audio without its data-URL prefix.
fn strip_audio_prefix(sample: &str) -> String {
    RE_AUDIO_DATA_URL.replace(sample, "").into_owned()
}

fn escape_quotes(s: &str) -> String {
    s.replace('"', "\\\"")
}

/// Fill a user-supplied JSON template. `{text}`, `{audio}` and `{ref_text}`
/// are substituted; a template that does not parse afterwards falls back to
/// `{"text": ...}`.
pub fn render_custom_body(template: &str, text: &str, profile: &VoiceProfile) -> Value {
    let audio = profile
        .sample_audio
        .as_deref()
        .map(strip_audio_prefix)
        .unwrap_or_default();
    let ref_text = escape_quotes(profile.sample_text.as_deref().unwrap_or_default());
    let filled = template
        .replace("{text}", &escape_quotes(text))
        .replace("{audio}", &audio)
        .replace("{ref_text}", &ref_text);
    match serde_json::from_str(&filled) {
        Ok(v) => v,
        Err(e) => {
            tracing::error!("Custom voice body is not valid JSON: {}", e);
            json!({ "text": text })
        }
    }
}

/// Method and JSON body for the HTTP speech shapes. `text` is already
/// sanitized. GET requests carry no body.
pub fn build_request(text: &str, profile: &VoiceProfile) -> (HttpMethod, Option<Value>) {
    let sample = profile
        .sample_audio
        .as_deref()
        .map(strip_audio_prefix)
        .filter(|a| !a.is_empty());
    let body = match profile.provider {
        TtsProvider::GptSovits => json!({
            "text": text,
            "text_lang": "zh",
            "ref_audio_path": profile.sample_audio.clone().unwrap_or_default(),
            "prompt_lang": "zh",
            "prompt_text": profile.sample_text.clone().unwrap_or_default(),
            "speed_factor": profile.speed.unwrap_or(1.0),
            "media_type": "wav",
            "streaming_mode": false,
        }),
        TtsProvider::FishSpeech => {
            let mut body = Map::new();
            body.insert("text".into(), json!(text));
            if let Some(audio) = sample {
                body.insert("reference_audio".into(), json!(audio));
            }
            if let Some(t) = profile.sample_text.as_deref().filter(|t| !t.is_empty()) {
                body.insert("reference_text".into(), json!(t));
            }
            body.insert("format".into(), json!("wav"));
            Value::Object(body)
        }
        TtsProvider::ChatTts => {
            let mut body = Map::new();
            body.insert("text".into(), json!(text));
            if let Some(audio) = sample {
                body.insert("voice".into(), json!(audio));
            }
            body.insert("prompt".into(), json!("[speed_5]"));
            body.insert("temperature".into(), json!(0.3));
            Value::Object(body)
        }
        TtsProvider::OpenaiCompatible => json!({
            "input": text,
            "model": profile.model_id.as_deref().unwrap_or("tts-1"),
            "voice": profile.voice_id.as_deref().unwrap_or("alloy"),
        }),
        TtsProvider::CustomJson => {
            let method = profile.custom_method.unwrap_or(HttpMethod::Post);
            let body = match profile.custom_body.as_deref() {
                Some(template) => render_custom_body(template, text, profile),
                None => json!({}),
            };
            return match method {
                HttpMethod::Get => (HttpMethod::Get, None),
                HttpMethod::Post => (HttpMethod::Post, Some(body)),
            };
        }
        TtsProvider::Gemini => json!({ "text": text }),
    };
    (HttpMethod::Post, Some(body))
}

/// A text-to-speech backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text` with `profile`. `Ok(None)` means there was nothing to say
    /// or the backend returned no audio.
    async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> Result<Option<AudioResult>>;
}

/// Routes a request to the backend named by the voice profile.
#[derive(Debug, Clone)]
pub struct TtsDispatcher {
    http: Client,
    gemini_base_url: String,
    gemini_api_key: String,
}

impl TtsDispatcher {
    pub fn new(http: Client, gemini_api_key: Option<String>) -> Self {
        Self {
            http,
            gemini_base_url: GEMINI_BASE_URL.to_string(),
            gemini_api_key: gemini_api_key.or_else(env_api_key).unwrap_or_default(),
        }
    }

    pub fn from_settings(settings: &AppSettings) -> Self {
        Self::new(Client::new(), settings.managed_api_key())
    }

    pub fn with_gemini_base_url(mut self, url: &str) -> Self {
        self.gemini_base_url = url.trim_end_matches('/').to_string();
        self
    }

    pub async fn generate_speech(
        &self,
        text: &str,
        profile: &VoiceProfile,
    ) -> Result<Option<AudioResult>> {
        let clean = sanitize_for_speech(text);
        if clean.is_empty() {
            return Ok(None);
        }
        match profile.provider {
            TtsProvider::Gemini => self.gemini_speech(&clean, profile).await,
            _ => self.http_speech(&clean, profile).await.map(Some),
        }
    }

    async fn gemini_speech(&self, text: &str, profile: &VoiceProfile) -> Result<Option<AudioResult>> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.gemini_base_url, GEMINI_TTS_MODEL
        );
        let body = json!({
            "contents": [{"parts": [{"text": text}]}],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": profile.base_voice.as_str()}}
                }
            }
        });
        let resp = self
            .http
            .post(&url)
            .query(&[("key", self.gemini_api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VoiceError::Api {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }
        let json: Value = resp.json().await?;
        let data = json["candidates"][0]["content"]["parts"][0]["inlineData"]["data"].as_str();
        if data.is_none() {
            tracing::warn!("Speech response carried no inline audio");
        }
        Ok(data.map(|d| AudioResult::Base64(d.to_string())))
    }

    async fn http_speech(&self, text: &str, profile: &VoiceProfile) -> Result<AudioResult> {
        let url = profile
            .api_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| VoiceError::MissingUrl(profile.name.clone()))?;
        let (method, body) = build_request(text, profile);
        tracing::debug!("{} speech request to {}", profile.provider.as_str(), url);

        let mut req = match method {
            HttpMethod::Get => self.http.get(url),
            HttpMethod::Post => self.http.post(url),
        }
        .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(key) = profile.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.bearer_auth(key);
        }
        if let Some(body) = body {
            req = req.body(serde_json::to_vec(&body)?);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(VoiceError::Api {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }
        let bytes = resp.bytes().await?;
        Ok(AudioResult::Base64(STANDARD.encode(&bytes)))
    }
}

#[async_trait]
impl SpeechSynthesizer for TtsDispatcher {
    async fn synthesize(&self, text: &str, profile: &VoiceProfile) -> Result<Option<AudioResult>> {
        self.generate_speech(text, profile).await
    }
}

/// Reachability check with a 3-second budget. Any HTTP response counts.
pub async fn ping_server(url: &str) -> bool {
    let client = match Client::builder().timeout(Duration::from_secs(3)).build() {
        Ok(c) => c,
        Err(_) => return false,
    };
    match client.get(url).send().await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("Ping to {} failed: {}", url, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(provider: TtsProvider) -> VoiceProfile {
        VoiceProfile {
            id: "v1".into(),
            name: "Test".into(),
            provider,
            api_url: Some("http://tts.local/speak".into()),
            ..VoiceProfile::default()
        }
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_for_speech("*smiles* Hello (softly) there "), "Hello  there");
        assert_eq!(sanitize_for_speech("*waves*"), "");
        assert_eq!(sanitize_for_speech("a * b"), "a * b");
    }

    #[test]
    fn test_gpt_sovits_body() {
        let mut p = profile(TtsProvider::GptSovits);
        p.sample_audio = Some("/refs/annie.wav".into());
        p.sample_text = Some("参考文本".into());
        p.speed = Some(1.2);
        let (method, body) = build_request("你好", &p);
        let body = body.unwrap();
        assert_eq!(method, HttpMethod::Post);
        assert_eq!(body["text_lang"], "zh");
        assert_eq!(body["ref_audio_path"], "/refs/annie.wav");
        assert_eq!(body["prompt_text"], "参考文本");
        assert_eq!(body["speed_factor"], 1.2);
        assert_eq!(body["streaming_mode"], false);
    }

    #[test]
    fn test_fish_speech_omits_absent_fields() {
        let p = profile(TtsProvider::FishSpeech);
        let body = build_request("hi", &p).1.unwrap();
        assert!(body.get("reference_audio").is_none());
        assert!(body.get("reference_text").is_none());
        assert_eq!(body["format"], "wav");

        let mut p = profile(TtsProvider::FishSpeech);
        p.sample_audio = Some("data:audio/wav;base64,UklGRg==".into());
        let body = build_request("hi", &p).1.unwrap();
        assert_eq!(body["reference_audio"], "UklGRg==");
    }

    #[test]
    fn test_chat_tts_body() {
        let mut p = profile(TtsProvider::ChatTts);
        p.sample_audio = Some("data:audio/mp3;base64,SUQz".into());
        let body = build_request("hi", &p).1.unwrap();
        assert_eq!(body["voice"], "SUQz");
        assert_eq!(body["prompt"], "[speed_5]");
        assert_eq!(body["temperature"], 0.3);
    }

    #[test]
    fn test_empty_sample_audio_is_omitted() {
        for sample in ["", "data:audio/wav;base64,"] {
            let mut p = profile(TtsProvider::FishSpeech);
            p.sample_audio = Some(sample.into());
            let body = build_request("hi", &p).1.unwrap();
            assert!(body.get("reference_audio").is_none());

            let mut p = profile(TtsProvider::ChatTts);
            p.sample_audio = Some(sample.into());
            let body = build_request("hi", &p).1.unwrap();
            assert!(body.get("voice").is_none());
        }
    }

    #[test]
    fn test_openai_defaults() {
        let body = build_request("hi", &profile(TtsProvider::OpenaiCompatible)).1.unwrap();
        assert_eq!(body, json!({"input": "hi", "model": "tts-1", "voice": "alloy"}));
    }

    #[test]
    fn test_custom_template_without_sample_audio() {
        let mut p = profile(TtsProvider::CustomJson);
        p.custom_body =
            Some(r#"{"content": "{text}", "ref_audio": "{audio}", "ref": "{ref_text}"}"#.into());
        let body = build_request(r#"say "hi""#, &p).1.unwrap();
        assert_eq!(body["ref_audio"], "");
        assert_eq!(body["ref"], "");
        assert_eq!(body["content"], r#"say "hi""#);
    }

    #[test]
    fn test_custom_template_unparseable_falls_back() {
        let mut p = profile(TtsProvider::CustomJson);
        p.custom_body = Some("{not json {text}".into());
        let body = build_request("hello", &p).1.unwrap();
        assert_eq!(body, json!({"text": "hello"}));
    }

    #[test]
    fn test_custom_get_has_no_body() {
        let mut p = profile(TtsProvider::CustomJson);
        p.custom_method = Some(HttpMethod::Get);
        p.custom_body = Some(r#"{"t": "{text}"}"#.into());
        assert_eq!(build_request("x", &p), (HttpMethod::Get, None));
    }

    #[test]
    fn test_audio_result_wire_shape() {
        let v = serde_json::to_value(AudioResult::Base64("AAA".into())).unwrap();
        assert_eq!(v, json!({"type": "base64", "data": "AAA"}));
    }
}
