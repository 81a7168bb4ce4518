//! The application-wide settings singleton.
//!
//! Settings are persisted as one JSON object. Loading merges the stored object
//! over the serialized defaults so that records written by older or newer
//! versions keep working: missing fields take defaults and unknown fields are
//! carried through untouched.

use crate::character::ModelConfig;
use crate::voice::TtsProvider;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_COMFY_URL: &str = "http://127.0.0.1:8190";
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

// ============================================================================
// Text providers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    #[default]
    Gemini,
    OpenaiCompatible,
    Ollama,
    TataCore,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenaiCompatible => "openai-compatible",
            ProviderKind::Ollama => "ollama",
            ProviderKind::TataCore => "tata-core",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gemini" => Ok(ProviderKind::Gemini),
            "openai-compatible" | "openai" => Ok(ProviderKind::OpenaiCompatible),
            "ollama" => Ok(ProviderKind::Ollama),
            "tata-core" | "tata" => Ok(ProviderKind::TataCore),
            other => Err(crate::Error::Invalid(format!("unknown provider '{}'", other))),
        }
    }
}

/// Connection record for one text backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Managed API key from the environment (`GEMINI_API_KEY`, then `API_KEY`).
pub fn env_api_key() -> Option<String> {
    std::env::var("GEMINI_API_KEY")
        .or_else(|_| std::env::var("API_KEY"))
        .ok()
        .filter(|k| !k.is_empty())
}

impl ProviderConfig {
    fn new(base_url: Option<&str>, api_key: Option<&str>, model: &str) -> Self {
        Self {
            base_url: base_url.map(str::to_string),
            api_key: api_key.map(str::to_string),
            model: model.to_string(),
            extra: Map::new(),
        }
    }

    /// Non-empty API key, if any.
    pub fn key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Non-empty base URL without a trailing slash, if any.
    pub fn url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(|u| u.trim_end_matches('/'))
            .filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfigs {
    pub gemini: ProviderConfig,
    pub ollama: ProviderConfig,
    #[serde(rename = "openai-compatible")]
    pub openai_compatible: ProviderConfig,
    #[serde(rename = "tata-core")]
    pub tata_core: ProviderConfig,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ProviderConfigs {
    fn default() -> Self {
        Self {
            gemini: ProviderConfig::new(None, Some(""), "gemini-2.0-flash-exp"),
            ollama: ProviderConfig::new(Some(DEFAULT_OLLAMA_URL), None, "llama3"),
            openai_compatible: ProviderConfig::new(
                Some("https://api.openai.com/v1"),
                Some(""),
                "gpt-4o",
            ),
            tata_core: ProviderConfig::new(
                Some("http://localhost:8000"),
                Some("tata-local-key"),
                "tata-v1",
            ),
            extra: Map::new(),
        }
    }
}

impl ProviderConfigs {
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Gemini => &self.gemini,
            ProviderKind::Ollama => &self.ollama,
            ProviderKind::OpenaiCompatible => &self.openai_compatible,
            ProviderKind::TataCore => &self.tata_core,
        }
    }

    pub fn get_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::Gemini => &mut self.gemini,
            ProviderKind::Ollama => &mut self.ollama,
            ProviderKind::OpenaiCompatible => &mut self.openai_compatible,
            ProviderKind::TataCore => &mut self.tata_core,
        }
    }
}

// ============================================================================
// Image pipeline
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowType {
    Anime,
    Realistic,
    Standard,
    Custom,
}

/// Node-graph parameters for the diffusion backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComfyNodeConfig {
    pub workflow_type: WorkflowType,
    pub checkpoint: String,
    pub vae: String,
    pub lora1: String,
    #[serde(rename = "lora1_strength")]
    pub lora1_strength: f64,
    pub lora2: String,
    #[serde(rename = "lora2_strength")]
    pub lora2_strength: f64,
    pub sampler: String,
    pub scheduler: String,
    pub steps: u32,
    pub cfg: f64,
    pub width: u32,
    pub height: u32,
    pub default_negative_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_positive_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_workflow_json: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_ngrok_warning: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ComfyNodeConfig {
    fn default() -> Self {
        Self {
            workflow_type: WorkflowType::Anime,
            checkpoint: "animagineXLV3_v30.safetensors".to_string(),
            vae: "ae.safetensors".to_string(),
            lora1: "None".to_string(),
            lora1_strength: 0.8,
            lora2: "None".to_string(),
            lora2_strength: 0.6,
            sampler: "euler_ancestral".to_string(),
            scheduler: "karras".to_string(),
            steps: 25,
            cfg: 7.0,
            width: 832,
            height: 1216,
            default_negative_prompt: "low quality, bad anatomy, nsfw, ugly, cropped, worst quality, lowres, glitch, deformed, mutated, disfigured".to_string(),
            global_positive_prompt: Some(
                "masterpiece, best quality, very aesthetic, highly detailed".to_string(),
            ),
            custom_workflow_json: None,
            skip_ngrok_warning: Some(true),
            extra: Map::new(),
        }
    }
}

impl ComfyNodeConfig {
    pub fn skip_warning(&self) -> bool {
        self.skip_ngrok_warning.unwrap_or(false)
    }
}

// ============================================================================
// User-facing presentation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserPersona {
    pub name: String,
    pub avatar: String,
    pub description: String,
    pub custom_prompt: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for UserPersona {
    fn default() -> Self {
        Self {
            name: "User".to_string(),
            avatar: "https://ui-avatars.com/api/?name=User&background=random".to_string(),
            description: "神秘的旅行者。".to_string(),
            custom_prompt: String::new(),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    Dark,
    Light,
    Gray,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BubbleStyle {
    Modern,
    Retro,
    Glass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThemeConfig {
    pub mode: ThemeMode,
    pub primary_color: String,
    pub accent_color: String,
    pub global_background: String,
    pub chat_background: String,
    pub glass_opacity: f64,
    pub bubble_style: BubbleStyle,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            mode: ThemeMode::Dark,
            primary_color: "#db2777".to_string(),
            accent_color: "#9333ea".to_string(),
            global_background: String::new(),
            chat_background: String::new(),
            glass_opacity: 0.8,
            bubble_style: BubbleStyle::Modern,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sticker {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_dynamic: bool,
}

fn sticker(id: &str, url: &str, tags: &[&str]) -> Sticker {
    Sticker {
        id: id.to_string(),
        url: url.to_string(),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        is_dynamic: true,
    }
}

pub fn default_stickers() -> Vec<Sticker> {
    vec![
        sticker("s1", "https://media1.giphy.com/media/v1.Y2lkPTc5MGI3NjExbW5sZnhkMDZ4Z3l4aHZ4c3Z4eCZlcD12MV9pbnRlcm5hbF9naWZfYnlfaWQmY3Q9cw/l4FGpP4lxGGgK5CBW/giphy.gif", &["happy", "dance"]),
        sticker("s2", "https://media3.giphy.com/media/v1.Y2lkPTc5MGI3NjExM3Z4eHZ4c3Z4eHZ4c3Z4eCZlcD12MV9pbnRlcm5hbF9naWZfYnlfaWQmY3Q9cw/3o7TKr3nzbh5WgCFxe/giphy.gif", &["shock", "surprised"]),
        sticker("s3", "https://media0.giphy.com/media/v1.Y2lkPTc5MGI3NjExNXZ4eHZ4c3Z4eHZ4c3Z4eCZlcD12MV9pbnRlcm5hbF9naWZfYnlfaWQmY3Q9cw/l0HlCqV35hdEg2CNy/giphy.gif", &["love", "kiss"]),
        sticker("s4", "https://media4.giphy.com/media/v1.Y2lkPTc5MGI3NjExN3Z4eHZ4c3Z4eHZ4c3Z4eCZlcD12MV9pbnRlcm5hbF9naWZfYnlfaWQmY3Q9cw/26BRv0ThflsHCqDrG/giphy.gif", &["angry", "mad"]),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationPreset {
    pub id: String,
    pub name: String,
    pub model_id: String,
    pub config: ModelConfig,
}

// ============================================================================
// Settings singleton
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(rename = "enableComfyUI")]
    pub enable_comfyui: bool,
    pub comfy_url: String,
    pub comfy_config: ComfyNodeConfig,
    pub saved_checkpoints: Vec<String>,
    pub saved_loras: Vec<String>,
    pub available_samplers: Vec<String>,
    pub available_schedulers: Vec<String>,
    pub api_provider: ProviderKind,
    pub provider_configs: ProviderConfigs,
    pub model_preset: ModelConfig,
    pub saved_generation_presets: Vec<GenerationPreset>,
    pub use_google_search: bool,
    pub show_nsfw: bool,
    #[serde(rename = "defaultTTSProvider")]
    pub default_tts_provider: TtsProvider,
    pub user_persona: UserPersona,
    pub theme: ThemeConfig,
    pub sticker_library: Vec<Sticker>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            enable_comfyui: true,
            comfy_url: DEFAULT_COMFY_URL.to_string(),
            comfy_config: ComfyNodeConfig::default(),
            saved_checkpoints: strings(&[
                "animagineXLV3_v30.safetensors",
                "ponyDiffusionV6XL.safetensors",
            ]),
            saved_loras: strings(&["None", "detail_slider_v4.safetensors"]),
            available_samplers: strings(&[
                "euler",
                "euler_ancestral",
                "heun",
                "dpm_2",
                "dpm_2_ancestral",
            ]),
            available_schedulers: strings(&["normal", "karras", "exponential", "sgm_uniform"]),
            api_provider: ProviderKind::Gemini,
            provider_configs: ProviderConfigs::default(),
            model_preset: ModelConfig::default(),
            saved_generation_presets: vec![],
            use_google_search: true,
            show_nsfw: true,
            default_tts_provider: TtsProvider::Gemini,
            user_persona: UserPersona::default(),
            theme: ThemeConfig::default(),
            sticker_library: default_stickers(),
            extra: Map::new(),
        }
    }
}

impl AppSettings {
    /// Decode a stored settings object, filling gaps from the defaults.
    ///
    /// A stored value the types reject (an unknown theme mode, a newer
    /// provider name) falls back to its default on its own; every sibling
    /// field is still merged.
    pub fn from_stored(stored: &Value) -> crate::Result<Self> {
        let defaults = serde_json::to_value(AppSettings::default())?;
        let mut merged = defaults.clone();
        deep_merge(&mut merged, stored);
        if let Ok(settings) = AppSettings::deserialize(&merged) {
            return Ok(settings);
        }
        let mut repaired = defaults;
        match stored {
            Value::Object(patch) => merge_lenient(&mut repaired, &mut Vec::new(), patch),
            _ => tracing::warn!("Settings record is not an object, using defaults"),
        }
        Ok(serde_json::from_value(repaired)?)
    }

    /// Managed API key: the stored one, else the environment.
    pub fn managed_api_key(&self) -> Option<String> {
        self.provider_configs
            .gemini
            .key()
            .map(str::to_string)
            .or_else(env_api_key)
    }

    pub fn active_provider(&self) -> &ProviderConfig {
        self.provider_configs.get(self.api_provider)
    }

    /// The first sticker carrying `tag`, else the first in the library.
    pub fn find_sticker(&self, tag: &str) -> Option<&Sticker> {
        self.sticker_library
            .iter()
            .find(|s| s.tags.iter().any(|t| t == tag))
            .or_else(|| self.sticker_library.first())
    }

    pub fn add_custom_sticker(&mut self, url: &str) -> &Sticker {
        self.sticker_library.push(Sticker {
            id: crate::now_millis().to_string(),
            url: url.to_string(),
            tags: vec!["custom".to_string()],
            is_dynamic: false,
        });
        &self.sticker_library[self.sticker_library.len() - 1]
    }

    /// Save a sticker seen in chat. Returns false when the URL is already collected.
    pub fn collect_sticker(&mut self, url: &str) -> bool {
        if self.sticker_library.iter().any(|s| s.url == url) {
            return false;
        }
        self.sticker_library.push(Sticker {
            id: format!("fav-{}", crate::now_millis()),
            url: url.to_string(),
            tags: vec!["collected".to_string()],
            is_dynamic: url.ends_with(".gif"),
        });
        true
    }

    pub fn delete_sticker(&mut self, id: &str) -> bool {
        let before = self.sticker_library.len();
        self.sticker_library.retain(|s| s.id != id);
        self.sticker_library.len() != before
    }

    /// Replace the resource lists with what the diffusion server reports.
    pub fn apply_comfy_resources(
        &mut self,
        checkpoints: Vec<String>,
        loras: Vec<String>,
        samplers: Vec<String>,
        schedulers: Vec<String>,
    ) {
        if !checkpoints.is_empty() {
            self.saved_checkpoints = checkpoints;
        }
        let mut with_none = vec!["None".to_string()];
        with_none.extend(loras.into_iter().filter(|l| l != "None"));
        self.saved_loras = with_none;
        if !samplers.is_empty() {
            self.available_samplers = samplers;
        }
        if !schedulers.is_empty() {
            self.available_schedulers = schedulers;
        }
    }
}

/// Merge `patch` into `root` one key at a time, keeping only the keys that
/// still decode. A rejected object is retried key by key below it.
fn merge_lenient(root: &mut Value, path: &mut Vec<String>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        if value.is_null() {
            continue;
        }
        path.push(key.clone());
        let nested = path
            .iter()
            .rev()
            .fold(value.clone(), |inner, k| Value::Object(Map::from_iter([(k.clone(), inner)])));
        let mut candidate = root.clone();
        deep_merge(&mut candidate, &nested);
        if AppSettings::deserialize(&candidate).is_ok() {
            *root = candidate;
        } else if let Value::Object(inner) = value {
            merge_lenient(root, path, inner);
        } else {
            tracing::warn!("Ignoring unreadable setting '{}'", path.join("."));
        }
        path.pop();
    }
}

/// Recursively merge `patch` into `base`. Objects merge key by key, nulls are
/// ignored, and any other value replaces what was there.
pub fn deep_merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value);
                    }
                    _ => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, patch) if !patch.is_null() => *base = patch.clone(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_match_wire_shape() {
        let v = serde_json::to_value(AppSettings::default()).unwrap();
        assert_eq!(v["enableComfyUI"], true);
        assert_eq!(v["comfyUrl"], "http://127.0.0.1:8190");
        assert_eq!(v["apiProvider"], "gemini");
        assert_eq!(v["defaultTTSProvider"], "gemini");
        assert_eq!(v["providerConfigs"]["ollama"]["baseUrl"], "http://127.0.0.1:11434");
        assert_eq!(v["providerConfigs"]["tata-core"]["apiKey"], "tata-local-key");
        assert_eq!(v["comfyConfig"]["lora1_strength"], 0.8);
        assert_eq!(v["comfyConfig"]["skipNgrokWarning"], true);
        assert_eq!(v["stickerLibrary"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_partial_provider_config_is_filled_from_defaults() {
        let stored = json!({
            "apiProvider": "ollama",
            "providerConfigs": { "ollama": { "model": "qwen2" } }
        });
        let s = AppSettings::from_stored(&stored).unwrap();
        assert_eq!(s.api_provider, ProviderKind::Ollama);
        assert_eq!(s.provider_configs.ollama.model, "qwen2");
        assert_eq!(s.provider_configs.ollama.url(), Some(DEFAULT_OLLAMA_URL));
        assert_eq!(s.provider_configs.openai_compatible.model, "gpt-4o");
    }

    #[test]
    fn test_unknown_fields_survive_roundtrip() {
        let stored = json!({
            "futureFlag": {"a": 1},
            "providerConfigs": {
                "gemini": { "apiKey": "k", "model": "m", "region": "eu" },
                "mistral": { "apiKey": "x" }
            },
            "comfyConfig": { "denoiseOverride": 0.7 },
            "theme": { "font": "serif" }
        });
        let s = AppSettings::from_stored(&stored).unwrap();
        let back = serde_json::to_value(&s).unwrap();
        assert_eq!(back["futureFlag"]["a"], 1);
        assert_eq!(back["providerConfigs"]["gemini"]["region"], "eu");
        assert_eq!(back["providerConfigs"]["mistral"]["apiKey"], "x");
        assert_eq!(back["comfyConfig"]["denoiseOverride"], 0.7);
        assert_eq!(back["theme"]["font"], "serif");
        let again = AppSettings::from_stored(&back).unwrap();
        assert_eq!(again, s);
    }

    #[test]
    fn test_rejected_field_keeps_its_siblings() {
        let stored = json!({
            "apiProvider": "claude-next",
            "theme": { "mode": "sepia", "primaryColor": "#000000" },
            "providerConfigs": {
                "openai-compatible": { "apiKey": "sk-user", "model": "deepseek-chat", "org": "acme" }
            }
        });
        let s = AppSettings::from_stored(&stored).unwrap();
        assert_eq!(s.api_provider, ProviderKind::Gemini);
        assert_eq!(s.theme.mode, ThemeMode::Dark);
        assert_eq!(s.theme.primary_color, "#000000");
        let openai = &s.provider_configs.openai_compatible;
        assert_eq!(openai.key(), Some("sk-user"));
        assert_eq!(openai.model, "deepseek-chat");
        assert_eq!(openai.extra["org"], "acme");
    }

    #[test]
    fn test_sticker_library_replaced_wholesale() {
        let stored = json!({
            "stickerLibrary": [{"id": "x", "url": "u", "tags": ["wave"], "isDynamic": false}]
        });
        let s = AppSettings::from_stored(&stored).unwrap();
        assert_eq!(s.sticker_library.len(), 1);
        let empty = AppSettings::from_stored(&json!({})).unwrap();
        assert_eq!(empty.sticker_library.len(), 4);
    }

    #[test]
    fn test_find_sticker_falls_back_to_first() {
        let s = AppSettings::default();
        assert_eq!(s.find_sticker("kiss").unwrap().id, "s3");
        assert_eq!(s.find_sticker("nope").unwrap().id, "s1");
    }

    #[test]
    fn test_collect_sticker_skips_duplicates() {
        let mut s = AppSettings::default();
        assert!(s.collect_sticker("https://x/y.gif"));
        assert!(!s.collect_sticker("https://x/y.gif"));
        let last = s.sticker_library.last().unwrap();
        assert_eq!(last.tags, vec!["collected".to_string()]);
        assert!(last.is_dynamic);
        let id = last.id.clone();
        assert!(s.delete_sticker(&id));
        assert!(!s.delete_sticker(&id));
    }

    #[test]
    fn test_apply_comfy_resources_prefixes_none() {
        let mut s = AppSettings::default();
        s.apply_comfy_resources(
            vec!["a.safetensors".into()],
            vec!["l1.safetensors".into()],
            vec![],
            vec!["simple".into()],
        );
        assert_eq!(s.saved_checkpoints, vec!["a.safetensors".to_string()]);
        assert_eq!(s.saved_loras, vec!["None".to_string(), "l1.safetensors".to_string()]);
        assert_eq!(s.available_samplers.len(), 5);
        assert_eq!(s.available_schedulers, vec!["simple".to_string()]);
    }

    #[test]
    fn test_deep_merge_ignores_null() {
        let mut base = json!({"a": {"b": 1, "c": 2}, "d": 3});
        deep_merge(&mut base, &json!({"a": {"b": 5}, "d": null}));
        assert_eq!(base, json!({"a": {"b": 5, "c": 2}, "d": 3}));
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("tata-core".parse::<ProviderKind>().unwrap(), ProviderKind::TataCore);
        assert!("claude".parse::<ProviderKind>().is_err());
    }
}
