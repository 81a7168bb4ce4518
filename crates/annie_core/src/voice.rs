use serde::{Deserialize, Serialize};

/// Prebuilt voices of the managed speech API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum VoiceName {
    Puck,
    Charon,
    #[default]
    Kore,
    Fenrir,
    Zephyr,
}

impl VoiceName {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceName::Puck => "Puck",
            VoiceName::Charon => "Charon",
            VoiceName::Kore => "Kore",
            VoiceName::Fenrir => "Fenrir",
            VoiceName::Zephyr => "Zephyr",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TtsProvider {
    #[default]
    Gemini,
    GptSovits,
    FishSpeech,
    ChatTts,
    OpenaiCompatible,
    CustomJson,
}

impl TtsProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            TtsProvider::Gemini => "gemini",
            TtsProvider::GptSovits => "gpt-sovits",
            TtsProvider::FishSpeech => "fish-speech",
            TtsProvider::ChatTts => "chat-tts",
            TtsProvider::OpenaiCompatible => "openai-compatible",
            TtsProvider::CustomJson => "custom-json",
        }
    }
}

impl std::str::FromStr for TtsProvider {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gemini" => Ok(TtsProvider::Gemini),
            "gpt-sovits" => Ok(TtsProvider::GptSovits),
            "fish-speech" => Ok(TtsProvider::FishSpeech),
            "chat-tts" => Ok(TtsProvider::ChatTts),
            "openai-compatible" => Ok(TtsProvider::OpenaiCompatible),
            "custom-json" => Ok(TtsProvider::CustomJson),
            other => Err(crate::Error::Invalid(format!("unknown TTS provider '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// A speech profile. Only the fields relevant to `provider` are consulted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VoiceProfile {
    pub id: String,
    pub name: String,
    pub provider: TtsProvider,
    pub base_voice: VoiceName,
    pub style_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Reference audio, usually a `data:audio/...;base64,` URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_audio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_method: Option<HttpMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl Default for VoiceProfile {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            provider: TtsProvider::Gemini,
            base_voice: VoiceName::Kore,
            style_prompt: String::new(),
            api_url: None,
            api_key: None,
            speed: None,
            sample_audio: None,
            sample_text: None,
            model_id: None,
            voice_id: None,
            custom_method: None,
            custom_body: None,
            tags: None,
        }
    }
}

impl VoiceProfile {
    /// The built-in voice every library starts with.
    pub fn standard() -> Self {
        Self {
            id: "v-standard".to_string(),
            name: "系统柔美音".to_string(),
            provider: TtsProvider::Gemini,
            base_voice: VoiceName::Kore,
            style_prompt: "极度温柔、带有轻微羞涩的气息".to_string(),
            speed: Some(1.0),
            tags: Some(vec!["温柔".to_string(), "默认".to_string()]),
            ..Self::default()
        }
    }
}

pub fn default_voice_library() -> Vec<VoiceProfile> {
    vec![VoiceProfile::standard()]
}

/// Resolve a character's voice id against the library, falling back to the first entry.
pub fn find_voice<'a>(voices: &'a [VoiceProfile], id: &str) -> Option<&'a VoiceProfile> {
    voices.iter().find(|v| v.id == id).or_else(|| voices.first())
}
