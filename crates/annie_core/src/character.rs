//! Character records: persona, sampling config, personality and lore.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const DEFAULT_CHARACTER_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_GREETING: &str = "你好呀！今天想聊点什么？";

// ============================================================================
// Sampling
// ============================================================================

/// Sampling parameters forwarded to the text backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelConfig {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub context_limit: u32,
    pub stop_sequences: Vec<String>,
    pub system_instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
}

impl Default for ModelConfig {
    /// The global preset used when nothing more specific is configured.
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 4096,
            context_limit: 8192,
            stop_sequences: vec![],
            system_instruction: String::new(),
            frequency_penalty: None,
            presence_penalty: None,
        }
    }
}

impl ModelConfig {
    /// Per-character sampling defaults for newly created characters.
    pub fn character_default() -> Self {
        Self {
            temperature: 0.9,
            top_p: 0.95,
            top_k: 64,
            max_output_tokens: 8192,
            ..Self::default()
        }
    }
}

// ============================================================================
// Persona details
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersonalityConfig {
    pub openness: u8,
    pub conscientiousness: u8,
    pub extraversion: u8,
    pub agreeableness: u8,
    pub neuroticism: u8,
}

impl Default for PersonalityConfig {
    fn default() -> Self {
        Self {
            openness: 50,
            conscientiousness: 50,
            extraversion: 50,
            agreeableness: 80,
            neuroticism: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RelationshipState {
    pub level: u32,
    pub xp: u32,
    pub next_level_xp: u32,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
}

impl Default for RelationshipState {
    fn default() -> Self {
        Self {
            level: 1,
            xp: 0,
            next_level_xp: 100,
            status: "初识".to_string(),
            balance: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,
    pub importance: u8,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertionStrategy {
    Prepend,
    Append,
}

/// A keyword-triggered lore snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldInfoEntry {
    pub id: String,
    #[serde(default)]
    pub keys: Vec<String>,
    pub content: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insertion_strategy: Option<InsertionStrategy>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackgroundRemoval {
    None,
    Screen,
    Multiply,
    PlusLighter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Live2DConfig {
    pub enable: bool,
    pub idle_video_url: String,
    pub talk_video_url: String,
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub remove_bg_mode: BackgroundRemoval,
}

impl Default for Live2DConfig {
    fn default() -> Self {
        Self {
            enable: false,
            idle_video_url: String::new(),
            talk_video_url: String::new(),
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            remove_bg_mode: BackgroundRemoval::None,
        }
    }
}

// ============================================================================
// Narration style
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrativePerspective {
    First,
    Third,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Low,
    Medium,
    High,
}

impl DetailLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetailLevel::Low => "low",
            DetailLevel::Medium => "medium",
            DetailLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActionStyleConfig {
    pub enabled: bool,
    pub narrative_perspective: NarrativePerspective,
    pub detail_level: DetailLevel,
    pub include_inner_thoughts: bool,
    pub custom_formatting: String,
}

impl Default for ActionStyleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            narrative_perspective: NarrativePerspective::Third,
            detail_level: DetailLevel::Medium,
            include_inner_thoughts: true,
            custom_formatting: "Use asterisks *like this* for actions.".to_string(),
        }
    }
}

impl ActionStyleConfig {
    /// The structured form a legacy free-text style maps onto.
    pub fn from_legacy(formatting: &str) -> Self {
        Self {
            enabled: true,
            narrative_perspective: NarrativePerspective::Third,
            detail_level: DetailLevel::Medium,
            include_inner_thoughts: true,
            custom_formatting: formatting.to_string(),
        }
    }
}

/// Older records store the action style as a bare string. Any other shape
/// (null, an unknown perspective) is kept as `Malformed` and normalizes to the
/// defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionStyle {
    Structured(ActionStyleConfig),
    Legacy(String),
    Malformed(serde_json::Value),
}

impl Default for ActionStyle {
    fn default() -> Self {
        ActionStyle::Structured(ActionStyleConfig::default())
    }
}

impl ActionStyle {
    pub fn normalized(&self) -> ActionStyleConfig {
        match self {
            ActionStyle::Structured(cfg) => cfg.clone(),
            ActionStyle::Legacy(s) => ActionStyleConfig::from_legacy(s),
            ActionStyle::Malformed(_) => ActionStyleConfig::default(),
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, ActionStyle::Legacy(_))
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, ActionStyle::Structured(_))
    }
}

// ============================================================================
// Agent mode
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Companion,
    Assistant,
    Executor,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Companion => "companion",
            AgentRole::Assistant => "assistant",
            AgentRole::Executor => "executor",
        }
    }
}

/// Prompt-level agent directives. No tool executor runs behind these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfig {
    pub enabled: bool,
    pub role: AgentRole,
    pub allowed_tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_manus_endpoint: Option<String>,
    pub thinking_budget: u32,
    pub max_steps: u32,
    pub require_approval: bool,
    pub keep_working_memory: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            role: AgentRole::Companion,
            allowed_tools: vec!["web_search".to_string()],
            open_manus_endpoint: None,
            thinking_budget: 0,
            max_steps: 5,
            require_approval: true,
            keep_working_memory: false,
        }
    }
}

// ============================================================================
// Character
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceFrequency {
    Always,
    Occasionally,
    Never,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Character {
    pub id: String,
    pub name: String,
    pub gender: Gender,
    pub avatar: String,
    pub description: String,
    pub persona: String,
    pub appearance: String,
    pub scenario: String,
    pub examples: String,
    pub greetings: Vec<String>,
    pub expression_style: String,
    pub habitual_phrases: String,
    pub action_style: ActionStyle,
    pub voice_id: String,
    pub voice_frequency: VoiceFrequency,
    pub max_reply_count: u32,
    pub proactive_chat: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_search: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_visual_perception: Option<bool>,
    pub is_nsfw: bool,
    pub model: String,
    pub config: ModelConfig,
    pub personality: PersonalityConfig,
    pub relationship: RelationshipState,
    pub memories: Vec<MemoryEntry>,
    pub world_info: Vec<WorldInfoEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live2d_config: Option<Live2DConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sprites: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<AgentConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion_avatar_url: Option<String>,
}

impl Default for Character {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            gender: Gender::Female,
            avatar: "https://picsum.photos/200".to_string(),
            description: String::new(),
            persona: String::new(),
            appearance: String::new(),
            scenario: String::new(),
            examples: String::new(),
            greetings: vec![DEFAULT_GREETING.to_string()],
            expression_style: String::new(),
            habitual_phrases: String::new(),
            action_style: ActionStyle::default(),
            voice_id: String::new(),
            voice_frequency: VoiceFrequency::Always,
            max_reply_count: 1,
            proactive_chat: false,
            use_search: Some(false),
            enable_visual_perception: Some(false),
            is_nsfw: false,
            model: DEFAULT_CHARACTER_MODEL.to_string(),
            config: ModelConfig::character_default(),
            personality: PersonalityConfig::default(),
            relationship: RelationshipState::default(),
            memories: vec![],
            world_info: vec![],
            background_image: None,
            live2d_config: Some(Live2DConfig::default()),
            sprites: None,
            chat_summary: None,
            agent_config: Some(AgentConfig::default()),
            motion_avatar_url: None,
        }
    }
}

impl Character {
    /// A fresh character with a random id bound to the given voice.
    pub fn new(name: &str, voice_id: &str) -> Self {
        Self {
            id: crate::short_id(),
            name: name.to_string(),
            voice_id: voice_id.to_string(),
            ..Self::default()
        }
    }

    /// Rewrite a legacy or malformed action style into the structured form.
    /// Returns true when the record changed.
    pub fn migrate_action_style(&mut self) -> bool {
        if !self.action_style.is_structured() {
            self.action_style = ActionStyle::Structured(self.action_style.normalized());
            true
        } else {
            false
        }
    }

    pub fn search_enabled(&self) -> bool {
        self.use_search.unwrap_or(false)
    }

    pub fn first_greeting(&self) -> Option<&str> {
        self.greetings.first().map(String::as_str)
    }

    pub fn add_memory(&mut self, content: &str, importance: u8) {
        self.memories.push(MemoryEntry {
            id: crate::short_id(),
            content: content.to_string(),
            importance,
            created_at: crate::now_millis(),
        });
    }

    pub fn add_lore(&mut self, keys: Vec<String>, content: &str) {
        self.world_info.push(WorldInfoEntry {
            id: crate::short_id(),
            keys,
            content: content.to_string(),
            enabled: true,
            insertion_strategy: None,
        });
    }
}
