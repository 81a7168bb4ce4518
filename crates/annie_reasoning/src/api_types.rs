use annie_core::message::{Attachment, AttachmentKind, Message, Role, Source};
use annie_core::ModelConfig;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

/// One prior turn of the conversation as seen by a text backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: TurnRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
        }
    }

    /// Convert stored messages into history turns, dropping system notices.
    pub fn from_messages<'a, I>(messages: I) -> Vec<ChatTurn>
    where
        I: IntoIterator<Item = &'a Message>,
    {
        messages
            .into_iter()
            .filter(|m| m.is_conversational())
            .map(|m| ChatTurn {
                role: if m.role == Role::User {
                    TurnRole::User
                } else {
                    TurnRole::Assistant
                },
                text: m.content.clone(),
            })
            .collect()
    }
}

/// Base64 image data sent inline with the current turn.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    /// Image attachments only; the payload after a data-URL comma is kept.
    pub fn from_attachments(attachments: &[Attachment]) -> Vec<InlineImage> {
        attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::Image)
            .map(|a| InlineImage {
                mime_type: a.mime_type.clone(),
                data: a.payload().to_string(),
            })
            .collect()
    }
}

/// Everything a provider needs for one generation call.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system: String,
    pub history: Vec<ChatTurn>,
    pub input: String,
    pub images: Vec<InlineImage>,
    /// Sampling parameters. `None` leaves the backend defaults in place.
    pub sampling: Option<ModelConfig>,
    /// Model preferred by the character, honoured by backends that allow it.
    pub model: Option<String>,
    pub use_search: bool,
    /// Ask for JSON output matching this schema (managed API only).
    pub response_schema: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LlmReply {
    pub text: String,
    pub sources: Vec<Source>,
}

impl LlmReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sources: vec![],
        }
    }
}
