//! Chat messages and per-session transcripts.

use crate::character::Character;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Voice,
    File,
    Sticker,
    Transaction,
    System,
}

/// A grounding citation returned alongside a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub content: String,
    pub timestamp: i64,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_edited: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_lore: Option<Vec<String>>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role, kind: MessageKind, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            sender_id: None,
            sender_name: None,
            content: content.into(),
            timestamp: crate::now_millis(),
            kind,
            image_url: None,
            audio_data: None,
            audio_duration: None,
            file_data: None,
            file_name: None,
            mime_type: None,
            emotion: None,
            is_edited: None,
            transaction_amount: None,
            sources: None,
            active_lore: None,
        }
    }

    pub fn user(sender_name: &str, kind: MessageKind, content: impl Into<String>) -> Self {
        let mut msg = Self::new(crate::short_id(), Role::User, kind, content);
        msg.sender_name = Some(sender_name.to_string());
        msg
    }

    pub fn assistant(character: &Character, kind: MessageKind, content: impl Into<String>) -> Self {
        let mut msg = Self::new(crate::short_id(), Role::Assistant, kind, content);
        msg.sender_id = Some(character.id.clone());
        msg.sender_name = Some(character.name.clone());
        msg
    }

    /// A system notice such as a provider failure.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(crate::short_id(), Role::System, MessageKind::Text, content)
    }

    /// Whether this message belongs in the history sent to a text backend.
    pub fn is_conversational(&self) -> bool {
        self.role != Role::System && self.kind != MessageKind::System
    }
}

/// Inline binary input attached to a user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    /// Base64 payload, optionally as a data URL.
    pub base64: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Audio,
    File,
    Sticker,
}

impl Attachment {
    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            id: crate::short_id(),
            kind: AttachmentKind::Image,
            base64: data.into(),
            mime_type: mime_type.into(),
            name: None,
        }
    }

    /// The raw base64 payload: everything after the first comma of a data URL.
    pub fn payload(&self) -> &str {
        match self.base64.split_once(',') {
            Some((_, rest)) => rest,
            None => &self.base64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchFilter {
    #[default]
    All,
    Image,
    Voice,
}

/// The ordered message list of one chat session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Transcript {
    pub session_id: String,
    pub messages: Vec<Message>,
}

impl Transcript {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            messages: vec![],
        }
    }

    /// Storage key of a session.
    pub fn storage_key(session_id: &str) -> String {
        format!("chat_{}", session_id)
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    /// Append the messages whose ids are not already present. Returns how
    /// many were added.
    pub fn append_missing(&mut self, messages: &[Message]) -> usize {
        let mut added = 0;
        for msg in messages {
            if !self.messages.iter().any(|m| m.id == msg.id) {
                self.messages.push(msg.clone());
                added += 1;
            }
        }
        added
    }

    pub fn delete(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    /// Seed an empty single-character session with the first greeting.
    pub fn seed_greeting(&mut self, character: &Character) -> bool {
        if !self.messages.is_empty() {
            return false;
        }
        let Some(greeting) = character.first_greeting() else {
            return false;
        };
        let mut msg = Message::assistant(character, MessageKind::Text, greeting);
        msg.id = "init".to_string();
        msg.emotion = Some("neutral".to_string());
        self.messages.push(msg);
        true
    }

    /// Case-insensitive content search, narrowed by message kind.
    ///
    /// With an empty query only the filter applies, and the `All` filter then
    /// matches nothing.
    pub fn search(&self, query: &str, filter: SearchFilter) -> Vec<&Message> {
        let needle = query.trim().to_lowercase();
        self.messages
            .iter()
            .filter(|m| match filter {
                SearchFilter::Image => m.image_url.is_some(),
                SearchFilter::Voice => m.kind == MessageKind::Voice,
                SearchFilter::All => true,
            })
            .filter(|m| {
                if needle.is_empty() {
                    filter != SearchFilter::All
                } else {
                    m.content.to_lowercase().contains(&needle)
                }
            })
            .collect()
    }

    /// Messages eligible as model history.
    pub fn history(&self) -> Vec<&Message> {
        self.messages.iter().filter(|m| m.is_conversational()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Transcript {
        let mut t = Transcript::new("c1");
        t.push(Message::user("User", MessageKind::Text, "Hello Annie"));
        let mut img = Message::user("User", MessageKind::Text, "[Image]");
        img.image_url = Some("data:image/png;base64,AAAA".into());
        t.push(img);
        t.push(Message::user("User", MessageKind::Voice, "[语音消息]"));
        t.push(Message::system("Error: boom"));
        t
    }

    #[test]
    fn test_search_is_case_insensitive() {
        let t = transcript();
        let hits = t.search("hello", SearchFilter::All);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Hello Annie");
    }

    #[test]
    fn test_search_filters() {
        let t = transcript();
        assert_eq!(t.search("", SearchFilter::Image).len(), 1);
        assert_eq!(t.search("", SearchFilter::Voice).len(), 1);
        assert!(t.search("", SearchFilter::All).is_empty());
        assert!(t.search("hello", SearchFilter::Voice).is_empty());
    }

    #[test]
    fn test_history_skips_system_messages() {
        let t = transcript();
        assert_eq!(t.history().len(), 3);
    }

    #[test]
    fn test_seed_greeting_only_when_empty() {
        let c = Character::new("Annie", "v-standard");
        let mut t = Transcript::new(&c.id);
        assert!(t.seed_greeting(&c));
        assert_eq!(t.messages[0].id, "init");
        assert_eq!(t.messages[0].role, Role::Assistant);
        assert!(!t.seed_greeting(&c));
    }

    #[test]
    fn test_attachment_payload_strips_data_url() {
        let a = Attachment::image("data:image/jpeg;base64,QUJD", "image/jpeg");
        assert_eq!(a.payload(), "QUJD");
        let raw = Attachment::image("QUJD", "image/jpeg");
        assert_eq!(raw.payload(), "QUJD");
    }

    #[test]
    fn test_message_wire_shape() {
        let m = Message::system("Error: x");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["type"], "text");
        assert_eq!(v["role"], "system");
        assert!(v.get("imageUrl").is_none());
    }

    #[test]
    fn test_delete_message() {
        let mut t = transcript();
        let id = t.messages[0].id.clone();
        assert!(t.delete(&id));
        assert_eq!(t.messages.len(), 3);
    }

    #[test]
    fn test_append_missing_skips_known_ids() {
        let mut stored = transcript();
        let mut local = stored.clone();
        local.push(Message::system("new"));
        stored.push(Message::system("written meanwhile"));
        assert_eq!(stored.append_missing(&local.messages), 1);
        assert_eq!(stored.messages.len(), 6);
        assert_eq!(stored.messages[5].content, "new");
    }
}
