//! What started a turn, and how it shows up in the transcript and the prompt.

use annie_core::message::AttachmentKind;
use annie_core::{Attachment, Message, MessageKind, Sticker};
use anyhow::Result;

/// Where a live visual frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualSource {
    Camera,
    Screen,
}

impl VisualSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualSource::Camera => "camera",
            VisualSource::Screen => "screen",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Typed input with optional attachments. `visual` marks that the
    /// attachments include a captured camera or screen frame.
    Text {
        text: String,
        attachments: Vec<Attachment>,
        visual: Option<VisualSource>,
    },
    /// A recorded voice note as a data URL.
    Voice { audio: String, duration_secs: u32 },
    Sticker(Sticker),
    RedPacket { amount: f64, note: Option<String> },
    /// Ask the character to draw itself or the scene.
    Draw,
    /// Ask the character for a selfie.
    Selfie,
}

const VOICE_PROMPT: &str =
    "(System: User sent a voice message. Respond to what you hear or the context.)";
const DRAW_PROMPT: &str = "(System: The user wants you to generate an image/drawing of yourself or the current scene. Describe it in detail inside [IMAGE: ...])";
const SELFIE_PROMPT: &str = "(System: Please send me a selfie/photo based on your current context.)";
const DEFAULT_RED_PACKET_NOTE: &str = "Best wishes!";

impl Trigger {
    pub fn text(text: impl Into<String>) -> Self {
        Trigger::Text {
            text: text.into(),
            attachments: vec![],
            visual: None,
        }
    }

    pub fn is_voice(&self) -> bool {
        matches!(self, Trigger::Voice { .. })
    }

    /// Reject triggers that carry nothing to send.
    pub fn validate(&self) -> Result<()> {
        match self {
            Trigger::Text {
                text,
                attachments,
                visual,
            } if text.trim().is_empty() && attachments.is_empty() && visual.is_none() => {
                anyhow::bail!("Nothing to send")
            }
            Trigger::RedPacket { amount, .. } if amount.is_nan() || *amount <= 0.0 => {
                anyhow::bail!("Red packet amount must be positive, got {}", amount)
            }
            _ => Ok(()),
        }
    }

    fn red_packet_note(note: &Option<String>) -> &str {
        note.as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_RED_PACKET_NOTE)
    }

    /// The message the user side of the transcript gains, if any.
    pub fn user_message(&self, sender_name: &str) -> Option<Message> {
        match self {
            Trigger::Text {
                text,
                attachments,
                visual,
            } => {
                let content = if !text.is_empty() {
                    text.clone()
                } else if attachments.is_empty() {
                    String::new()
                } else if visual.is_some() {
                    "[Visual Input]".to_string()
                } else {
                    "[Image]".to_string()
                };
                let mut msg = Message::user(sender_name, MessageKind::Text, content);
                msg.image_url = attachments
                    .iter()
                    .find(|a| a.kind == AttachmentKind::Image)
                    .map(|a| a.base64.clone());
                Some(msg)
            }
            Trigger::Voice {
                audio,
                duration_secs,
            } => {
                let mut msg = Message::user(sender_name, MessageKind::Voice, "[语音消息]");
                msg.audio_data = Some(audio.clone());
                msg.audio_duration = Some(*duration_secs);
                Some(msg)
            }
            Trigger::Sticker(sticker) => {
                let mut msg = Message::user(sender_name, MessageKind::Sticker, "[Sticker]");
                msg.image_url = Some(sticker.url.clone());
                Some(msg)
            }
            Trigger::RedPacket { amount, note } => {
                let mut msg = Message::user(
                    sender_name,
                    MessageKind::Transaction,
                    Self::red_packet_note(note),
                );
                msg.transaction_amount = Some(*amount);
                Some(msg)
            }
            Trigger::Draw | Trigger::Selfie => None,
        }
    }

    /// The input text handed to the model for this turn.
    pub fn prompt_input(&self) -> String {
        match self {
            Trigger::Text { text, visual, .. } => match visual {
                Some(source) => format!(
                    "{}\n(System: The user is showing you their {}. React to the visual input.)",
                    text,
                    source.as_str()
                ),
                None => text.clone(),
            },
            Trigger::Voice { .. } => VOICE_PROMPT.to_string(),
            Trigger::Sticker(sticker) => {
                format!("[System: User sent a sticker: {}]", sticker.tags.join(", "))
            }
            Trigger::RedPacket { amount, note } => format!(
                "[System]: User sent a Red Packet of ${}. Note: \"{}\".",
                amount,
                Self::red_packet_note(note)
            ),
            Trigger::Draw => DRAW_PROMPT.to_string(),
            Trigger::Selfie => SELFIE_PROMPT.to_string(),
        }
    }

    pub fn attachments(&self) -> &[Attachment] {
        match self {
            Trigger::Text { attachments, .. } => attachments,
            _ => &[],
        }
    }

    /// Typed text the user wrote themselves, used for the drawing keywords.
    pub fn typed_text(&self) -> Option<&str> {
        match self {
            Trigger::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// Whether typed input asks for a picture.
pub fn wants_drawing(input: &str) -> bool {
    input.contains('画') || input.to_lowercase().contains("generate")
}

#[cfg(test)]
mod tests {
    use super::*;
    use annie_core::Role;

    #[test]
    fn test_red_packet() {
        let t = Trigger::RedPacket {
            amount: 8.88,
            note: None,
        };
        t.validate().unwrap();
        let msg = t.user_message("Kai").unwrap();
        assert_eq!(msg.kind, MessageKind::Transaction);
        assert_eq!(msg.content, "Best wishes!");
        assert_eq!(msg.transaction_amount, Some(8.88));
        assert_eq!(
            t.prompt_input(),
            "[System]: User sent a Red Packet of $8.88. Note: \"Best wishes!\"."
        );
    }

    #[test]
    fn test_non_positive_red_packet_is_rejected() {
        for amount in [0.0, -1.0, f64::NAN] {
            let t = Trigger::RedPacket { amount, note: None };
            assert!(t.validate().is_err());
        }
    }

    #[test]
    fn test_empty_text_is_rejected() {
        assert!(Trigger::text("   ").validate().is_err());
    }

    #[test]
    fn test_image_only_message_placeholder() {
        let t = Trigger::Text {
            text: String::new(),
            attachments: vec![Attachment::image("data:image/png;base64,AA", "image/png")],
            visual: None,
        };
        let msg = t.user_message("Kai").unwrap();
        assert_eq!(msg.content, "[Image]");
        assert_eq!(msg.image_url.as_deref(), Some("data:image/png;base64,AA"));
    }

    #[test]
    fn test_visual_note_is_appended_to_prompt() {
        let t = Trigger::Text {
            text: String::new(),
            attachments: vec![Attachment::image("data:image/jpeg;base64,AA", "image/jpeg")],
            visual: Some(VisualSource::Screen),
        };
        assert_eq!(t.user_message("Kai").unwrap().content, "[Visual Input]");
        assert!(t
            .prompt_input()
            .ends_with("(System: The user is showing you their screen. React to the visual input.)"));
    }

    #[test]
    fn test_voice_and_sticker_messages() {
        let v = Trigger::Voice {
            audio: "data:audio/webm;base64,AAA".into(),
            duration_secs: 3,
        };
        let msg = v.user_message("Kai").unwrap();
        assert_eq!(msg.kind, MessageKind::Voice);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "[语音消息]");
        assert!(v.is_voice());

        let s = Trigger::Sticker(Sticker {
            id: "s1".into(),
            url: "https://x/y.gif".into(),
            tags: vec!["happy".into(), "dance".into()],
            is_dynamic: true,
        });
        assert_eq!(s.user_message("Kai").unwrap().content, "[Sticker]");
        assert_eq!(s.prompt_input(), "[System: User sent a sticker: happy, dance]");
    }

    #[test]
    fn test_draw_has_no_user_message() {
        assert!(Trigger::Draw.user_message("Kai").is_none());
        assert!(Trigger::Draw.prompt_input().contains("[IMAGE: ...]"));
    }

    #[test]
    fn test_drawing_keywords() {
        assert!(wants_drawing("帮我画一只猫"));
        assert!(wants_drawing("Please GENERATE a cat"));
        assert!(!wants_drawing("hello"));
    }
}
