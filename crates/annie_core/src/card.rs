//! Import of TavernAI / Chub character cards.
//!
//! Cards arrive either as JSON (`chara_card_v2` with a `data` envelope, a bare
//! `data` envelope, or flat fields) or as a PNG whose `tEXt` chunk named
//! `chara` carries the same JSON in base64.

use crate::character::{
    ActionStyle, ActionStyleConfig, Character, ModelConfig, PersonalityConfig, RelationshipState,
    DEFAULT_CHARACTER_MODEL,
};
use crate::{Error, Result};
use base64::Engine;
use serde_json::Value;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

fn field<'a>(data: &'a Value, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or("")
}

fn non_empty<'a>(s: &'a str, fallback: &'a str) -> &'a str {
    if s.is_empty() {
        fallback
    } else {
        s
    }
}

/// Build a character from card JSON, binding it to `voice_id`.
pub fn import_card(card: &Value, voice_id: &str) -> Result<Character> {
    if !card.is_object() {
        return Err(Error::Invalid("character card must be a JSON object".into()));
    }
    let data = if card.get("spec").and_then(Value::as_str) == Some("chara_card_v2") {
        card.get("data")
            .ok_or_else(|| Error::Invalid("chara_card_v2 card without data".into()))?
    } else {
        card.get("data").filter(|d| d.is_object()).unwrap_or(card)
    };

    let name = non_empty(field(data, "name"), "Imported Character");
    let description = field(data, "description");
    let personality = field(data, "personality");
    let creator_notes = field(data, "creator_notes");

    let summary = if creator_notes.is_empty() {
        description.chars().take(100).collect()
    } else {
        creator_notes.to_string()
    };

    Ok(Character {
        id: crate::short_id(),
        name: name.to_string(),
        avatar: crate::social::avatar_for(name),
        description: summary,
        persona: format!("{}\n\n{}", description, personality).trim().to_string(),
        scenario: field(data, "scenario").to_string(),
        examples: field(data, "mes_example").to_string(),
        greetings: vec![non_empty(field(data, "first_mes"), "Hello.").to_string()],
        action_style: ActionStyle::Structured(ActionStyleConfig::from_legacy("")),
        voice_id: voice_id.to_string(),
        use_search: None,
        enable_visual_perception: None,
        model: DEFAULT_CHARACTER_MODEL.to_string(),
        config: ModelConfig::default(),
        personality: PersonalityConfig {
            openness: 50,
            conscientiousness: 50,
            extraversion: 50,
            agreeableness: 50,
            neuroticism: 50,
        },
        relationship: RelationshipState {
            status: "Stranger".to_string(),
            ..RelationshipState::default()
        },
        live2d_config: None,
        agent_config: None,
        ..Character::default()
    })
}

/// Extract the embedded card JSON from a PNG character card.
pub fn card_from_png(bytes: &[u8]) -> Result<Value> {
    if bytes.len() < PNG_SIGNATURE.len() || bytes[..8] != PNG_SIGNATURE {
        return Err(Error::Invalid("not a PNG file".into()));
    }
    let mut pos = 8;
    while pos + 8 <= bytes.len() {
        let len = u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]]) as usize;
        let kind = &bytes[pos + 4..pos + 8];
        let start = pos + 8;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| Error::Invalid("truncated PNG chunk".into()))?;
        if kind == b"tEXt" {
            let chunk = &bytes[start..end];
            if let Some(nul) = chunk.iter().position(|b| *b == 0) {
                if &chunk[..nul] == b"chara" {
                    let decoded = base64::engine::general_purpose::STANDARD
                        .decode(&chunk[nul + 1..])
                        .map_err(|e| Error::Invalid(format!("card payload is not base64: {}", e)))?;
                    return Ok(serde_json::from_slice(&decoded)?);
                }
            }
        }
        if kind == b"IEND" {
            break;
        }
        // chunk data + 4-byte CRC
        pos = end + 4;
    }
    Err(Error::NotFound("PNG has no 'chara' text chunk".into()))
}

/// Import from raw file bytes, sniffing PNG versus JSON.
pub fn import_card_bytes(bytes: &[u8], voice_id: &str) -> Result<Character> {
    let card = if bytes.starts_with(&PNG_SIGNATURE) {
        card_from_png(bytes)?
    } else {
        serde_json::from_slice(bytes)?
    };
    import_card(&card, voice_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_import_v2_card() {
        let card = json!({
            "spec": "chara_card_v2",
            "data": {
                "name": "Seraphina",
                "description": "A guardian of the forest.",
                "personality": "gentle",
                "scenario": "glade",
                "first_mes": "Welcome, traveler.",
                "mes_example": "<START>",
                "creator_notes": ""
            }
        });
        let c = import_card(&card, "v-standard").unwrap();
        assert_eq!(c.name, "Seraphina");
        assert_eq!(c.persona, "A guardian of the forest.\n\ngentle");
        assert_eq!(c.description, "A guardian of the forest.");
        assert_eq!(c.greetings, vec!["Welcome, traveler.".to_string()]);
        assert_eq!(c.examples, "<START>");
        assert_eq!(c.voice_id, "v-standard");
        assert_eq!(c.relationship.status, "Stranger");
        let style = c.action_style.normalized();
        assert!(style.enabled);
        assert!(style.custom_formatting.is_empty());
    }

    #[test]
    fn test_import_flat_card_defaults() {
        let c = import_card(&json!({"description": "x".repeat(150)}), "v1").unwrap();
        assert_eq!(c.name, "Imported Character");
        assert_eq!(c.description.chars().count(), 100);
        assert_eq!(c.greetings, vec!["Hello.".to_string()]);
    }

    #[test]
    fn test_creator_notes_win_over_description() {
        let c = import_card(
            &json!({"data": {"name": "A", "description": "long", "creator_notes": "short"}}),
            "v1",
        )
        .unwrap();
        assert_eq!(c.description, "short");
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(import_card(&json!("nope"), "v1").is_err());
    }

    fn png_with_card(card: &Value) -> Vec<u8> {
        let payload = base64::engine::general_purpose::STANDARD.encode(card.to_string());
        let mut text = b"chara\0".to_vec();
        text.extend_from_slice(payload.as_bytes());
        let mut out = PNG_SIGNATURE.to_vec();
        out.extend_from_slice(&(text.len() as u32).to_be_bytes());
        out.extend_from_slice(b"tEXt");
        out.extend_from_slice(&text);
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(b"IEND");
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    #[test]
    fn test_import_png_card() {
        let bytes = png_with_card(&json!({"name": "Pixel", "first_mes": "beep"}));
        let c = import_card_bytes(&bytes, "v1").unwrap();
        assert_eq!(c.name, "Pixel");
        assert_eq!(c.greetings, vec!["beep".to_string()]);
    }

    #[test]
    fn test_png_without_card() {
        let mut bytes = PNG_SIGNATURE.to_vec();
        bytes.extend_from_slice(&0u32.to_be_bytes());
        bytes.extend_from_slice(b"IEND");
        bytes.extend_from_slice(&[0, 0, 0, 0]);
        assert!(matches!(card_from_png(&bytes), Err(Error::NotFound(_))));
    }
}
