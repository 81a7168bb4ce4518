//! Inline control tags in model replies.
//!
//! A reply may carry `[STICKER: name]` and `[IMAGE: description]` markers.
//! They are lifted out of the surface text and returned separately.

use annie_core::{AppSettings, Sticker};
use regex::Regex;
use std::sync::LazyLock;

static RE_STICKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[STICKER:\s*([a-zA-Z0-9_]+)\]").unwrap());
static RE_STICKER_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[STICKER:.*?\]").unwrap());
static RE_IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[IMAGE:\s*(.*?)\]").unwrap());
static RE_IMAGE_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\[IMAGE:.*?\]").unwrap());

/// A reply after tag extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedReply {
    /// Trimmed surface text, `"..."` when nothing is left.
    pub text: String,
    pub sticker: Option<Sticker>,
    pub image_prompt: Option<String>,
}

/// Lowercased name of the first well-formed sticker tag.
pub fn sticker_tag(raw: &str) -> Option<String> {
    RE_STICKER
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
}

/// Description inside the first image tag, trimmed. Empty descriptions count
/// as no tag.
pub fn image_prompt(raw: &str) -> Option<String> {
    RE_IMAGE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Remove image spans, and sticker spans when a well-formed sticker tag is
/// present, then trim. A lone malformed sticker span stays in the text.
pub fn strip_tags(raw: &str) -> String {
    let without_stickers = if RE_STICKER.is_match(raw) {
        RE_STICKER_SPAN.replace_all(raw, "")
    } else {
        std::borrow::Cow::Borrowed(raw)
    };
    RE_IMAGE_SPAN
        .replace_all(&without_stickers, "")
        .trim()
        .to_string()
}

pub fn process_reply(raw: &str, settings: &AppSettings) -> ProcessedReply {
    let sticker = sticker_tag(raw).and_then(|tag| settings.find_sticker(&tag).cloned());
    let image_prompt = image_prompt(raw);
    let mut text = strip_tags(raw);
    if text.is_empty() {
        text = "...".to_string();
    }
    ProcessedReply {
        text,
        sticker,
        image_prompt,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sticker_tag_selects_matching_sticker() {
        let s = AppSettings::default();
        let out = process_reply("So happy! [STICKER: Happy]", &s);
        assert_eq!(out.text, "So happy!");
        let sticker = out.sticker.unwrap();
        assert!(sticker.tags.contains(&"happy".to_string()));
    }

    #[test]
    fn test_unknown_sticker_tag_falls_back_to_first() {
        let s = AppSettings::default();
        let out = process_reply("[sticker:unknown_tag]", &s);
        assert_eq!(out.sticker.as_ref(), s.sticker_library.first());
        assert_eq!(out.text, "...");
    }

    #[test]
    fn test_malformed_sticker_span_alone_is_kept() {
        let s = AppSettings::default();
        let out = process_reply("hi [STICKER: two words] there", &s);
        assert!(out.sticker.is_none());
        assert_eq!(out.text, "hi [STICKER: two words] there");
    }

    #[test]
    fn test_malformed_span_stripped_alongside_real_tag() {
        let s = AppSettings::default();
        let out = process_reply("[STICKER: two words] yay [STICKER: happy]", &s);
        assert!(out.sticker.is_some());
        assert_eq!(out.text, "yay");
    }

    #[test]
    fn test_image_tag() {
        let s = AppSettings::default();
        let out = process_reply("Here you go [IMAGE: a girl under cherry blossoms ]", &s);
        assert_eq!(out.text, "Here you go");
        assert_eq!(out.image_prompt.as_deref(), Some("a girl under cherry blossoms"));
    }

    #[test]
    fn test_plain_text_untouched() {
        let s = AppSettings::default();
        let out = process_reply("  just words  ", &s);
        assert_eq!(out.text, "just words");
        assert!(out.sticker.is_none());
        assert!(out.image_prompt.is_none());
    }
}
