//! Property-based tests for lore matching, prompt assembly and tag handling.

use annie_core::character::WorldInfoEntry;
use annie_core::{AppSettings, Character};
use annie_reasoning::lorebook::active_lore;
use annie_reasoning::prompts::ContextAssembler;
use annie_reasoning::tags::{process_reply, strip_tags};
use proptest::prelude::*;

fn entry(key: &str, content: &str, enabled: bool) -> WorldInfoEntry {
    WorldInfoEntry {
        id: content.to_string(),
        keys: vec![key.to_string()],
        content: content.to_string(),
        enabled,
        insertion_strategy: None,
    }
}

proptest! {
    /// An entry is active exactly when it is enabled and its key occurs in
    /// the input, ignoring ASCII case.
    #[test]
    fn lore_active_iff_enabled_and_key_present(
        key in "[a-zA-Z]{1,8}",
        prefix in "[a-z ]{0,12}",
        suffix in "[a-z ]{0,12}",
        upper in any::<bool>(),
        enabled in any::<bool>(),
        include in any::<bool>(),
    ) {
        let shown = if upper { key.to_uppercase() } else { key.to_lowercase() };
        let input = if include {
            format!("{}{}{}", prefix, shown, suffix)
        } else {
            format!("{}{}", prefix, suffix)
        };
        let lore = vec![entry(&key, "lore", enabled)];
        let expected = enabled && input.to_lowercase().contains(&key.to_lowercase());
        prop_assert_eq!(!active_lore(&input, &lore).is_empty(), expected);
    }

    /// Assembly never fails and always carries the identity line and the
    /// user block, whatever the character text contains.
    #[test]
    fn prompt_always_has_identity(
        name in "[^\\n]{1,20}",
        persona in ".{0,60}",
        input in ".{0,40}",
        group in any::<bool>(),
    ) {
        let mut c = Character::new(&name, "v");
        c.persona = persona;
        let out = ContextAssembler::build(&c, &AppSettings::default(), &input, group);
        prop_assert!(out.system_prompt.contains("[USER INFO]"));
        let identity = if group {
            format!("You are in a group chat. Your name is {}.", name)
        } else {
            format!("You are {}.", name)
        };
        prop_assert!(out.system_prompt.contains(&identity));
    }

    /// Stripped text never contains a well-formed tag and is never empty
    /// after post-processing.
    #[test]
    fn tags_never_survive(
        before in "[a-z ]{0,20}",
        tag in "[a-zA-Z0-9_]{1,12}",
        after in "[a-z ]{0,20}",
        image in any::<bool>(),
    ) {
        let marker = if image { "IMAGE" } else { "sticker" };
        let raw = format!("{}[{}: {}]{}", before, marker, tag, after);
        let stripped = strip_tags(&raw);
        prop_assert!(!stripped.to_uppercase().contains("[STICKER:"));
        prop_assert!(!stripped.to_uppercase().contains("[IMAGE:"));
        let processed = process_reply(&raw, &AppSettings::default());
        prop_assert!(!processed.text.is_empty());
    }
}
