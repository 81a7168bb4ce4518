//! Keyword-triggered lore lookup.

use annie_core::character::WorldInfoEntry;

/// Content of every enabled entry with a key that occurs in `input`,
/// compared case-insensitively. Entry order is preserved.
pub fn active_lore(input: &str, entries: &[WorldInfoEntry]) -> Vec<String> {
    if entries.is_empty() {
        return vec![];
    }
    let haystack = input.to_lowercase();
    entries
        .iter()
        .filter(|e| e.enabled && is_triggered(&haystack, e))
        .map(|e| e.content.clone())
        .collect()
}

fn is_triggered(lowered_input: &str, entry: &WorldInfoEntry) -> bool {
    entry
        .keys
        .iter()
        .any(|k| lowered_input.contains(&k.to_lowercase()))
}
