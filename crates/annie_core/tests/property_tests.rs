//! Property-based tests for annie_core.
//!
//! Uses proptest to check the persistence invariants over arbitrary inputs:
//! settings survive a save/load cycle with unknown fields intact, a rejected
//! settings field never costs its siblings, and legacy action styles always
//! decode.

use annie_core::character::{ActionStyle, NarrativePerspective};
use annie_core::store::{FileStorage, Repository, SETTINGS_KEY};
use annie_core::{AppSettings, Character, Storage};
use proptest::prelude::*;
use serde_json::{json, Value};
use std::sync::Arc;

// ============================================================================
// Strategies
// ============================================================================

fn arb_key() -> impl Strategy<Value = String> {
    "x[a-zA-Z]{1,12}"
}

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::from),
        any::<i32>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::from),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Any string stored as an action style decodes and normalizes to an
    /// enabled third-person config carrying that string.
    #[test]
    fn legacy_action_style_never_fails(style in ".{0,64}") {
        let raw = json!({"id": "c", "name": "n", "actionStyle": style.clone()});
        let c: Character = serde_json::from_value(raw).unwrap();
        let cfg = c.action_style.normalized();
        prop_assert!(cfg.enabled);
        prop_assert_eq!(cfg.narrative_perspective, NarrativePerspective::Third);
        prop_assert_eq!(cfg.custom_formatting, style);
        prop_assert!(matches!(c.action_style, ActionStyle::Legacy(_)));
    }

    /// Unknown provider fields and unknown provider records survive a
    /// serialize/merge cycle.
    #[test]
    fn provider_extras_roundtrip(
        key in arb_key(),
        value in arb_leaf(),
        model in "[a-z0-9\\-]{1,20}",
    ) {
        let stored = json!({
            "providerConfigs": {
                "ollama": { "model": model.clone(), key.clone(): value.clone() },
                key.clone(): { "apiKey": "k" }
            },
            key.clone(): value.clone()
        });
        let s = AppSettings::from_stored(&stored).unwrap();
        let saved = serde_json::to_value(&s).unwrap();
        let reloaded = AppSettings::from_stored(&saved).unwrap();
        prop_assert_eq!(&reloaded, &s);
        prop_assert_eq!(&reloaded.provider_configs.ollama.model, &model);
        prop_assert_eq!(reloaded.provider_configs.ollama.extra.get(&key), Some(&value));
        prop_assert_eq!(&saved["providerConfigs"][&key]["apiKey"], &json!("k"));
        prop_assert_eq!(reloaded.extra.get(&key), Some(&value));
    }

    /// A theme mode the types do not know never costs the stored provider
    /// record.
    #[test]
    fn unknown_theme_mode_keeps_provider_configs(
        mode in "[a-z]{3,10}".prop_filter("known mode", |m| !["dark", "light", "gray"].contains(&m.as_str())),
        api_key in "sk-[a-z0-9]{4,16}",
    ) {
        let stored = json!({
            "theme": { "mode": mode },
            "providerConfigs": { "openai-compatible": { "apiKey": api_key.clone(), "org": "acme" } }
        });
        let s = AppSettings::from_stored(&stored).unwrap();
        prop_assert_eq!(s.provider_configs.openai_compatible.key(), Some(api_key.as_str()));
        prop_assert_eq!(&s.provider_configs.openai_compatible.extra["org"], &json!("acme"));
    }
}

// ============================================================================
// File-backed store
// ============================================================================

#[tokio::test]
async fn test_unreadable_theme_does_not_wipe_saved_keys() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FileStorage::new(dir.path()));
    storage
        .set(
            SETTINGS_KEY,
            &json!({
                "theme": {"mode": "sepia"},
                "providerConfigs": {
                    "openai-compatible": {
                        "baseUrl": "https://api.deepseek.com/v1",
                        "apiKey": "sk-user",
                        "model": "deepseek-chat",
                        "org": "acme"
                    }
                }
            })
            .to_string(),
        )
        .await
        .unwrap();

    let repo = Repository::new(storage.clone());
    let settings = repo.load_settings().await.unwrap();
    let openai = &settings.provider_configs.openai_compatible;
    assert_eq!(openai.key(), Some("sk-user"));
    assert_eq!(openai.model, "deepseek-chat");
    repo.save_settings(&settings).await.unwrap();

    let raw = storage.get(SETTINGS_KEY).await.unwrap().unwrap();
    let v: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(v["providerConfigs"]["openai-compatible"]["apiKey"], "sk-user");
    assert_eq!(v["providerConfigs"]["openai-compatible"]["org"], "acme");
    assert_eq!(v["theme"]["mode"], "dark");
}

#[tokio::test]
async fn test_file_storage_settings_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let storage = Arc::new(FileStorage::new(dir.path().join("data")));
    storage
        .set(
            SETTINGS_KEY,
            &json!({
                "apiProvider": "openai-compatible",
                "providerConfigs": {
                    "openai-compatible": {"baseUrl": "https://llm.local/v1", "apiKey": "sk", "model": "m", "org": "acme"}
                }
            })
            .to_string(),
        )
        .await
        .unwrap();

    let repo = Repository::new(storage.clone());
    let settings = repo.load_settings().await.unwrap();
    assert_eq!(settings.active_provider().url(), Some("https://llm.local/v1"));
    repo.save_settings(&settings).await.unwrap();

    let raw = storage.get(SETTINGS_KEY).await.unwrap().unwrap();
    let v: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(v["providerConfigs"]["openai-compatible"]["org"], "acme");
    assert_eq!(v["providerConfigs"]["gemini"]["model"], "gemini-2.0-flash-exp");
    assert!(dir.path().join("data").join("airi_v7_settings.json").exists());
}

#[tokio::test]
async fn test_file_storage_missing_dir_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::new(dir.path().join("absent"));
    assert!(storage.keys().await.unwrap().is_empty());
    assert!(storage.get("anything").await.unwrap().is_none());
    storage.remove("anything").await.unwrap();
}
