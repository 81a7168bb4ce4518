//! Key-value persistence and the typed repository on top of it.
//!
//! Every collection lives under a fixed key and is rewritten in full on each
//! change. There is no journaling or fsync; a crash mid-write can lose the
//! last change.

use crate::character::Character;
use crate::message::{Message, Transcript};
use crate::settings::AppSettings;
use crate::social::{CharacterGroup, Moment};
use crate::voice::{default_voice_library, VoiceProfile};
use crate::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const CHARACTERS_KEY: &str = "airi_v7_characters";
pub const GROUPS_KEY: &str = "airi_v7_groups";
pub const VOICES_KEY: &str = "airi_v7_voices";
pub const SETTINGS_KEY: &str = "airi_v7_settings";
pub const MOMENTS_KEY: &str = "airi_v7_moments";

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
    async fn keys(&self) -> Result<Vec<String>>;
}

// ============================================================================
// Backends
// ============================================================================

/// One `<key>.json` file per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.path_for(key), value).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(key) = name.strip_suffix(".json") {
                out.push(key.to_string());
            }
        }
        out.sort();
        Ok(out)
    }
}

/// In-process storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().await.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

// ============================================================================
// Typed repository
// ============================================================================

/// Typed access to every persisted collection.
///
/// Loads never fail on malformed records. A list element that does not decode
/// is logged and skipped, and a settings field that does not decode falls back
/// to its default. Storage I/O errors still propagate.
#[derive(Clone)]
pub struct Repository {
    storage: Arc<dyn Storage>,
}

impl Repository {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()))
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Decode a stored array one element at a time. Elements that do not
    /// decode are logged and skipped; a record that is not an array at all
    /// yields the fallback.
    async fn load_list<T, F>(&self, key: &str, fallback: F) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        F: FnOnce() -> Vec<T>,
    {
        let Some(raw) = self.storage.get(key).await? else {
            return Ok(fallback());
        };
        let items = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                tracing::warn!("Discarding record '{}': not a list", key);
                return Ok(fallback());
            }
            Err(e) => {
                tracing::warn!("Discarding malformed record '{}': {}", key, e);
                return Ok(fallback());
            }
        };
        let total = items.len();
        let decoded: Vec<T> = items
            .into_iter()
            .enumerate()
            .filter_map(|(i, item)| match serde_json::from_value(item) {
                Ok(v) => Some(v),
                Err(e) => {
                    tracing::warn!("Skipping malformed entry {} in '{}': {}", i, key, e);
                    None
                }
            })
            .collect();
        if decoded.len() < total {
            tracing::warn!("Kept {} of {} entries in '{}'", decoded.len(), total, key);
        }
        Ok(decoded)
    }

    async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.storage.set(key, &raw).await
    }

    /// Characters, with legacy action styles migrated to the structured form.
    pub async fn load_characters(&self) -> Result<Vec<Character>> {
        let mut chars: Vec<Character> = self.load_list(CHARACTERS_KEY, Vec::new).await?;
        let migrated = chars
            .iter_mut()
            .map(Character::migrate_action_style)
            .filter(|changed| *changed)
            .count();
        if migrated > 0 {
            tracing::info!("Migrated {} legacy action style(s)", migrated);
        }
        Ok(chars)
    }

    pub async fn save_characters(&self, chars: &[Character]) -> Result<()> {
        self.save(CHARACTERS_KEY, chars).await
    }

    pub async fn load_groups(&self) -> Result<Vec<CharacterGroup>> {
        self.load_list(GROUPS_KEY, Vec::new).await
    }

    pub async fn save_groups(&self, groups: &[CharacterGroup]) -> Result<()> {
        self.save(GROUPS_KEY, groups).await
    }

    pub async fn load_voices(&self) -> Result<Vec<VoiceProfile>> {
        self.load_list(VOICES_KEY, default_voice_library).await
    }

    pub async fn save_voices(&self, voices: &[VoiceProfile]) -> Result<()> {
        self.save(VOICES_KEY, voices).await
    }

    /// Settings merged over the defaults.
    pub async fn load_settings(&self) -> Result<AppSettings> {
        let Some(raw) = self.storage.get(SETTINGS_KEY).await? else {
            return Ok(AppSettings::default());
        };
        let parsed = serde_json::from_str::<Value>(&raw).map_err(crate::Error::from);
        match parsed.and_then(|v| AppSettings::from_stored(&v)) {
            Ok(s) => Ok(s),
            Err(e) => {
                tracing::warn!("Settings record unreadable, using defaults: {}", e);
                Ok(AppSettings::default())
            }
        }
    }

    pub async fn save_settings(&self, settings: &AppSettings) -> Result<()> {
        self.save(SETTINGS_KEY, settings).await
    }

    pub async fn load_moments(&self) -> Result<Vec<Moment>> {
        self.load_list(MOMENTS_KEY, Vec::new).await
    }

    pub async fn save_moments(&self, moments: &[Moment]) -> Result<()> {
        self.save(MOMENTS_KEY, moments).await
    }

    pub async fn load_transcript(&self, session_id: &str) -> Result<Transcript> {
        let messages: Vec<Message> = self
            .load_list(&Transcript::storage_key(session_id), Vec::new)
            .await?;
        Ok(Transcript {
            session_id: session_id.to_string(),
            messages,
        })
    }

    pub async fn save_transcript(&self, transcript: &Transcript) -> Result<()> {
        self.save(&Transcript::storage_key(&transcript.session_id), &transcript.messages)
            .await
    }

    pub async fn delete_transcript(&self, session_id: &str) -> Result<()> {
        self.storage.remove(&Transcript::storage_key(session_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::ActionStyle;
    use serde_json::json;

    #[tokio::test]
    async fn test_empty_store_yields_defaults() {
        let repo = Repository::in_memory();
        assert!(repo.load_characters().await.unwrap().is_empty());
        assert_eq!(repo.load_voices().await.unwrap()[0].id, "v-standard");
        assert_eq!(repo.load_settings().await.unwrap(), AppSettings::default());
        assert!(repo.load_transcript("c1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_characters_are_migrated_on_load() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set(
                CHARACTERS_KEY,
                &json!([{"id": "c1", "name": "Old", "actionStyle": "*smiles*"}]).to_string(),
            )
            .await
            .unwrap();
        let repo = Repository::new(storage);
        let chars = repo.load_characters().await.unwrap();
        match &chars[0].action_style {
            ActionStyle::Structured(cfg) => {
                assert!(cfg.enabled);
                assert_eq!(cfg.custom_formatting, "*smiles*");
            }
            other => panic!("expected migration, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_record_falls_back() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set(SETTINGS_KEY, "{not json").await.unwrap();
        storage.set(GROUPS_KEY, "[1, 2]").await.unwrap();
        let repo = Repository::new(storage);
        assert_eq!(repo.load_settings().await.unwrap(), AppSettings::default());
        assert!(repo.load_groups().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_list_entries_are_skipped_individually() {
        let storage = Arc::new(MemoryStorage::new());
        let stored = json!([
            {"id": "a", "name": "Good"},
            {"id": "b", "actionStyle": {"enabled": true, "narrativePerspective": "second"}},
            {"id": 7},
            "junk"
        ]);
        storage.set(CHARACTERS_KEY, &stored.to_string()).await.unwrap();
        storage
            .set(MOMENTS_KEY, &json!([{"id": "m1", "characterId": "a", "content": "hi", "timestamp": 1}, null]).to_string())
            .await
            .unwrap();
        let repo = Repository::new(storage);

        let chars = repo.load_characters().await.unwrap();
        let ids: Vec<&str> = chars.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(chars[1].action_style.is_structured());
        assert_eq!(repo.load_moments().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transcript_roundtrip_uses_chat_key() {
        let storage = Arc::new(MemoryStorage::new());
        let repo = Repository::new(storage.clone());
        let mut t = Transcript::new("abc");
        t.push(Message::system("hi"));
        repo.save_transcript(&t).await.unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["chat_abc".to_string()]);
        assert_eq!(repo.load_transcript("abc").await.unwrap(), t);
        repo.delete_transcript("abc").await.unwrap();
        assert!(storage.keys().await.unwrap().is_empty());
    }
}
