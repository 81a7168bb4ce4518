pub mod card;
pub mod character;
pub mod config;
pub mod error;
pub mod message;
pub mod settings;
pub mod social;
pub mod store;
pub mod voice;

pub use character::{ActionStyle, ActionStyleConfig, Character, ModelConfig, VoiceFrequency};
pub use config::AnnieConfig;
pub use error::{Error, Result};
pub use message::{Attachment, Message, MessageKind, Role, SearchFilter, Source, Transcript};
pub use settings::{AppSettings, ComfyNodeConfig, ProviderKind, Sticker};
pub use social::{CharacterGroup, Moment};
pub use store::{FileStorage, MemoryStorage, Repository, Storage};
pub use voice::{TtsProvider, VoiceName, VoiceProfile};

use async_trait::async_trait;

/// Milliseconds since the Unix epoch, the timestamp unit of every record.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A short random identifier for new records.
pub fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Renders a text prompt into an image through an external pipeline.
///
/// `None` means no image could be produced; the caller shows nothing.
#[async_trait]
pub trait ImageRenderer: Send + Sync {
    async fn render(
        &self,
        prompt: &str,
        character: &Character,
        settings: &AppSettings,
    ) -> Option<String>;
}
