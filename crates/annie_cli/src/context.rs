use annie_core::{AnnieConfig, AppSettings, Character, FileStorage, Repository};
use anyhow::{Context as _, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a subcommand needs: the process config, the opened store and
/// the settings with config overrides applied.
pub struct AppContext {
    pub config: AnnieConfig,
    pub data_dir: PathBuf,
    pub repo: Repository,
    pub settings: AppSettings,
}

impl AppContext {
    pub async fn open(config: AnnieConfig, data_dir_flag: Option<PathBuf>) -> Result<Self> {
        let data_dir = data_dir_flag.unwrap_or_else(|| config.data_dir());
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
        let repo = Repository::new(Arc::new(FileStorage::new(&data_dir)));
        let mut settings = repo.load_settings().await.context("Failed to load settings")?;
        config.overrides.apply(&mut settings)?;
        tracing::debug!("Opened data dir {}", data_dir.display());
        Ok(Self {
            config,
            data_dir,
            repo,
            settings,
        })
    }

    /// Persist the in-memory settings, including any applied overrides.
    pub async fn save_settings(&self) -> Result<()> {
        self.repo
            .save_settings(&self.settings)
            .await
            .context("Failed to save settings")
    }

    /// Find a character by id or case-insensitive name.
    pub async fn character(&self, key: &str) -> Result<Character> {
        let chars = self.repo.load_characters().await?;
        chars
            .into_iter()
            .find(|c| c.id == key || c.name.eq_ignore_ascii_case(key))
            .with_context(|| format!("No character matches '{}'", key))
    }
}

/// `annie.toml` under the user config dir, else the working directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("annie").join("annie.toml"))
        .unwrap_or_else(|| PathBuf::from("annie.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_data_dir_and_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested");
        let ctx = AppContext::open(AnnieConfig::default(), Some(dir.clone()))
            .await
            .unwrap();
        assert!(dir.is_dir());
        assert!(!ctx.settings.sticker_library.is_empty());

        let mut c = Character::new("Annie", "v-standard");
        c.id = "c-annie".into();
        ctx.repo.save_characters(&[c]).await.unwrap();
        assert_eq!(ctx.character("annie").await.unwrap().id, "c-annie");
        assert!(ctx.character("nobody").await.is_err());
    }
}
