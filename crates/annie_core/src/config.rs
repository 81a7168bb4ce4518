use crate::settings::{AppSettings, ProviderKind};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-level config
// ============================================================================

/// Process-level configuration read from `annie.toml`.
///
/// User-editable application state (providers, personas, themes) lives in the
/// persisted settings record; this file only covers where data lives, how the
/// process logs and which address the gateway binds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnnieConfig {
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub gateway: GatewayConfig,
    pub overrides: SettingsOverrides,
}

impl AnnieConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: AnnieConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("ANNIE_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("ANNIE_PROVIDER") {
            self.overrides.provider = Some(v);
        }
        if let Ok(v) = std::env::var("ANNIE_COMFY_URL") {
            self.overrides.comfy_url = Some(v);
        }
        if let Ok(v) = std::env::var("ANNIE_GATEWAY_PORT") {
            if let Ok(n) = v.parse() {
                self.gateway.port = n;
            }
        }
        if let Ok(v) = std::env::var("ANNIE_LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Directory holding the persisted records.
    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("annie"))
        .unwrap_or_else(|| PathBuf::from("annie_data"))
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when neither `ANNIE_LOG` nor `RUST_LOG` is set.
    pub level: String,
    /// "plain" or "json".
    pub format: String,
    /// When set, logs are also written to a daily-rolling file in this directory.
    pub file_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "plain".to_string(),
            file_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Values forced onto the loaded settings record at start-up.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsOverrides {
    pub provider: Option<String>,
    pub comfy_url: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl SettingsOverrides {
    pub fn apply(&self, settings: &mut AppSettings) -> Result<()> {
        if let Some(p) = &self.provider {
            settings.api_provider = p
                .parse::<ProviderKind>()
                .with_context(|| format!("Invalid provider override '{}'", p))?;
        }
        if let Some(url) = &self.comfy_url {
            settings.comfy_url = url.clone();
        }
        if let Some(key) = &self.gemini_api_key {
            settings.provider_configs.gemini.api_key = Some(key.clone());
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
