use crate::context::AppContext;
use annie_core::settings::DEFAULT_OLLAMA_URL;
use annie_core::voice::find_voice;
use annie_core::{Character, TtsProvider, VoiceProfile};
use annie_image::endpoint::toggle_port;
use annie_image::{ComfyClient, PromptPreset, WorkflowPreset, POSITIVE_PROMPT_PRESETS, WORKFLOW_PRESETS};
use annie_reasoning::providers::ollama::list_models;
use annie_voice::pcm::OUTPUT_SAMPLE_RATE;
use annie_voice::{ping_server, wav_from_pcm16, AudioResult, TtsDispatcher};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Subcommand;
use std::path::{Path, PathBuf};

// ============================================================================
// Audio files
// ============================================================================

/// Write synthesized audio under `dir`. The managed voice returns raw
/// 24 kHz PCM, which is wrapped as WAV; other providers' bytes are written
/// as received. URL results are returned unchanged.
pub fn write_audio(audio: &AudioResult, provider: TtsProvider, dir: &Path, stem: &str) -> Result<String> {
    let data = match audio {
        AudioResult::Url(url) => return Ok(url.clone()),
        AudioResult::Base64(data) => data,
    };
    let bytes = STANDARD.decode(data).context("Speech payload is not valid base64")?;
    let (bytes, ext) = match provider {
        TtsProvider::Gemini => (wav_from_pcm16(&bytes, OUTPUT_SAMPLE_RATE), "wav"),
        _ => (bytes, "mp3"),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{}.{}", stem, ext));
    std::fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path.display().to_string())
}

// ============================================================================
// voice
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum VoiceAction {
    /// List saved voice profiles
    List,
    /// Synthesize text with a voice profile and save it
    Say {
        text: String,
        /// Voice id; the first saved voice when omitted
        #[arg(long)]
        voice: Option<String>,
        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
    /// Check whether a speech server answers at all
    Ping { url: String },
}

pub async fn voice(ctx: &AppContext, action: VoiceAction) -> Result<()> {
    match action {
        VoiceAction::List => {
            for v in ctx.repo.load_voices().await? {
                println!(
                    "{:<16} {:<20} {:<14} {}",
                    v.id,
                    v.name,
                    v.provider.as_str(),
                    v.api_url.as_deref().unwrap_or(v.base_voice.as_str())
                );
            }
        }
        VoiceAction::Say { text, voice, out } => {
            let voices = ctx.repo.load_voices().await?;
            let profile: &VoiceProfile = find_voice(&voices, voice.as_deref().unwrap_or_default())
                .context("No voice profiles saved")?;
            let tts = TtsDispatcher::from_settings(&ctx.settings);
            match tts.generate_speech(&text, profile).await? {
                Some(audio) => {
                    let stem = format!("annie-{}", chrono::Local::now().format("%Y%m%d-%H%M%S"));
                    println!("{}", write_audio(&audio, profile.provider, &out, &stem)?);
                }
                None => println!("Nothing to say after removing actions and asides."),
            }
        }
        VoiceAction::Ping { url } => {
            if ping_server(&url).await {
                println!("{} is reachable", url);
            } else {
                anyhow::bail!("{} did not answer", url);
            }
        }
    }
    Ok(())
}

// ============================================================================
// comfy
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ComfyAction {
    /// Test the connection to the ComfyUI server
    Probe {
        /// Defaults to the saved server URL
        #[arg(long)]
        url: Option<String>,
    },
    /// Fetch checkpoints, LoRAs, samplers and schedulers
    Resources {
        /// Store the lists on the settings
        #[arg(long)]
        save: bool,
    },
    /// Generate one image and print its URL
    Generate {
        prompt: String,
        /// Character whose appearance is appended to the prompt
        #[arg(long)]
        character: Option<String>,
    },
    /// Switch the saved URL between ports 8190 and 8188
    TogglePort,
    /// Apply a canvas preset by id or label
    Preset { id: String },
    /// Apply a positive-prompt preset by id or label
    PromptPreset { id: String },
    /// List canvas and prompt presets
    Presets,
}

pub async fn comfy(mut ctx: AppContext, action: ComfyAction) -> Result<()> {
    let client = ComfyClient::default();
    let skip = ctx.settings.comfy_config.skip_warning();
    match action {
        ComfyAction::Probe { url } => {
            let url = url.unwrap_or_else(|| ctx.settings.comfy_url.clone());
            let outcome = client.probe(&url, skip, None).await;
            println!("{}", outcome);
            if !outcome.is_connected() {
                anyhow::bail!("ComfyUI at {} is not usable", url);
            }
        }
        ComfyAction::Resources { save } => {
            let res = client
                .fetch_resources(&ctx.settings.comfy_url, skip)
                .await
                .context("Connected but the model list could not be fetched")?;
            println!("checkpoints: {}", res.checkpoints.join(", "));
            println!("loras:       {}", res.loras.join(", "));
            println!("samplers:    {}", res.samplers.join(", "));
            println!("schedulers:  {}", res.schedulers.join(", "));
            if save {
                res.apply_to(&mut ctx.settings);
                ctx.save_settings().await?;
                println!("Saved to settings.");
            }
        }
        ComfyAction::Generate { prompt, character } => {
            let character = match character {
                Some(key) => ctx.character(&key).await?,
                None => Character::default(),
            };
            let url = client.generate(&prompt, &character, &ctx.settings).await?;
            println!("{}", url);
        }
        ComfyAction::TogglePort => {
            ctx.settings.comfy_url = toggle_port(&ctx.settings.comfy_url);
            ctx.save_settings().await?;
            println!("{}", ctx.settings.comfy_url);
        }
        ComfyAction::Preset { id } => {
            let preset = WorkflowPreset::find(&id).with_context(|| format!("Unknown preset '{}'", id))?;
            preset.apply(&mut ctx.settings.comfy_config);
            ctx.save_settings().await?;
            println!("Applied {}", preset.label);
        }
        ComfyAction::PromptPreset { id } => {
            let preset = PromptPreset::find(&id).with_context(|| format!("Unknown prompt preset '{}'", id))?;
            preset.apply(&mut ctx.settings.comfy_config);
            ctx.save_settings().await?;
            println!("Applied {}", preset.label);
        }
        ComfyAction::Presets => {
            for p in WORKFLOW_PRESETS.iter() {
                println!(
                    "{:<16} {}x{} steps={} cfg={} {}",
                    p.id, p.width, p.height, p.steps, p.cfg, p.sampler
                );
            }
            for p in POSITIVE_PROMPT_PRESETS.iter() {
                println!("{:<16} {}", p.id, p.value);
            }
        }
    }
    Ok(())
}

// ============================================================================
// ollama
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum OllamaAction {
    /// List models installed on the Ollama server
    Models {
        #[arg(long)]
        url: Option<String>,
    },
}

pub async fn ollama(ctx: &AppContext, action: OllamaAction) -> Result<()> {
    match action {
        OllamaAction::Models { url } => {
            let base = url
                .or_else(|| ctx.settings.provider_configs.ollama.url().map(str::to_string))
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string());
            let models = list_models(&reqwest::Client::new(), &base).await;
            if models.is_empty() {
                println!("No models found at {}", base);
            }
            for m in models {
                println!("{}", m);
            }
        }
    }
    Ok(())
}
