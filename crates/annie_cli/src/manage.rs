use crate::chat;
use crate::context::AppContext;
use annie_core::card::import_card_bytes;
use annie_core::social::find_moment_mut;
use annie_core::{Character, CharacterGroup, ImageRenderer, ProviderKind};
use annie_image::ComfyClient;
use annie_reasoning::social::refresh_moments;
use annie_reasoning::ProviderDispatcher;
use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::PathBuf;

// ============================================================================
// character
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum CharacterAction {
    /// List characters
    List,
    /// Print one character as JSON
    Show { character: String },
    /// Create a character
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        persona: String,
        #[arg(long, default_value = "")]
        appearance: String,
        #[arg(long)]
        greeting: Option<String>,
        /// Voice id; the first saved voice when omitted
        #[arg(long)]
        voice: Option<String>,
    },
    /// Import a TavernAI / Chub card (JSON or PNG)
    Import { file: PathBuf },
    /// Delete a character and its chat history
    Delete { character: String },
    /// Add a long-term memory
    AddMemory {
        character: String,
        content: String,
        #[arg(long, default_value_t = 5)]
        importance: u8,
    },
    /// Add a keyword-triggered lore entry
    AddLore {
        character: String,
        /// Comma-separated trigger keywords
        #[arg(long, value_delimiter = ',', required = true)]
        keys: Vec<String>,
        content: String,
    },
}

async fn default_voice_id(ctx: &AppContext) -> Result<String> {
    Ok(ctx
        .repo
        .load_voices()
        .await?
        .first()
        .map(|v| v.id.clone())
        .unwrap_or_default())
}

/// Load the roster, let `f` change the matching character, then save.
async fn update_character<F>(ctx: &AppContext, key: &str, f: F) -> Result<Character>
where
    F: FnOnce(&mut Character),
{
    let mut chars = ctx.repo.load_characters().await?;
    let slot = chars
        .iter_mut()
        .find(|c| c.id == key || c.name.eq_ignore_ascii_case(key))
        .with_context(|| format!("No character matches '{}'", key))?;
    f(slot);
    let updated = slot.clone();
    ctx.repo.save_characters(&chars).await?;
    Ok(updated)
}

pub async fn character(ctx: &AppContext, action: CharacterAction) -> Result<()> {
    match action {
        CharacterAction::List => {
            for c in ctx.repo.load_characters().await? {
                println!("{:<16} {:<20} {}", c.id, c.name, c.description);
            }
        }
        CharacterAction::Show { character } => {
            let c = ctx.character(&character).await?;
            println!("{}", serde_json::to_string_pretty(&c)?);
        }
        CharacterAction::Create {
            name,
            description,
            persona,
            appearance,
            greeting,
            voice,
        } => {
            if name.trim().is_empty() {
                anyhow::bail!("Character name is required");
            }
            let voice_id = match voice {
                Some(v) => v,
                None => default_voice_id(ctx).await?,
            };
            let mut c = Character::new(name.trim(), &voice_id);
            c.description = description;
            c.persona = persona;
            c.appearance = appearance;
            if let Some(g) = greeting {
                c.greetings = vec![g];
            }
            let mut chars = ctx.repo.load_characters().await?;
            chars.push(c.clone());
            ctx.repo.save_characters(&chars).await?;
            println!("Created {} ({})", c.name, c.id);
        }
        CharacterAction::Import { file } => {
            let bytes =
                std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let c = import_card_bytes(&bytes, &default_voice_id(ctx).await?)
                .with_context(|| format!("Failed to import {}", file.display()))?;
            let mut chars = ctx.repo.load_characters().await?;
            chars.push(c.clone());
            ctx.repo.save_characters(&chars).await?;
            println!("Imported {} ({})", c.name, c.id);
        }
        CharacterAction::Delete { character } => {
            let target = ctx.character(&character).await?;
            let mut chars = ctx.repo.load_characters().await?;
            chars.retain(|c| c.id != target.id);
            ctx.repo.save_characters(&chars).await?;
            ctx.repo.delete_transcript(&target.id).await?;
            println!("Deleted {}", target.name);
        }
        CharacterAction::AddMemory {
            character,
            content,
            importance,
        } => {
            let c = update_character(ctx, &character, |c| c.add_memory(&content, importance)).await?;
            println!("{} now has {} memories", c.name, c.memories.len());
        }
        CharacterAction::AddLore {
            character,
            keys,
            content,
        } => {
            let keys: Vec<String> = keys
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect();
            let c = update_character(ctx, &character, |c| c.add_lore(keys, &content)).await?;
            println!("{} now has {} lore entries", c.name, c.world_info.len());
        }
    }
    Ok(())
}

// ============================================================================
// group
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum GroupAction {
    /// List groups
    List,
    /// Create a group from two or more characters
    Create {
        name: String,
        /// Character ids or names
        #[arg(required = true, num_args = 2..)]
        members: Vec<String>,
    },
    /// Delete a group and its chat history
    Delete { group: String },
    /// Chat with a group interactively
    Chat { group: String },
}

async fn find_group(ctx: &AppContext, key: &str) -> Result<CharacterGroup> {
    ctx.repo
        .load_groups()
        .await?
        .into_iter()
        .find(|g| g.id == key || g.name.eq_ignore_ascii_case(key))
        .with_context(|| format!("No group matches '{}'", key))
}

pub async fn group(ctx: &AppContext, action: GroupAction) -> Result<()> {
    match action {
        GroupAction::List => {
            let chars = ctx.repo.load_characters().await?;
            for g in ctx.repo.load_groups().await? {
                let names: Vec<&str> = g
                    .members
                    .iter()
                    .map(|id| {
                        chars
                            .iter()
                            .find(|c| &c.id == id)
                            .map(|c| c.name.as_str())
                            .unwrap_or(id.as_str())
                    })
                    .collect();
                println!("{:<16} {:<20} {}", g.id, g.name, names.join(", "));
            }
        }
        GroupAction::Create { name, members } => {
            let mut ids = Vec::with_capacity(members.len());
            for key in &members {
                ids.push(ctx.character(key).await?.id);
            }
            let group = CharacterGroup::new(&name, ids)?;
            let mut groups = ctx.repo.load_groups().await?;
            groups.push(group.clone());
            ctx.repo.save_groups(&groups).await?;
            println!("Created {} ({})", group.name, group.id);
        }
        GroupAction::Delete { group } => {
            let target = find_group(ctx, &group).await?;
            let mut groups = ctx.repo.load_groups().await?;
            groups.retain(|g| g.id != target.id);
            ctx.repo.save_groups(&groups).await?;
            ctx.repo.delete_transcript(&target.id).await?;
            println!("Deleted {}", target.name);
        }
        GroupAction::Chat { group } => {
            let target = find_group(ctx, &group).await?;
            chat::run_group(ctx, target).await?;
        }
    }
    Ok(())
}

// ============================================================================
// settings
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SettingsAction {
    /// Print the settings as JSON
    Show,
    /// Choose the text provider: gemini, openai-compatible, ollama, tata-core
    SetProvider { provider: String },
    /// Set a provider's API key (the active provider by default)
    SetKey {
        key: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Set a provider's model
    SetModel {
        model: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Set a provider's base URL
    SetUrl {
        url: String,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Print where data is stored
    Path,
}

fn provider_or_active(ctx: &AppContext, provider: Option<String>) -> Result<ProviderKind> {
    match provider {
        Some(p) => Ok(p.parse::<ProviderKind>()?),
        None => Ok(ctx.settings.api_provider),
    }
}

pub async fn settings(mut ctx: AppContext, action: SettingsAction) -> Result<()> {
    match action {
        SettingsAction::Show => {
            println!("{}", serde_json::to_string_pretty(&ctx.settings)?);
            return Ok(());
        }
        SettingsAction::Path => {
            println!("{}", ctx.data_dir.display());
            return Ok(());
        }
        SettingsAction::SetProvider { provider } => {
            ctx.settings.api_provider = provider.parse::<ProviderKind>()?;
        }
        SettingsAction::SetKey { key, provider } => {
            let kind = provider_or_active(&ctx, provider)?;
            ctx.settings.provider_configs.get_mut(kind).api_key = Some(key);
        }
        SettingsAction::SetModel { model, provider } => {
            let kind = provider_or_active(&ctx, provider)?;
            ctx.settings.provider_configs.get_mut(kind).model = model;
        }
        SettingsAction::SetUrl { url, provider } => {
            let kind = provider_or_active(&ctx, provider)?;
            ctx.settings.provider_configs.get_mut(kind).base_url = Some(url);
        }
    }
    ctx.save_settings().await?;
    let active = ctx.settings.active_provider();
    println!(
        "provider={} model={} url={}",
        ctx.settings.api_provider,
        active.model,
        active.url().unwrap_or("-")
    );
    Ok(())
}

// ============================================================================
// moments
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum MomentsAction {
    /// Show the feed, newest first
    List,
    /// Have a random character write a new post
    Refresh,
    /// Like or unlike a post
    Like { id: String },
    /// Comment on a post as the user persona
    Comment { id: String, text: String },
}

pub async fn moments(ctx: &AppContext, action: MomentsAction) -> Result<()> {
    let mut feed = ctx.repo.load_moments().await?;
    match action {
        MomentsAction::List => {
            let chars = ctx.repo.load_characters().await?;
            for m in &feed {
                let author = chars
                    .iter()
                    .find(|c| c.id == m.character_id)
                    .map(|c| c.name.as_str())
                    .unwrap_or("?");
                println!(
                    "[{}] {} {}  likes={} comments={}",
                    m.id,
                    author,
                    chat::format_time(m.timestamp),
                    m.likes.len(),
                    m.comments.len()
                );
                println!("    {}", m.content);
                for url in m.image_urls.iter().flatten() {
                    println!("    image: {}", url);
                }
                for c in &m.comments {
                    println!("    {}: {}", c.user_name, c.content);
                }
            }
            return Ok(());
        }
        MomentsAction::Refresh => {
            let chars = ctx.repo.load_characters().await?;
            let comfy = ComfyClient::default();
            let moment = refresh_moments(
                &ProviderDispatcher::new(),
                Some(&comfy as &dyn ImageRenderer),
                &chars,
                &ctx.settings,
                &mut feed,
            )
            .await
            .context("No post was generated")?;
            println!("New post {}: {}", moment.id, moment.content);
        }
        MomentsAction::Like { id } => {
            let liked = find_moment_mut(&mut feed, &id)?.toggle_like();
            println!("{}", if liked { "Liked" } else { "Unliked" });
        }
        MomentsAction::Comment { id, text } => {
            find_moment_mut(&mut feed, &id)?.add_comment(&ctx.settings.user_persona, &text)?;
            println!("Commented");
        }
    }
    ctx.repo.save_moments(&feed).await?;
    Ok(())
}
