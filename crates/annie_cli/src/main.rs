use annie_core::AnnieConfig;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod chat;
mod context;
mod logging;
mod manage;
mod media;

use context::AppContext;

#[derive(Parser, Debug)]
#[command(name = "annie", author, version, about = "ANNIE: chat, talk and draw with AI companions")]
struct Cli {
    /// Path to annie.toml
    #[arg(short, long, global = true, env = "ANNIE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding characters, transcripts and settings
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log output format: plain or json
    #[arg(long, global = true)]
    log_format: Option<String>,

    /// Debug-level logging unless ANNIE_LOG / RUST_LOG say otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chat with one character in an interactive session
    Chat {
        /// Character id or name
        character: String,
        /// Save replies the character speaks as audio files
        #[arg(long)]
        speak: bool,
        /// Where spoken replies are written (defaults to <data-dir>/audio)
        #[arg(long)]
        audio_dir: Option<PathBuf>,
    },
    /// Manage and chat in character groups
    Group {
        #[command(subcommand)]
        action: manage::GroupAction,
    },
    /// Manage characters
    Character {
        #[command(subcommand)]
        action: manage::CharacterAction,
    },
    /// Voice library and speech synthesis
    Voice {
        #[command(subcommand)]
        action: media::VoiceAction,
    },
    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        action: manage::SettingsAction,
    },
    /// ComfyUI connectivity, resources and image generation
    Comfy {
        #[command(subcommand)]
        action: media::ComfyAction,
    },
    /// Local Ollama server helpers
    Ollama {
        #[command(subcommand)]
        action: media::OllamaAction,
    },
    /// The character social feed
    Moments {
        #[command(subcommand)]
        action: manage::MomentsAction,
    },
    /// Run the local HTTP gateway
    #[cfg(feature = "gateway")]
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(context::default_config_path);
    let config = AnnieConfig::load_or_default(&config_path);
    let format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    let _guard = logging::init(&config.logging, &format, cli.verbose);
    tracing::debug!("Using config {}", config_path.display());

    let ctx = AppContext::open(config, cli.data_dir).await?;

    match cli.command {
        Command::Chat {
            character,
            speak,
            audio_dir,
        } => {
            let character = ctx.character(&character).await?;
            let audio_dir = speak.then(|| audio_dir.unwrap_or_else(|| ctx.data_dir.join("audio")));
            chat::run_single(&ctx, character, audio_dir).await
        }
        Command::Group { action } => manage::group(&ctx, action).await,
        Command::Character { action } => manage::character(&ctx, action).await,
        Command::Voice { action } => media::voice(&ctx, action).await,
        Command::Settings { action } => manage::settings(ctx, action).await,
        Command::Comfy { action } => media::comfy(ctx, action).await,
        Command::Ollama { action } => media::ollama(&ctx, action).await,
        Command::Moments { action } => manage::moments(&ctx, action).await,
        #[cfg(feature = "gateway")]
        Command::Serve { host, port } => serve(ctx, host, port).await,
    }
}

#[cfg(feature = "gateway")]
async fn serve(ctx: AppContext, host: Option<String>, port: Option<u16>) -> Result<()> {
    use annie_gateway::{GatewayServer, GatewayState};
    use annie_reasoning::ProviderDispatcher;
    use std::sync::Arc;

    // Overrides from config and env are persisted so the browser sees them.
    ctx.save_settings().await?;
    let host = host.unwrap_or_else(|| ctx.config.gateway.host.clone());
    let port = port.unwrap_or(ctx.config.gateway.port);
    let state = GatewayState::new(ctx.repo, Arc::new(ProviderDispatcher::new()));
    let server = GatewayServer::new(state, &host, port);
    println!("ANNIE gateway on http://{}:{}  (Ctrl-C to stop)", host, port);

    tokio::select! {
        res = server.run() => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down gateway");
            Ok(())
        }
    }
}
