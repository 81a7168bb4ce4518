use crate::context::AppContext;
use crate::media::write_audio;
use annie_core::voice::find_voice;
use annie_core::{
    Attachment, Character, CharacterGroup, Message, MessageKind, Role, SearchFilter, Transcript,
};
use annie_image::ComfyClient;
use annie_reasoning::{ChatEngine, ProviderDispatcher, Trigger, TurnOutcome};
use annie_voice::TtsDispatcher;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const HELP: &str = "\
/draw                 ask for a drawing
/selfie               ask for a selfie
/image <path>         send a picture
/sticker <id>         send a sticker from the library
/redpacket <amount> [note]
/history              show the conversation
/search [image|voice] <text>
/delete <message-id>
/clear                forget this conversation
/quit";

/// `HH:MM` in local time for a millisecond timestamp.
pub fn format_time(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&chrono::Local).format("%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn render(msg: &Message) -> String {
    let who = match msg.role {
        Role::User => "you".to_string(),
        Role::System => "system".to_string(),
        Role::Assistant => msg.sender_name.clone().unwrap_or_else(|| "?".into()),
    };
    let body = match msg.kind {
        MessageKind::Image | MessageKind::Sticker => format!(
            "[{}] {}",
            if msg.kind == MessageKind::Image { "image" } else { "sticker" },
            msg.image_url.as_deref().unwrap_or(&msg.content)
        ),
        MessageKind::Voice => format!("[voice {}s] {}", msg.audio_duration.unwrap_or(0), msg.content),
        MessageKind::Transaction => format!(
            "[red packet {:.2}] {}",
            msg.transaction_amount.unwrap_or(0.0),
            msg.content
        ),
        _ => msg.content.clone(),
    };
    format!("{}: {}", who, body)
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

/// What one REPL line asks for.
#[derive(Debug, PartialEq)]
enum Line {
    Quit,
    Help,
    History,
    Clear,
    Search(SearchFilter, String),
    Delete(String),
    Send(Trigger),
}

fn parse_line(input: &str, ctx: &AppContext) -> Result<Line> {
    let Some(rest) = input.strip_prefix('/') else {
        return Ok(Line::Send(Trigger::text(input)));
    };
    let (cmd, arg) = rest.split_once(' ').unwrap_or((rest, ""));
    let arg = arg.trim();
    Ok(match cmd {
        "quit" | "exit" | "q" => Line::Quit,
        "help" | "?" => Line::Help,
        "history" => Line::History,
        "clear" => Line::Clear,
        "draw" => Line::Send(Trigger::Draw),
        "selfie" => Line::Send(Trigger::Selfie),
        "delete" if !arg.is_empty() => Line::Delete(arg.to_string()),
        "search" => {
            let (first, tail) = arg.split_once(' ').unwrap_or((arg, ""));
            match first {
                "image" => Line::Search(SearchFilter::Image, tail.trim().to_string()),
                "voice" => Line::Search(SearchFilter::Voice, tail.trim().to_string()),
                _ => Line::Search(SearchFilter::All, arg.to_string()),
            }
        }
        "sticker" => {
            let sticker = ctx
                .settings
                .sticker_library
                .iter()
                .find(|s| s.id == arg)
                .cloned()
                .with_context(|| format!("No sticker '{}'", arg))?;
            Line::Send(Trigger::Sticker(sticker))
        }
        "redpacket" => {
            let (amount, note) = arg.split_once(' ').unwrap_or((arg, ""));
            let amount: f64 = amount
                .parse()
                .with_context(|| format!("'{}' is not an amount", amount))?;
            let note = Some(note.trim().to_string()).filter(|n| !n.is_empty());
            Line::Send(Trigger::RedPacket { amount, note })
        }
        "image" if !arg.is_empty() => {
            let path = PathBuf::from(arg);
            let bytes =
                std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            let attachment = Attachment::image(STANDARD.encode(bytes), mime_for(&path));
            Line::Send(Trigger::Text {
                text: String::new(),
                attachments: vec![attachment],
                visual: None,
            })
        }
        _ => anyhow::bail!("Unknown command /{} (try /help)", cmd),
    })
}

/// The two session shapes the REPL drives.
enum Session {
    Single {
        character: Character,
        audio_dir: Option<PathBuf>,
    },
    Group {
        group: CharacterGroup,
        roster: Vec<Character>,
    },
}

impl Session {
    fn id(&self) -> &str {
        match self {
            Session::Single { character, .. } => &character.id,
            Session::Group { group, .. } => &group.id,
        }
    }

    fn title(&self) -> &str {
        match self {
            Session::Single { character, .. } => &character.name,
            Session::Group { group, .. } => &group.name,
        }
    }
}

pub async fn run_single(ctx: &AppContext, character: Character, audio_dir: Option<PathBuf>) -> Result<()> {
    repl(
        ctx,
        Session::Single {
            character,
            audio_dir,
        },
    )
    .await
}

pub async fn run_group(ctx: &AppContext, group: CharacterGroup) -> Result<()> {
    let roster = ctx.repo.load_characters().await?;
    repl(ctx, Session::Group { group, roster }).await
}

async fn open_transcript(ctx: &AppContext, session: &Session) -> Result<Transcript> {
    let mut transcript = ctx.repo.load_transcript(session.id()).await?;
    if let Session::Single { character, .. } = session {
        if ChatEngine::open_session(&mut transcript, character) {
            ctx.repo.save_transcript(&transcript).await?;
        }
    }
    Ok(transcript)
}

async fn repl(ctx: &AppContext, session: Session) -> Result<()> {
    let engine = ChatEngine::new(Arc::new(ProviderDispatcher::new()));
    let comfy = ComfyClient::default();
    let mut transcript = open_transcript(ctx, &session).await?;

    let mut rl = DefaultEditor::new()?;
    let history_path = ctx.data_dir.join("repl_history.txt");
    let _ = rl.load_history(&history_path);

    println!("Chatting with {}. Type /help for commands.", session.title());
    for msg in transcript.messages.iter().rev().take(6).rev() {
        println!("{}", render(msg));
    }

    loop {
        let input = match rl.readline("you> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                tracing::error!("Readline error: {}", e);
                break;
            }
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(input);

        let line = match parse_line(input, ctx) {
            Ok(line) => line,
            Err(e) => {
                println!("{:#}", e);
                continue;
            }
        };
        match line {
            Line::Quit => break,
            Line::Help => println!("{}", HELP),
            Line::History => {
                for msg in &transcript.messages {
                    println!("{} [{}] {}", format_time(msg.timestamp), msg.id, render(msg));
                }
            }
            Line::Clear => {
                ctx.repo.delete_transcript(session.id()).await?;
                transcript = open_transcript(ctx, &session).await?;
                println!("Conversation cleared.");
            }
            Line::Search(filter, query) => {
                let hits = transcript.search(&query, filter);
                if hits.is_empty() {
                    println!("No matches.");
                }
                for msg in hits {
                    println!("[{}] {}", msg.id, render(msg));
                }
            }
            Line::Delete(id) => {
                if transcript.delete(&id) {
                    ctx.repo.save_transcript(&transcript).await?;
                    println!("Deleted {}", id);
                } else {
                    println!("No message {}", id);
                }
            }
            Line::Send(trigger) => {
                if let Err(e) = send(ctx, &engine, &comfy, &session, &mut transcript, trigger).await {
                    println!("{:#}", e);
                }
            }
        }
    }

    let _ = rl.save_history(&history_path);
    Ok(())
}

fn print_replies(outcome: &TurnOutcome) {
    for msg in outcome.appended.iter().filter(|m| m.role != Role::User) {
        println!("{}", render(msg));
    }
}

async fn send(
    ctx: &AppContext,
    engine: &ChatEngine,
    comfy: &ComfyClient,
    session: &Session,
    transcript: &mut Transcript,
    trigger: Trigger,
) -> Result<()> {
    match session {
        Session::Group { group, roster } => {
            let outcome = engine
                .group_turn(transcript, group, roster, &ctx.settings, trigger)
                .await?;
            ctx.repo.save_transcript(transcript).await?;
            print_replies(&outcome);
        }
        Session::Single {
            character,
            audio_dir,
        } => {
            let outcome = engine
                .single_turn(transcript, character, &ctx.settings, trigger)
                .await?;
            ctx.repo.save_transcript(transcript).await?;
            print_replies(&outcome);

            if let (Some(text), Some(dir)) = (&outcome.speak, audio_dir) {
                speak(ctx, character, text, dir).await;
            }
            if let Some(job) = &outcome.image_job {
                println!("({} is drawing...)", character.name);
                match ChatEngine::complete_image(transcript, character, &ctx.settings, comfy, job).await {
                    Some(msg) => {
                        ctx.repo.save_transcript(transcript).await?;
                        println!("{}", render(&msg));
                    }
                    None => println!("(the drawing did not come out)"),
                }
            }
        }
    }
    Ok(())
}

async fn speak(ctx: &AppContext, character: &Character, text: &str, dir: &Path) {
    let voices = match ctx.repo.load_voices().await {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("Failed to load voices: {}", e);
            return;
        }
    };
    let Some(profile) = find_voice(&voices, &character.voice_id) else {
        return;
    };
    let tts = TtsDispatcher::from_settings(&ctx.settings);
    match tts.generate_speech(text, profile).await {
        Ok(Some(audio)) => {
            let stem = format!("{}-{}", character.id, annie_core::now_millis());
            match write_audio(&audio, profile.provider, dir, &stem) {
                Ok(path) => println!("(voice: {})", path),
                Err(e) => tracing::warn!("Failed to save speech: {:#}", e),
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("Speech failed: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annie_core::AnnieConfig;

    async fn ctx() -> (tempfile::TempDir, AppContext) {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = AppContext::open(AnnieConfig::default(), Some(tmp.path().to_path_buf()))
            .await
            .unwrap();
        (tmp, ctx)
    }

    #[tokio::test]
    async fn test_parse_commands() {
        let (_tmp, ctx) = ctx().await;
        assert_eq!(parse_line("/quit", &ctx).unwrap(), Line::Quit);
        assert_eq!(parse_line("/draw", &ctx).unwrap(), Line::Send(Trigger::Draw));
        assert_eq!(
            parse_line("/search image cat", &ctx).unwrap(),
            Line::Search(SearchFilter::Image, "cat".into())
        );
        assert_eq!(
            parse_line("/search red fox", &ctx).unwrap(),
            Line::Search(SearchFilter::All, "red fox".into())
        );
        assert_eq!(
            parse_line("/redpacket 8.8 for you", &ctx).unwrap(),
            Line::Send(Trigger::RedPacket {
                amount: 8.8,
                note: Some("for you".into())
            })
        );
        assert!(parse_line("/redpacket lots", &ctx).is_err());
        assert!(parse_line("/sticker nope", &ctx).is_err());
        assert!(parse_line("/bogus", &ctx).is_err());
    }

    #[tokio::test]
    async fn test_plain_text_is_a_message() {
        let (_tmp, ctx) = ctx().await;
        match parse_line("hello there", &ctx).unwrap() {
            Line::Send(Trigger::Text { text, .. }) => assert_eq!(text, "hello there"),
            other => panic!("unexpected line: {other:?}"),
        }
    }

    #[test]
    fn test_render_kinds() {
        let mut msg = Message::user("User", MessageKind::Transaction, "gift");
        msg.transaction_amount = Some(5.0);
        assert_eq!(render(&msg), "you: [red packet 5.00] gift");
        assert_eq!(mime_for(Path::new("a.PNG")), "image/png");
    }
}
