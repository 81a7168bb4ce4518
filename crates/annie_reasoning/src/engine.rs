use crate::api_types::{ChatRequest, ChatTurn, InlineImage};
use crate::llm::ClientFactory;
use crate::prompts::ContextAssembler;
use crate::tags::process_reply;
use crate::trigger::{wants_drawing, Trigger};
use annie_core::character::VoiceFrequency;
use annie_core::{
    AppSettings, Character, CharacterGroup, ImageRenderer, Message, MessageKind, Transcript,
};
use anyhow::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

/// Pause after each reply in a group round.
pub const GROUP_REPLY_DELAY: Duration = Duration::from_millis(800);

/// Chance that an `occasionally` character speaks a reply aloud.
const OCCASIONAL_VOICE_CHANCE: f64 = 0.4;

const EMOTION: &str = "neutral";

/// A drawing the caller should render once the turn is shown.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageJob {
    pub prompt: String,
}

/// Everything one turn produced.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// Messages appended to the transcript, in order.
    pub appended: Vec<Message>,
    /// Reply text to synthesize, when the character should speak.
    pub speak: Option<String>,
    pub image_job: Option<ImageJob>,
    /// Provider failure, already recorded as a system message.
    pub error: Option<String>,
}

/// Decide whether a reply is spoken. `roll` is uniform in `[0, 1)`.
pub fn should_speak(frequency: VoiceFrequency, voice_trigger: bool, roll: f64) -> bool {
    match frequency {
        VoiceFrequency::Never => false,
        _ if voice_trigger => true,
        VoiceFrequency::Always => true,
        VoiceFrequency::Occasionally => roll <= OCCASIONAL_VOICE_CHANCE,
    }
}

pub struct ChatEngine {
    clients: Arc<dyn ClientFactory>,
    group_delay: Duration,
}

impl ChatEngine {
    pub fn new(clients: Arc<dyn ClientFactory>) -> Self {
        Self {
            clients,
            group_delay: GROUP_REPLY_DELAY,
        }
    }

    pub fn with_group_delay(mut self, delay: Duration) -> Self {
        self.group_delay = delay;
        self
    }

    /// Seed an empty single-character session with its greeting.
    pub fn open_session(transcript: &mut Transcript, character: &Character) -> bool {
        transcript.seed_greeting(character)
    }

    fn request_for(
        character: &Character,
        settings: &AppSettings,
        history: Vec<ChatTurn>,
        trigger: &Trigger,
        is_group: bool,
    ) -> (ChatRequest, Vec<String>) {
        let input = trigger.prompt_input();
        let prompt = ContextAssembler::build(character, settings, &input, is_group);
        let request = ChatRequest {
            system: prompt.system_prompt,
            history,
            input,
            images: InlineImage::from_attachments(trigger.attachments()),
            sampling: Some(character.config.clone()),
            model: Some(character.model.clone()),
            use_search: character.search_enabled() && settings.use_google_search,
            response_schema: None,
        };
        (request, prompt.active_lore)
    }

    fn record_failure(transcript: &mut Transcript, outcome: &mut TurnOutcome, err: anyhow::Error) {
        tracing::error!("Provider call failed: {:#}", err);
        let text = format!("{:#}", err);
        let msg = Message::system(format!("Error: {}", text));
        transcript.push(msg.clone());
        outcome.appended.push(msg);
        outcome.error = Some(text);
    }

    /// Run one single-character turn.
    ///
    /// Only an invalid trigger or a misconfigured provider is returned as
    /// `Err`; provider call failures end up in the transcript instead.
    #[tracing::instrument(skip_all, fields(character = %character.name))]
    pub async fn single_turn(
        &self,
        transcript: &mut Transcript,
        character: &Character,
        settings: &AppSettings,
        trigger: Trigger,
    ) -> Result<TurnOutcome> {
        trigger.validate()?;
        let client = self.clients.client_for(settings)?;
        let history = ChatTurn::from_messages(&transcript.messages);
        let mut outcome = TurnOutcome::default();

        if let Some(msg) = trigger.user_message(&settings.user_persona.name) {
            transcript.push(msg.clone());
            outcome.appended.push(msg);
        }

        let (request, active_lore) = Self::request_for(character, settings, history, &trigger, false);
        let reply = match client.generate(request).await {
            Ok(r) => r,
            Err(e) => {
                Self::record_failure(transcript, &mut outcome, e);
                return Ok(outcome);
            }
        };

        let processed = process_reply(&reply.text, settings);
        let mut ai = Message::assistant(character, MessageKind::Text, processed.text.clone());
        ai.emotion = Some(EMOTION.to_string());
        if !reply.sources.is_empty() {
            ai.sources = Some(reply.sources);
        }
        ai.active_lore = Some(active_lore);
        transcript.push(ai.clone());
        outcome.appended.push(ai);

        if let Some(sticker) = &processed.sticker {
            let tag = crate::tags::sticker_tag(&reply.text).unwrap_or_default();
            let mut msg =
                Message::assistant(character, MessageKind::Sticker, format!("[Sticker: {}]", tag));
            msg.image_url = Some(sticker.url.clone());
            transcript.push(msg.clone());
            outcome.appended.push(msg);
        }

        let roll = rand::thread_rng().gen::<f64>();
        if should_speak(character.voice_frequency, trigger.is_voice(), roll) {
            outcome.speak = Some(processed.text.clone());
        }

        // An explicit image tag always schedules a drawing; a drawing request
        // in the user's text only does so with the pipeline enabled.
        let typed = trigger
            .typed_text()
            .filter(|t| settings.enable_comfyui && wants_drawing(t));
        outcome.image_job = processed
            .image_prompt
            .or_else(|| typed.map(str::to_string))
            .map(|prompt| ImageJob { prompt });

        tracing::info!(
            "Turn done: {} message(s), speak={}, image={}",
            outcome.appended.len(),
            outcome.speak.is_some(),
            outcome.image_job.is_some()
        );
        Ok(outcome)
    }

    /// Render a scheduled drawing into an image message, without touching
    /// any transcript.
    pub async fn render_image(
        character: &Character,
        settings: &AppSettings,
        renderer: &dyn ImageRenderer,
        job: &ImageJob,
    ) -> Option<Message> {
        let url = renderer.render(&job.prompt, character, settings).await?;
        let mut msg = Message::assistant(character, MessageKind::Image, job.prompt.clone());
        msg.image_url = Some(url);
        Some(msg)
    }

    /// Render a scheduled drawing and append it. Nothing is appended when the
    /// renderer gives up.
    pub async fn complete_image(
        transcript: &mut Transcript,
        character: &Character,
        settings: &AppSettings,
        renderer: &dyn ImageRenderer,
        job: &ImageJob,
    ) -> Option<Message> {
        let msg = Self::render_image(character, settings, renderer, job).await?;
        transcript.push(msg.clone());
        Some(msg)
    }

    /// Members named in the input, else one member picked at random.
    pub fn pick_responders<'a>(input: &str, members: &[&'a Character]) -> Vec<&'a Character> {
        let named: Vec<&Character> = members
            .iter()
            .copied()
            .filter(|c| !c.name.is_empty() && input.contains(&c.name))
            .collect();
        if !named.is_empty() {
            return named;
        }
        members
            .choose(&mut rand::thread_rng())
            .copied()
            .into_iter()
            .collect()
    }

    /// Run one group round. Responders answer strictly one after another with
    /// a pause after each; the first failure ends the round.
    #[tracing::instrument(skip_all, fields(group = %group.name))]
    pub async fn group_turn(
        &self,
        transcript: &mut Transcript,
        group: &CharacterGroup,
        roster: &[Character],
        settings: &AppSettings,
        trigger: Trigger,
    ) -> Result<TurnOutcome> {
        trigger.validate()?;
        let members: Vec<&Character> = roster
            .iter()
            .filter(|c| group.members.contains(&c.id))
            .collect();
        if members.is_empty() {
            anyhow::bail!("Group '{}' has no known members", group.name);
        }
        let client = self.clients.client_for(settings)?;
        let history = ChatTurn::from_messages(&transcript.messages);
        let mut outcome = TurnOutcome::default();

        if let Some(msg) = trigger.user_message(&settings.user_persona.name) {
            transcript.push(msg.clone());
            outcome.appended.push(msg);
        }

        let responders = Self::pick_responders(&trigger.prompt_input(), &members);
        for character in responders {
            let (request, _) =
                Self::request_for(character, settings, history.clone(), &trigger, true);
            match client.generate(request).await {
                Ok(reply) => {
                    let mut msg = Message::assistant(character, MessageKind::Text, reply.text);
                    msg.emotion = Some(EMOTION.to_string());
                    if !reply.sources.is_empty() {
                        msg.sources = Some(reply.sources);
                    }
                    transcript.push(msg.clone());
                    outcome.appended.push(msg);
                }
                Err(e) => {
                    Self::record_failure(transcript, &mut outcome, e);
                    break;
                }
            }
            tokio::time::sleep(self.group_delay).await;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_speak() {
        use VoiceFrequency::*;
        assert!(should_speak(Always, false, 0.99));
        assert!(!should_speak(Never, true, 0.0));
        assert!(should_speak(Occasionally, false, 0.4));
        assert!(!should_speak(Occasionally, false, 0.41));
        assert!(should_speak(Occasionally, true, 0.99));
    }

    #[test]
    fn test_pick_named_responders() {
        let a = Character::new("Annie", "v");
        let b = Character::new("Mei", "v");
        let c = Character::new("Rin", "v");
        let members = vec![&a, &b, &c];
        let picked = ChatEngine::pick_responders("Mei and Annie, hi", &members);
        let names: Vec<&str> = picked.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Annie", "Mei"]);
    }

    #[test]
    fn test_pick_random_responder_when_none_named() {
        let a = Character::new("Annie", "v");
        let b = Character::new("Mei", "v");
        let members = vec![&a, &b];
        let picked = ChatEngine::pick_responders("hello everyone", &members);
        assert_eq!(picked.len(), 1);
        assert!(picked[0].name == "Annie" || picked[0].name == "Mei");
    }
}
