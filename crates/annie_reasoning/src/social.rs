//! Generated social-feed posts ("moments").

use crate::api_types::ChatRequest;
use crate::llm::ClientFactory;
use annie_core::character::DEFAULT_CHARACTER_MODEL;
use annie_core::social::prepend_moment;
use annie_core::{AppSettings, Character, ImageRenderer, Moment, ProviderKind};
use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPost {
    pub content: String,
    #[serde(default)]
    pub image_prompt: Option<String>,
}

pub fn social_post_prompt(character: &Character) -> String {
    format!(
        "You are {}.\nPersona: {}\n\n\
         Task: Write a short social media post (like a Tweet or WeChat Moment) about your current mood, activity, or thought.\n\
         It should be casual and fit your personality.\n\
         Also provide a short visual description for an image to accompany this post.\n\n\
         Return JSON format: {{ \"content\": \"post text...\", \"imagePrompt\": \"visual description...\" }}",
        character.name, character.persona
    )
}

fn post_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "content": {"type": "STRING"},
            "imagePrompt": {"type": "STRING"}
        }
    })
}

/// Ask the managed API for a post in the character's voice. Other providers
/// and every failure give `None`.
pub async fn generate_social_post(
    clients: &dyn ClientFactory,
    character: &Character,
    settings: &AppSettings,
) -> Option<SocialPost> {
    if settings.api_provider != ProviderKind::Gemini {
        tracing::debug!("Social posts need the managed API, skipping");
        return None;
    }
    let client = match clients.client_for(settings) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("No client for social post: {:#}", e);
            return None;
        }
    };
    let request = ChatRequest {
        input: social_post_prompt(character),
        model: Some(DEFAULT_CHARACTER_MODEL.to_string()),
        response_schema: Some(post_schema()),
        ..ChatRequest::default()
    };
    let reply = match client.generate(request).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!("Failed to generate social post: {:#}", e);
            return None;
        }
    };
    match serde_json::from_str::<SocialPost>(&reply.text) {
        Ok(post) => Some(post),
        Err(e) => {
            tracing::warn!("Social post was not valid JSON: {}", e);
            None
        }
    }
}

/// Post a new moment for a random character, rendering its picture when the
/// image pipeline is enabled. The moment is prepended to `feed`.
pub async fn refresh_moments(
    clients: &dyn ClientFactory,
    renderer: Option<&dyn ImageRenderer>,
    characters: &[Character],
    settings: &AppSettings,
    feed: &mut Vec<Moment>,
) -> Option<Moment> {
    let character = characters.choose(&mut rand::thread_rng())?.clone();
    let post = generate_social_post(clients, &character, settings).await?;
    let prompt = post.image_prompt.as_deref().filter(|p| !p.is_empty());

    let image_url = match (settings.enable_comfyui, prompt, renderer) {
        (true, Some(p), Some(r)) => r.render(p, &character, settings).await,
        _ => None,
    };

    let moment = Moment::new(&character.id, &post.content, prompt, image_url);
    prepend_moment(feed, moment.clone());
    tracing::info!("{} posted a new moment", character.name);
    Some(moment)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_mentions_name_and_json_shape() {
        let mut c = Character::new("Annie", "v");
        c.persona = "Loves tea".into();
        let p = social_post_prompt(&c);
        assert!(p.starts_with("You are Annie.\nPersona: Loves tea"));
        assert!(p.contains("\"imagePrompt\""));
    }

    #[test]
    fn test_post_decodes_from_content_field() {
        let post: SocialPost =
            serde_json::from_str(r#"{"content": "Sunny day!", "imagePrompt": "a park"}"#).unwrap();
        assert_eq!(post.content, "Sunny day!");
        assert_eq!(post.image_prompt.as_deref(), Some("a park"));
    }
}
