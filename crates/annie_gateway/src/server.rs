use crate::types::{
    ApiError, ChatTurnResponse, GroupRequest, ImageRequest, ProbeRequest, SearchQuery, SpeechRequest,
    TextBody, TriggerBody,
};
use annie_core::card::import_card;
use annie_core::settings::DEFAULT_OLLAMA_URL;
use annie_core::social::{find_moment_mut, prepend_moment};
use annie_core::voice::find_voice;
use annie_core::{
    AppSettings, Character, CharacterGroup, ImageRenderer, Message, Moment, Repository, SearchFilter,
    VoiceProfile,
};
use annie_image::{ComfyClient, ComfyResources, ProbeReport};
use annie_reasoning::providers::ollama::list_models;
use annie_reasoning::social::refresh_moments;
use annie_reasoning::{ChatEngine, ClientFactory, ImageJob};
use annie_voice::{AudioResult, TtsDispatcher};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Shared state for the gateway server.
pub struct GatewayState {
    /// Every load-modify-save sequence holds this lock. Slow backend calls
    /// run outside it.
    store: RwLock<Repository>,
    clients: Arc<dyn ClientFactory>,
    engine: ChatEngine,
    comfy: ComfyClient,
    http: reqwest::Client,
}

impl GatewayState {
    pub fn new(repo: Repository, clients: Arc<dyn ClientFactory>) -> Self {
        Self {
            store: RwLock::new(repo),
            engine: ChatEngine::new(clients.clone()),
            clients,
            comfy: ComfyClient::default(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_comfy(mut self, comfy: ComfyClient) -> Self {
        self.comfy = comfy;
        self
    }

    pub fn with_group_delay(mut self, delay: Duration) -> Self {
        self.engine = ChatEngine::new(self.clients.clone()).with_group_delay(delay);
        self
    }

    fn tts(&self, settings: &AppSettings) -> TtsDispatcher {
        TtsDispatcher::new(self.http.clone(), settings.managed_api_key())
    }
}

/// The local HTTP API a browser UI drives the core through.
///
/// - `GET /health`: health check
/// - `/api/*`: settings, characters, voices, groups, sessions, speech,
///   images, ComfyUI helpers, model discovery and moments
pub struct GatewayServer {
    state: Arc<GatewayState>,
    host: String,
    port: u16,
}

impl GatewayServer {
    pub fn new(state: GatewayState, host: &str, port: u16) -> Self {
        Self {
            state: Arc::new(state),
            host: host.to_string(),
            port,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Bind and serve until the process stops.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Gateway listening on {}", addr);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Serve in a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("Gateway server error: {}", e);
            }
        })
    }
}

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/settings", get(get_settings).put(put_settings))
        .route("/api/characters", get(list_characters).post(create_character))
        .route("/api/characters/import", post(import_character))
        .route(
            "/api/characters/:id",
            get(get_character).put(put_character).delete(delete_character),
        )
        .route("/api/voices", get(get_voices).put(put_voices))
        .route("/api/groups", get(list_groups).post(create_group))
        .route("/api/groups/:id", delete(delete_group))
        .route("/api/sessions/:id/messages", get(get_messages).delete(clear_messages))
        .route("/api/sessions/:id/messages/:message_id", delete(delete_message))
        .route("/api/sessions/:id/search", get(search_messages))
        .route("/api/sessions/:id/turn", post(chat_turn))
        .route("/api/speech", post(speech))
        .route("/api/image", post(generate_image))
        .route("/api/comfy/probe", post(comfy_probe))
        .route("/api/comfy/resources", get(comfy_resources))
        .route("/api/ollama/models", get(ollama_models))
        .route("/api/moments", get(list_moments))
        .route("/api/moments/refresh", post(refresh_feed))
        .route("/api/moments/:id/like", post(like_moment))
        .route("/api/moments/:id/comments", post(comment_moment))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Route handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

async fn get_settings(State(state): State<Arc<GatewayState>>) -> ApiResult<AppSettings> {
    let repo = state.store.read().await;
    Ok(Json(repo.load_settings().await?))
}

/// PUT /api/settings: the body is merged over the stored record.
async fn put_settings(
    State(state): State<Arc<GatewayState>>,
    Json(patch): Json<Value>,
) -> ApiResult<AppSettings> {
    let repo = state.store.write().await;
    let current = serde_json::to_value(repo.load_settings().await?)
        .map_err(annie_core::Error::from)?;
    let mut merged = current;
    annie_core::settings::deep_merge(&mut merged, &patch);
    let settings = AppSettings::from_stored(&merged)?;
    repo.save_settings(&settings).await?;
    Ok(Json(settings))
}

async fn list_characters(State(state): State<Arc<GatewayState>>) -> ApiResult<Vec<Character>> {
    let repo = state.store.read().await;
    Ok(Json(repo.load_characters().await?))
}

async fn create_character(
    State(state): State<Arc<GatewayState>>,
    Json(mut character): Json<Character>,
) -> Result<(StatusCode, Json<Character>), ApiError> {
    if character.name.trim().is_empty() {
        return Err(ApiError::bad_request("character name is required"));
    }
    let repo = state.store.write().await;
    let mut chars = repo.load_characters().await?;
    if character.id.is_empty() || chars.iter().any(|c| c.id == character.id) {
        character.id = annie_core::short_id();
    }
    chars.push(character.clone());
    repo.save_characters(&chars).await?;
    tracing::info!("Created character {}", character.name);
    Ok((StatusCode::CREATED, Json(character)))
}

/// POST /api/characters/import: TavernAI/Chub card JSON.
async fn import_character(
    State(state): State<Arc<GatewayState>>,
    Json(card): Json<Value>,
) -> Result<(StatusCode, Json<Character>), ApiError> {
    let repo = state.store.write().await;
    let voices = repo.load_voices().await?;
    let voice_id = voices.first().map(|v| v.id.clone()).unwrap_or_default();
    let character = import_card(&card, &voice_id)?;
    let mut chars = repo.load_characters().await?;
    chars.push(character.clone());
    repo.save_characters(&chars).await?;
    Ok((StatusCode::CREATED, Json(character)))
}

async fn get_character(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> ApiResult<Character> {
    let repo = state.store.read().await;
    repo.load_characters()
        .await?
        .into_iter()
        .find(|c| c.id == id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("character {}", id)))
}

async fn put_character(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    Json(mut character): Json<Character>,
) -> ApiResult<Character> {
    let repo = state.store.write().await;
    let mut chars = repo.load_characters().await?;
    let slot = chars
        .iter_mut()
        .find(|c| c.id == id)
        .ok_or_else(|| ApiError::not_found(format!("character {}", id)))?;
    character.id = id;
    *slot = character.clone();
    repo.save_characters(&chars).await?;
    Ok(Json(character))
}

/// DELETE /api/characters/:id: also drops the character's transcript.
async fn delete_character(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let repo = state.store.write().await;
    let mut chars = repo.load_characters().await?;
    let before = chars.len();
    chars.retain(|c| c.id != id);
    if chars.len() == before {
        return Err(ApiError::not_found(format!("character {}", id)));
    }
    repo.save_characters(&chars).await?;
    repo.delete_transcript(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_voices(State(state): State<Arc<GatewayState>>) -> ApiResult<Vec<VoiceProfile>> {
    let repo = state.store.read().await;
    Ok(Json(repo.load_voices().await?))
}

async fn put_voices(
    State(state): State<Arc<GatewayState>>,
    Json(voices): Json<Vec<VoiceProfile>>,
) -> ApiResult<Vec<VoiceProfile>> {
    let repo = state.store.write().await;
    repo.save_voices(&voices).await?;
    Ok(Json(voices))
}

async fn list_groups(State(state): State<Arc<GatewayState>>) -> ApiResult<Vec<CharacterGroup>> {
    let repo = state.store.read().await;
    Ok(Json(repo.load_groups().await?))
}

async fn create_group(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<GroupRequest>,
) -> Result<(StatusCode, Json<CharacterGroup>), ApiError> {
    let mut group = CharacterGroup::new(&req.name, req.members)?;
    if !req.description.is_empty() {
        group.description = req.description;
    }
    if !req.scenario.is_empty() {
        group.scenario = req.scenario;
    }
    let repo = state.store.write().await;
    let mut groups = repo.load_groups().await?;
    groups.push(group.clone());
    repo.save_groups(&groups).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn delete_group(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let repo = state.store.write().await;
    let mut groups = repo.load_groups().await?;
    groups.retain(|g| g.id != id);
    repo.save_groups(&groups).await?;
    repo.delete_transcript(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/sessions/:id/messages: an empty character session is seeded
/// with its greeting first.
async fn get_messages(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Message>> {
    let repo = state.store.write().await;
    let mut transcript = repo.load_transcript(&id).await?;
    if transcript.is_empty() {
        let chars = repo.load_characters().await?;
        if let Some(character) = chars.iter().find(|c| c.id == id) {
            if ChatEngine::open_session(&mut transcript, character) {
                repo.save_transcript(&transcript).await?;
            }
        }
    }
    Ok(Json(transcript.messages))
}

async fn clear_messages(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let repo = state.store.write().await;
    repo.delete_transcript(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_message(
    State(state): State<Arc<GatewayState>>,
    Path((id, message_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let repo = state.store.write().await;
    let mut transcript = repo.load_transcript(&id).await?;
    if !transcript.delete(&message_id) {
        return Err(ApiError::not_found(format!("message {}", message_id)));
    }
    repo.save_transcript(&transcript).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn search_messages(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<Message>> {
    let filter = match query.filter.as_deref() {
        None | Some("all") => SearchFilter::All,
        Some("image") => SearchFilter::Image,
        Some("voice") => SearchFilter::Voice,
        Some(other) => return Err(ApiError::bad_request(format!("unknown filter '{}'", other))),
    };
    let repo = state.store.read().await;
    let transcript = repo.load_transcript(&id).await?;
    Ok(Json(
        transcript
            .search(&query.q, filter)
            .into_iter()
            .cloned()
            .collect(),
    ))
}

/// POST /api/sessions/:id/turn: the id names a character or a group.
///
/// The store lock is held only to read the session and to merge the new
/// messages back. Speech runs unlocked, and a scheduled drawing renders in
/// the background and is appended to the session when it arrives.
async fn chat_turn(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    Json(body): Json<TriggerBody>,
) -> ApiResult<ChatTurnResponse> {
    let (settings, characters, groups, voices, mut transcript) = {
        let repo = state.store.read().await;
        (
            repo.load_settings().await?,
            repo.load_characters().await?,
            repo.load_groups().await?,
            repo.load_voices().await?,
            repo.load_transcript(&id).await?,
        )
    };
    let trigger = body.into_trigger(&settings)?;
    let before = transcript.messages.len();
    let mut resp = ChatTurnResponse::default();

    if let Some(character) = characters.iter().find(|c| c.id == id) {
        ChatEngine::open_session(&mut transcript, character);
        let outcome = state
            .engine
            .single_turn(&mut transcript, character, &settings, trigger)
            .await?;
        append_to_session(&state, &id, &transcript.messages[before..]).await?;
        resp.appended = outcome.appended;
        resp.error = outcome.error;

        if let Some(job) = outcome.image_job {
            resp.image_pending = true;
            spawn_drawing(state.clone(), id.clone(), character.clone(), settings.clone(), job);
        }
        if let Some(text) = outcome.speak {
            if let Some(profile) = find_voice(&voices, &character.voice_id) {
                match state.tts(&settings).generate_speech(&text, profile).await {
                    Ok(audio) => resp.audio = audio,
                    Err(e) => tracing::warn!("Speech for {} failed: {}", character.name, e),
                }
            }
        }
        return Ok(Json(resp));
    }

    let group = groups
        .iter()
        .find(|g| g.id == id)
        .ok_or_else(|| ApiError::not_found(format!("session {}", id)))?;
    let outcome = state
        .engine
        .group_turn(&mut transcript, group, &characters, &settings, trigger)
        .await?;
    append_to_session(&state, &id, &transcript.messages[before..]).await?;
    resp.appended = outcome.appended;
    resp.error = outcome.error;
    Ok(Json(resp))
}

/// Append messages to the stored session under the write lock. Messages
/// written meanwhile by other requests are kept.
async fn append_to_session(
    state: &GatewayState,
    session_id: &str,
    messages: &[Message],
) -> Result<(), ApiError> {
    let repo = state.store.write().await;
    let mut stored = repo.load_transcript(session_id).await?;
    stored.append_missing(messages);
    repo.save_transcript(&stored).await?;
    Ok(())
}

fn spawn_drawing(
    state: Arc<GatewayState>,
    session_id: String,
    character: Character,
    settings: AppSettings,
    job: ImageJob,
) {
    tokio::spawn(async move {
        let Some(msg) = ChatEngine::render_image(&character, &settings, &state.comfy, &job).await else {
            tracing::warn!("No drawing for {} in session {}", character.name, session_id);
            return;
        };
        if let Err(e) = append_to_session(&state, &session_id, std::slice::from_ref(&msg)).await {
            tracing::error!("Failed to save drawing for session {}: {}", session_id, e.message);
        }
    });
}

async fn speech(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<SpeechRequest>,
) -> ApiResult<Option<AudioResult>> {
    let repo = state.store.read().await;
    let settings = repo.load_settings().await?;
    let profile = match req.profile {
        Some(p) => p,
        None => {
            let voices = repo.load_voices().await?;
            find_voice(&voices, req.voice_id.as_deref().unwrap_or_default())
                .cloned()
                .ok_or_else(|| ApiError::not_found("voice"))?
        }
    };
    drop(repo);
    let audio = state
        .tts(&settings)
        .generate_speech(&req.text, &profile)
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?;
    Ok(Json(audio))
}

async fn generate_image(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<ImageRequest>,
) -> ApiResult<Value> {
    let repo = state.store.read().await;
    let settings = repo.load_settings().await?;
    let character = match req.character_id.as_deref() {
        Some(id) => repo
            .load_characters()
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ApiError::not_found(format!("character {}", id)))?,
        None => Character::default(),
    };
    drop(repo);
    let url = state
        .comfy
        .generate(&req.prompt, &character, &settings)
        .await
        .map_err(|e| ApiError::bad_gateway(e.to_string()))?;
    Ok(Json(json!({ "url": url })))
}

async fn comfy_probe(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<ProbeRequest>,
) -> ApiResult<ProbeReport> {
    let settings = state.store.read().await.load_settings().await?;
    let url = req.url.unwrap_or(settings.comfy_url);
    let outcome = state
        .comfy
        .probe(&url, settings.comfy_config.skip_warning(), req.origin.as_deref())
        .await;
    Ok(Json(outcome.report()))
}

#[derive(Debug, Default, Deserialize)]
struct ResourcesQuery {
    #[serde(default)]
    save: bool,
}

/// GET /api/comfy/resources?save=true: `save` stores the lists on the settings.
async fn comfy_resources(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ResourcesQuery>,
) -> ApiResult<ComfyResources> {
    let repo = state.store.write().await;
    let mut settings = repo.load_settings().await?;
    let resources = state
        .comfy
        .fetch_resources(&settings.comfy_url, settings.comfy_config.skip_warning())
        .await
        .ok_or_else(|| ApiError::bad_gateway("connected but the model list could not be fetched"))?;
    if query.save {
        resources.apply_to(&mut settings);
        repo.save_settings(&settings).await?;
    }
    Ok(Json(resources))
}

async fn ollama_models(State(state): State<Arc<GatewayState>>) -> ApiResult<Vec<String>> {
    let settings = state.store.read().await.load_settings().await?;
    let base = settings
        .provider_configs
        .ollama
        .url()
        .unwrap_or(DEFAULT_OLLAMA_URL)
        .to_string();
    Ok(Json(list_models(&state.http, &base).await))
}

async fn list_moments(State(state): State<Arc<GatewayState>>) -> ApiResult<Vec<Moment>> {
    let repo = state.store.read().await;
    Ok(Json(repo.load_moments().await?))
}

/// POST /api/moments/refresh: `null` when no post could be generated. The
/// post is written unlocked and prepended to the feed as stored at the end.
async fn refresh_feed(State(state): State<Arc<GatewayState>>) -> ApiResult<Option<Moment>> {
    let (settings, characters) = {
        let repo = state.store.read().await;
        (repo.load_settings().await?, repo.load_characters().await?)
    };
    let mut drafts = Vec::new();
    let Some(moment) = refresh_moments(
        state.clients.as_ref(),
        Some(&state.comfy as &dyn ImageRenderer),
        &characters,
        &settings,
        &mut drafts,
    )
    .await
    else {
        return Ok(Json(None));
    };
    let repo = state.store.write().await;
    let mut feed = repo.load_moments().await?;
    prepend_moment(&mut feed, moment.clone());
    repo.save_moments(&feed).await?;
    Ok(Json(Some(moment)))
}

async fn like_moment(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    let repo = state.store.write().await;
    let mut feed = repo.load_moments().await?;
    let liked = find_moment_mut(&mut feed, &id)?.toggle_like();
    repo.save_moments(&feed).await?;
    Ok(Json(json!({ "liked": liked })))
}

async fn comment_moment(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    Json(body): Json<TextBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let repo = state.store.write().await;
    let settings = repo.load_settings().await?;
    let mut feed = repo.load_moments().await?;
    let comment = find_moment_mut(&mut feed, &id)?
        .add_comment(&settings.user_persona, &body.text)?
        .clone();
    repo.save_moments(&feed).await?;
    Ok((StatusCode::CREATED, Json(json!(comment))))
}
