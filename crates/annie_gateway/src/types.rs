use annie_core::{AppSettings, Attachment, Message, VoiceProfile};
use annie_reasoning::{Trigger, VisualSource};
use annie_voice::AudioResult;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// What the browser sent to start a turn.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TriggerBody {
    Text {
        text: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
        /// "camera" or "screen" when a captured frame is attached.
        #[serde(default)]
        visual: Option<String>,
    },
    Voice {
        audio: String,
        #[serde(default)]
        duration: u32,
    },
    Sticker {
        #[serde(rename = "stickerId")]
        sticker_id: String,
    },
    RedPacket {
        amount: f64,
        #[serde(default)]
        note: Option<String>,
    },
    Draw,
    Selfie,
}

impl TriggerBody {
    pub fn into_trigger(self, settings: &AppSettings) -> Result<Trigger, ApiError> {
        Ok(match self {
            TriggerBody::Text {
                text,
                attachments,
                visual,
            } => {
                let visual = match visual.as_deref() {
                    None => None,
                    Some("camera") => Some(VisualSource::Camera),
                    Some("screen") => Some(VisualSource::Screen),
                    Some(other) => {
                        return Err(ApiError::bad_request(format!("unknown visual source '{}'", other)))
                    }
                };
                Trigger::Text {
                    text,
                    attachments,
                    visual,
                }
            }
            TriggerBody::Voice { audio, duration } => Trigger::Voice {
                audio,
                duration_secs: duration,
            },
            TriggerBody::Sticker { sticker_id } => {
                let sticker = settings
                    .sticker_library
                    .iter()
                    .find(|s| s.id == sticker_id)
                    .cloned()
                    .ok_or_else(|| ApiError::not_found(format!("sticker '{}'", sticker_id)))?;
                Trigger::Sticker(sticker)
            }
            TriggerBody::RedPacket { amount, note } => Trigger::RedPacket { amount, note },
            TriggerBody::Draw => Trigger::Draw,
            TriggerBody::Selfie => Trigger::Selfie,
        })
    }
}

/// Result of one chat turn, including any follow-up speech and drawing.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurnResponse {
    pub appended: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio: Option<AudioResult>,
    /// A drawing is rendering; it is appended to the session when ready.
    pub image_pending: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechRequest {
    pub text: String,
    #[serde(default)]
    pub voice_id: Option<String>,
    /// An unsaved profile to try out; wins over `voice_id`.
    #[serde(default)]
    pub profile: Option<VoiceProfile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub prompt: String,
    #[serde(default)]
    pub character_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeRequest {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupRequest {
    pub name: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scenario: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextBody {
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub filter: Option<String>,
}

/// JSON error body with a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("not found: {}", what.into()),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }
}

impl From<annie_core::Error> for ApiError {
    fn from(e: annie_core::Error) -> Self {
        let status = match e {
            annie_core::Error::NotFound(_) => StatusCode::NOT_FOUND,
            annie_core::Error::Invalid(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: format!("{:#}", e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({"error": self.message}))).into_response()
    }
}
