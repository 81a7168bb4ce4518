use thiserror::Error;

#[derive(Debug, Error)]
pub enum VoiceError {
    /// Non-2xx response from a speech endpoint.
    #[error("API Error {status}: {reason}")]
    Api { status: u16, reason: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("voice '{0}' has no API URL")]
    MissingUrl(String),

    #[error("{0}")]
    InvalidAudio(String),

    #[error("live session: {0}")]
    Live(String),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VoiceError>;
