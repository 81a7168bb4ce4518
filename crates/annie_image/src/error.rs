use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("ComfyUI error ({status}): {body}")]
    Status { status: u16, body: String },

    /// A tunnelling proxy answered with its HTML warning page.
    #[error("received HTML instead of JSON, likely a tunnel warning page")]
    Interstitial,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no image after {0} polling attempts")]
    Exhausted(u32),
}

pub type Result<T> = std::result::Result<T, ImageError>;
