//! Connectivity check for the diffusion server.

use crate::client::ComfyClient;
use crate::endpoint::normalize_url;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Connected,
    /// `0.0.0.0` is a listen address, not a destination.
    WildcardAddress,
    /// The UI was opened from a local file.
    FileOrigin,
    /// A secure page cannot reach a plain-HTTP server.
    MixedContent,
    /// A tunnel answered with its HTML warning page.
    Interstitial,
    /// The tunnel is up but nothing listens behind it.
    BadGateway,
    HttpError(u16),
    Timeout,
    Network { custom_header: bool },
}

/// Wire form for UIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
}

impl ProbeOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, ProbeOutcome::Connected)
    }

    pub fn error_type(&self) -> Option<&'static str> {
        match self {
            ProbeOutcome::Interstitial => Some("ngrok_interstitial"),
            _ => None,
        }
    }

    pub fn report(&self) -> ProbeReport {
        ProbeReport {
            success: self.is_connected(),
            message: (!self.is_connected()).then(|| self.to_string()),
            error_type: self.error_type(),
        }
    }

    fn classify(status: StatusCode, content_type: Option<&str>) -> Self {
        if status.is_success() {
            if content_type.is_some_and(|ct| ct.contains("text/html")) {
                ProbeOutcome::Interstitial
            } else {
                ProbeOutcome::Connected
            }
        } else if status == StatusCode::BAD_GATEWAY {
            ProbeOutcome::BadGateway
        } else {
            ProbeOutcome::HttpError(status.as_u16())
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Connected => write!(f, "Connected"),
            ProbeOutcome::WildcardAddress => {
                write!(f, "Address error: use http://127.0.0.1:8190 instead of 0.0.0.0")
            }
            ProbeOutcome::FileOrigin => {
                write!(f, "Browser security restriction: serve the page over HTTP")
            }
            ProbeOutcome::MixedContent => write!(
                f,
                "Mixed content: an HTTPS page cannot reach a local HTTP service. Use an HTTPS tunnel URL."
            ),
            ProbeOutcome::Interstitial => {
                write!(f, "Tunnel warning page intercepted the request (auth required)")
            }
            ProbeOutcome::BadGateway => write!(
                f,
                "502 Bad Gateway: the tunnel is connected but ComfyUI was not found. Check the port (8190 or 8188)."
            ),
            ProbeOutcome::HttpError(code) => write!(f, "HTTP Error: {}", code),
            ProbeOutcome::Timeout => write!(f, "Connection timed out"),
            ProbeOutcome::Network { custom_header: true } => write!(
                f,
                "Network error: the server may reject the custom tunnel header (CORS). Try disabling tunnel compatibility mode."
            ),
            ProbeOutcome::Network { custom_header: false } => write!(
                f,
                "Network error: CORS blocked or the service is not running. Try enabling tunnel compatibility mode."
            ),
        }
    }
}

impl ComfyClient {
    /// Check reachability. `client_origin` is the URL of the page issuing the
    /// check, when there is one.
    pub async fn probe(&self, url: &str, skip_warning: bool, client_origin: Option<&str>) -> ProbeOutcome {
        let target = normalize_url(url);

        if target.contains("//0.0.0.0") {
            return ProbeOutcome::WildcardAddress;
        }
        if let Some(origin) = client_origin {
            if origin.starts_with("file:") {
                return ProbeOutcome::FileOrigin;
            }
            if origin.starts_with("https:") && target.starts_with("http:") {
                return ProbeOutcome::MixedContent;
            }
        }

        let attempt = async {
            let stats = self
                .request(Method::GET, &format!("{}/system_stats", target), skip_warning)
                .send()
                .await;
            match stats {
                Ok(resp) if resp.status().is_success() => Ok(resp),
                _ => {
                    self.request(Method::GET, &format!("{}/", target), skip_warning)
                        .send()
                        .await
                }
            }
        };

        match tokio::time::timeout(self.probe_budget, attempt).await {
            Err(_) => ProbeOutcome::Timeout,
            Ok(Err(e)) => {
                tracing::warn!("ComfyUI connection failed: {}", e);
                if e.is_timeout() {
                    ProbeOutcome::Timeout
                } else {
                    ProbeOutcome::Network {
                        custom_header: skip_warning,
                    }
                }
            }
            Ok(Ok(resp)) => {
                let content_type = resp
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok());
                ProbeOutcome::classify(resp.status(), content_type)
            }
        }
    }
}
