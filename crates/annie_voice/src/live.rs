//! Duplex audio session with the managed live API over a websocket.

use crate::error::{Result, VoiceError};
use crate::pcm::encode_pcm16;
use annie_core::VoiceName;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use url::Url;

pub const LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";
pub const LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

#[derive(Debug, Clone)]
pub struct LiveSessionConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub voice: VoiceName,
    pub system_instruction: String,
}

impl LiveSessionConfig {
    pub fn new(api_key: &str, voice: VoiceName, system_instruction: &str) -> Self {
        Self {
            endpoint: LIVE_ENDPOINT.to_string(),
            api_key: api_key.to_string(),
            model: LIVE_MODEL.to_string(),
            voice,
            system_instruction: system_instruction.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Base64 PCM16 audio at 24 kHz.
    Audio(String),
    Transcription { text: String, is_user: bool },
    /// The model stopped speaking because the user cut in.
    Interrupted,
    Closed,
}

/// First frame of every session.
pub fn setup_message(config: &LiveSessionConfig) -> Value {
    json!({
        "setup": {
            "model": format!("models/{}", config.model),
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {"prebuiltVoiceConfig": {"voiceName": config.voice.as_str()}}
                }
            },
            "systemInstruction": {"parts": [{"text": config.system_instruction}]},
            "inputAudioTranscription": {},
            "outputAudioTranscription": {}
        }
    })
}

/// Events carried by one server frame. Unknown frames yield nothing.
pub fn parse_server_message(raw: &str) -> Vec<LiveEvent> {
    let Ok(msg) = serde_json::from_str::<Value>(raw) else {
        tracing::debug!("Ignoring non-JSON live frame");
        return vec![];
    };
    let content = &msg["serverContent"];
    let mut events = vec![];
    if let Some(audio) = content["modelTurn"]["parts"][0]["inlineData"]["data"].as_str() {
        events.push(LiveEvent::Audio(audio.to_string()));
    }
    if let Some(text) = content["outputTranscription"]["text"].as_str() {
        events.push(LiveEvent::Transcription {
            text: text.to_string(),
            is_user: false,
        });
    }
    if let Some(text) = content["inputTranscription"]["text"].as_str() {
        events.push(LiveEvent::Transcription {
            text: text.to_string(),
            is_user: true,
        });
    }
    if content["interrupted"].as_bool() == Some(true) {
        events.push(LiveEvent::Interrupted);
    }
    events
}

/// An open live session. Dropping it stops the socket task.
pub struct LiveSession {
    outgoing: mpsc::Sender<String>,
    task: JoinHandle<()>,
}

impl LiveSession {
    pub async fn connect(config: LiveSessionConfig) -> Result<(Self, mpsc::Receiver<LiveEvent>)> {
        let mut url = Url::parse(&config.endpoint)
            .map_err(|e| VoiceError::Live(format!("invalid endpoint: {}", e)))?;
        if !config.api_key.is_empty() {
            url.query_pairs_mut().append_pair("key", &config.api_key);
        }

        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| VoiceError::Live(format!("connect failed: {}", e)))?;
        tracing::info!("Live session connected");
        let (mut write, mut read) = ws.split();

        write
            .send(Message::Text(setup_message(&config).to_string()))
            .await
            .map_err(|e| VoiceError::Live(e.to_string()))?;

        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (event_tx, event_rx) = mpsc::channel::<LiveEvent>(64);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = read.next() => {
                        let text = match frame {
                            Some(Ok(Message::Text(t))) => t,
                            Some(Ok(Message::Binary(b))) => String::from_utf8_lossy(&b).into_owned(),
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                tracing::error!("Live session error: {}", e);
                                break;
                            }
                        };
                        for event in parse_server_message(&text) {
                            if event_tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(payload) = out_rx.recv() => {
                        if let Err(e) = write.send(Message::Text(payload)).await {
                            tracing::error!("Live session send failed: {}", e);
                            break;
                        }
                    }
                }
            }
            tracing::info!("Live session closed");
            let _ = event_tx.send(LiveEvent::Closed).await;
        });

        Ok((
            Self {
                outgoing: out_tx,
                task,
            },
            event_rx,
        ))
    }

    /// Stream one microphone frame (float samples at 16 kHz).
    pub async fn send_audio(&self, samples: &[f32]) -> Result<()> {
        let (data, mime) = encode_pcm16(samples);
        let frame = json!({
            "realtimeInput": {"mediaChunks": [{"mimeType": mime, "data": data}]}
        });
        self.outgoing
            .send(frame.to_string())
            .await
            .map_err(|_| VoiceError::Live("session task dropped".into()))
    }

    pub fn close(self) {}
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}
