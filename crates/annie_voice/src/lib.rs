//! Speech for characters: text-to-speech over six backend shapes, PCM
//! helpers, and the duplex live-audio session.

mod error;
pub mod live;
pub mod pcm;
pub mod tts;

pub use error::{Result, VoiceError};
pub use live::{LiveEvent, LiveSession, LiveSessionConfig};
pub use pcm::{decode_pcm16, encode_pcm16, wav_from_pcm16, PcmChunk};
pub use tts::{ping_server, sanitize_for_speech, AudioResult, SpeechSynthesizer, TtsDispatcher};
