//! Raw 16-bit PCM helpers for the speech and live-audio paths.

use crate::error::{Result, VoiceError};
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Sample rate of audio coming back from the managed speech API.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;
/// Sample rate expected for microphone frames sent to a live session.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
pub const INPUT_MIME: &str = "audio/pcm;rate=16000";

/// Base64 of `<!DOCTYPE` / `<!DOCTYP`, i.e. an HTML page instead of audio.
const HTML_BASE64_PREFIX: &str = "PCFET0NUW";
const MIN_BASE64_LEN: usize = 50;

/// Mono float samples in `[-1, 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmChunk {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl PcmChunk {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode base64 little-endian PCM16 mono audio.
pub fn decode_pcm16(base64: &str, sample_rate: u32) -> Result<PcmChunk> {
    let trimmed = base64.trim();
    if trimmed.len() < MIN_BASE64_LEN {
        return Err(VoiceError::InvalidAudio(
            "Received empty or invalid audio data.".into(),
        ));
    }
    if trimmed.starts_with(HTML_BASE64_PREFIX) {
        return Err(VoiceError::InvalidAudio(
            "Server returned HTML. Check your port settings.".into(),
        ));
    }
    let bytes = STANDARD
        .decode(trimmed)
        .map_err(|e| VoiceError::InvalidAudio(format!("bad base64 audio: {}", e)))?;
    if bytes.len() % 2 != 0 {
        return Err(VoiceError::InvalidAudio(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }
    let samples = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect();
    Ok(PcmChunk {
        samples,
        sample_rate,
    })
}

/// Encode float samples as base64 PCM16 for a live session. Returns the data
/// and its mime type.
pub fn encode_pcm16(samples: &[f32]) -> (String, &'static str) {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        // `as` saturates, so full-scale input stays in range.
        let v = (s * 32768.0) as i16;
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    (STANDARD.encode(bytes), INPUT_MIME)
}

/// Wrap raw PCM16 mono bytes in a WAV container.
pub fn wav_from_pcm16(pcm: &[u8], sample_rate: u32) -> Vec<u8> {
    let channels: u16 = 1;
    let bits: u16 = 16;
    let byte_rate = sample_rate * u32::from(channels) * u32::from(bits) / 8;
    let block_align = channels * bits / 8;
    let data_len = pcm.len() as u32;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}
