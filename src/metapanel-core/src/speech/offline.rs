//! Offline speech synthesis with the bundled kokoro-tiny engine.
//!
//! Needs no configuration: the model is downloaded on first use and kept
//! alive for the rest of the process. The engine has a strict input length
//! limit, so text is split into small chunks with silence padding between
//! them.

use kokoro_tiny::TtsEngine;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{PanelError, Result};

/// Voice used when none is configured or the requested one is unknown.
pub const DEFAULT_OFFLINE_VOICE: &str = "af_sky";

/// Engine output sample rate.
const SAMPLE_RATE: u32 = 24_000;
/// Safe per-chunk character limit for the engine.
const MAX_CHUNK_CHARS: usize = 200;
/// Pause between chunks (0.3 s at 24 kHz) to prevent cutoff.
const INTER_CHUNK_SILENCE: usize = 7_200;
/// Trailing padding (0.5 s) so the final word is not clipped.
const TRAILING_SILENCE: usize = 12_000;

struct EngineState {
    engine: TtsEngine,
    available_voices: Vec<String>,
}

/// Lazily initialized offline synthesizer.
pub struct OfflineSynth {
    state: Mutex<Option<EngineState>>,
}

impl OfflineSynth {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Synthesize `text` as WAV bytes. Empty and unknown voices fall back
    /// to [`DEFAULT_OFFLINE_VOICE`].
    pub async fn synthesize_wav(&self, text: &str, voice: &str) -> Result<Vec<u8>> {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            info!("initializing offline speech engine (downloads model on first run)");
            let engine = TtsEngine::new().await.map_err(|e| {
                PanelError::Speech(format!("failed to initialize speech engine: {}", e))
            })?;
            let available_voices = engine.voices();
            *guard = Some(EngineState {
                engine,
                available_voices,
            });
        }
        let Some(state) = guard.as_mut() else {
            return Err(PanelError::Speech("speech engine unavailable".to_string()));
        };

        let voice = if !voice.is_empty() && state.available_voices.iter().any(|v| v == voice) {
            voice
        } else {
            debug!(requested = voice, "voice not available offline, using default");
            DEFAULT_OFFLINE_VOICE
        };

        let mut all_samples: Vec<f32> = Vec::new();
        for chunk in split_into_chunks(text, MAX_CHUNK_CHARS) {
            if chunk.trim().is_empty() {
                continue;
            }

            let samples = state
                .engine
                .synthesize(&chunk, Some(voice))
                .map_err(|e| PanelError::Speech(format!("synthesis failed: {}", e)))?;

            all_samples.extend(samples);
            all_samples.extend(vec![0.0; INTER_CHUNK_SILENCE]);
        }
        all_samples.extend(vec![0.0; TRAILING_SILENCE]);

        wav_bytes(&all_samples, SAMPLE_RATE)
    }
}

impl Default for OfflineSynth {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode mono f32 samples as an in-memory WAV container.
fn wav_bytes(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    let mut writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| PanelError::Speech(format!("failed to encode WAV: {}", e)))?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| PanelError::Speech(format!("failed to encode WAV: {}", e)))?;
    }
    writer
        .finalize()
        .map_err(|e| PanelError::Speech(format!("failed to encode WAV: {}", e)))?;
    Ok(cursor.into_inner())
}

/// Split text into chunks that are safe for synthesis.
fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current_chunk = String::new();

    // Split by sentence-ending punctuation
    for sentence in text.split_inclusive(&['.', '!', '?', ';'][..]) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        if current_chunk.len() + sentence.len() > max_chars {
            if !current_chunk.is_empty() {
                chunks.push(current_chunk.trim().to_string());
                current_chunk = String::new();
            }

            // If a single sentence is too long, split by commas
            if sentence.len() > max_chars {
                for part in sentence.split_inclusive(',') {
                    if current_chunk.len() + part.len() > max_chars
                        && !current_chunk.is_empty()
                    {
                        chunks.push(current_chunk.trim().to_string());
                        current_chunk = String::new();
                    }
                    current_chunk.push_str(part);
                    current_chunk.push(' ');
                }
            } else {
                current_chunk.push_str(sentence);
                current_chunk.push(' ');
            }
        } else {
            current_chunk.push_str(sentence);
            current_chunk.push(' ');
        }
    }

    if !current_chunk.trim().is_empty() {
        chunks.push(current_chunk.trim().to_string());
    }

    chunks
}
