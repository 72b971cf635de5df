//! Spoken narration: provider selection, the serialized playback queue, and
//! amplitude feedback.

pub mod offline;
pub mod playback;
pub mod queue;
pub mod synth;

pub use queue::{PlaybackHandle, PlaybackQueue, SPEAKING_BASELINE};
pub use synth::Synthesizer;

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::Result;

/// Which synthesis service turns text into audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechProvider {
    /// Bundled neural TTS engine; no configuration required.
    #[default]
    Offline,
    /// Azure Cognitive Services neural voices.
    Azure,
    /// ElevenLabs hosted voices.
    ElevenLabs,
}

/// Speech configuration consumed by the queue. A snapshot is taken per job
/// at enqueue time, so changes apply from the next enqueued job.
#[derive(Debug, Clone, Default)]
pub struct SpeechSettings {
    pub provider: SpeechProvider,
    /// Voice used when a persona has no override.
    pub default_voice: String,
    /// Per-persona voice overrides keyed by persona id.
    pub persona_voices: HashMap<String, String>,
    pub azure_region: Option<String>,
    pub azure_key: Option<String>,
    pub eleven_api_key: Option<String>,
}

/// One utterance to narrate.
#[derive(Debug, Clone)]
pub struct SpeechJob {
    pub text: String,
    pub persona_id: Option<String>,
}

/// A job after voice resolution and provider pre-flight.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSpeechJob {
    pub text: String,
    pub persona_id: Option<String>,
    pub voice: String,
    pub provider: ResolvedProvider,
}

/// Provider routing decided per job. Cloud variants carry the credentials
/// they passed pre-flight with; an incomplete cloud configuration routes to
/// `Offline` instead.
#[derive(Clone, PartialEq, Eq)]
pub enum ResolvedProvider {
    Offline,
    Azure { region: String, key: String },
    ElevenLabs { api_key: String },
}

// Keys stay out of Debug output (and therefore out of logs).
impl fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedProvider::Offline => f.write_str("Offline"),
            ResolvedProvider::Azure { region, .. } => f
                .debug_struct("Azure")
                .field("region", region)
                .finish_non_exhaustive(),
            ResolvedProvider::ElevenLabs { .. } => {
                f.debug_struct("ElevenLabs").finish_non_exhaustive()
            }
        }
    }
}

/// Loudness sample for whoever is speaking right now.
///
/// Every job opens with a non-zero baseline frame and closes with exactly
/// one `amplitude == 0.0` frame before its handle resolves.
#[derive(Debug, Clone, PartialEq)]
pub struct AmplitudeFrame {
    pub persona_id: Option<String>,
    /// Normalized to `[0, 1]`.
    pub amplitude: f32,
}

/// Turns a resolved job into audible speech, emitting live amplitude frames
/// on `amp` while audio is playing.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn speak(
        &self,
        job: &ResolvedSpeechJob,
        amp: broadcast::Sender<AmplitudeFrame>,
    ) -> Result<()>;
}
