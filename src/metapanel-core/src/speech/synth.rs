//! Production speech backend: cloud TTS requests plus the offline engine,
//! played on the shared audio output.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::{PanelError, Result};
use crate::speech::offline::OfflineSynth;
use crate::speech::playback::AudioOutput;
use crate::speech::{AmplitudeFrame, ResolvedProvider, ResolvedSpeechJob, SpeechBackend};

/// Azure output format; MP3 keeps responses small and decodes everywhere.
const AZURE_OUTPUT_FORMAT: &str = "audio-24khz-48kbitrate-mono-mp3";
const ELEVEN_TTS_ENDPOINT: &str = "https://api.elevenlabs.io/v1/text-to-speech";
const ELEVEN_MODEL_ID: &str = "eleven_multilingual_v2";
const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

struct AzureStyle {
    style: &'static str,
    degree: &'static str,
    rate: &'static str,
    pitch: &'static str,
}

/// Per-persona SSML delivery profiles for the built-in panel.
const AZURE_STYLES: [(&str, AzureStyle); 5] = [
    (
        "maya",
        AzureStyle { style: "empathetic", degree: "1", rate: "-5%", pitch: "-2st" },
    ),
    (
        "otto",
        AzureStyle { style: "formal", degree: "1", rate: "-10%", pitch: "-1st" },
    ),
    (
        "sarah",
        AzureStyle { style: "cheerful", degree: "1", rate: "+5%", pitch: "+1st" },
    ),
    (
        "marcus",
        AzureStyle { style: "professional", degree: "1", rate: "+0%", pitch: "+0st" },
    ),
    (
        "jessica",
        AzureStyle { style: "serious", degree: "1", rate: "-2%", pitch: "-1st" },
    ),
];

fn azure_style(persona_id: Option<&str>) -> Option<&'static AzureStyle> {
    let id = persona_id?;
    AZURE_STYLES
        .iter()
        .find(|(key, _)| *key == id)
        .map(|(_, style)| style)
}

/// The production [`SpeechBackend`]: synthesizes audio for a resolved job
/// and plays it through the process-wide audio output.
pub struct Synthesizer {
    http: reqwest::Client,
    offline: OfflineSynth,
    output: AudioOutput,
}

impl Synthesizer {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            offline: OfflineSynth::new(),
            output: AudioOutput::new(),
        })
    }

    async fn synthesize_azure(
        &self,
        text: &str,
        voice: &str,
        region: &str,
        key: &str,
        persona_id: Option<&str>,
    ) -> Result<Vec<u8>> {
        let url = format!(
            "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
            region
        );
        let ssml = build_ssml(text, voice, persona_id);
        let response = self
            .http
            .post(&url)
            .header("Ocp-Apim-Subscription-Key", key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", AZURE_OUTPUT_FORMAT)
            .header("User-Agent", "metapanel")
            .body(ssml)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PanelError::Speech(format!(
                "Azure TTS returned HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn synthesize_elevenlabs(
        &self,
        text: &str,
        voice: &str,
        api_key: &str,
    ) -> Result<Vec<u8>> {
        let url = eleven_tts_url(voice)?;
        let body = serde_json::json!({
            "text": text,
            "model_id": ELEVEN_MODEL_ID,
            "voice_settings": { "stability": 0.5, "similarity_boost": 0.8 },
        });
        let response = self
            .http
            .post(url)
            .query(&[("optimize_streaming_latency", "4")])
            .header("xi-api-key", api_key)
            .header("Accept", "audio/mpeg")
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PanelError::Speech(format!(
                "ElevenLabs returned HTTP {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechBackend for Synthesizer {
    async fn speak(
        &self,
        job: &ResolvedSpeechJob,
        amp: broadcast::Sender<AmplitudeFrame>,
    ) -> Result<()> {
        debug!(provider = ?job.provider, voice = %job.voice, "synthesizing speech");
        let bytes = match &job.provider {
            ResolvedProvider::Offline => self.offline.synthesize_wav(&job.text, &job.voice).await?,
            ResolvedProvider::Azure { region, key } => {
                self.synthesize_azure(&job.text, &job.voice, region, key, job.persona_id.as_deref())
                    .await?
            }
            ResolvedProvider::ElevenLabs { api_key } => {
                self.synthesize_elevenlabs(&job.text, &job.voice, api_key)
                    .await?
            }
        };
        if bytes.is_empty() {
            return Ok(());
        }
        self.output.play(bytes, job.persona_id.clone(), amp).await
    }
}

/// ElevenLabs endpoint with the voice id as an encoded path segment; voice
/// ids are user-configured and can carry reserved characters.
fn eleven_tts_url(voice: &str) -> Result<Url> {
    let mut url = Url::parse(ELEVEN_TTS_ENDPOINT)
        .map_err(|e| PanelError::Speech(format!("bad ElevenLabs endpoint: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| PanelError::Speech("bad ElevenLabs endpoint".to_string()))?
        .push(voice);
    Ok(url)
}

/// Build the SSML document for one Azure utterance. Personas with a known
/// delivery profile get an `express-as` wrapper and prosody adjustments.
fn build_ssml(text: &str, voice: &str, persona_id: Option<&str>) -> String {
    let escaped = escape_xml(text);
    let inner = match azure_style(persona_id) {
        Some(profile) => format!(
            "<mstts:express-as style=\"{}\" styledegree=\"{}\"><prosody rate=\"{}\" pitch=\"{}\">{}</prosody></mstts:express-as>",
            profile.style, profile.degree, profile.rate, profile.pitch, escaped
        ),
        None => format!("<prosody>{}</prosody>", escaped),
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<speak version=\"1.0\" xml:lang=\"en-US\" xmlns:mstts=\"https://www.w3.org/2001/mstts\"><voice name=\"{}\">{}</voice></speak>",
        voice, inner
    )
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
