//! Configuration module: TOML file on disk, secrets from the environment.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chat::DEFAULT_BASE_URL;
use crate::error::{PanelError, Result};
use crate::orchestrator::{PanelMode, PanelRunConfig};
use crate::persona::{default_panel, Persona};
use crate::speech::{SpeechProvider, SpeechSettings};

/// Environment variable holding the Azure Speech subscription key.
pub const AZURE_KEY_ENV: &str = "AZURE_SPEECH_KEY";
/// Environment variable holding the ElevenLabs API key.
pub const ELEVEN_KEY_ENV: &str = "ELEVEN_API_KEY";

/// Largest usable context window.
pub const MAX_CONTEXT_WINDOW: usize = 50;

/// Root configuration. Every field has a default, so an empty (or missing)
/// file is valid.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chat: ChatConfig,
    pub speech: SpeechConfig,
    /// Roster override; empty means the built-in panel.
    pub personas: Vec<Persona>,
}

/// Chat endpoint and panel behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub base_url: String,
    pub default_model: String,
    /// Transcript entries sent as context, clamped to `0..=50`.
    pub context_window: usize,
    pub mode: PanelMode,
    /// Per-persona model overrides keyed by persona id.
    pub persona_models: HashMap<String, String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: "llama3.1".to_string(),
            context_window: 20,
            mode: PanelMode::Sequential,
            persona_models: HashMap::new(),
        }
    }
}

/// Speech provider selection and voices. Keys are deliberately not stored
/// here; they come from the environment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub provider: SpeechProvider,
    /// Voice used when a persona has no override.
    pub default_voice: String,
    /// Azure region such as "eastus"; the key comes from `AZURE_SPEECH_KEY`.
    pub azure_region: String,
    /// Per-persona voice overrides keyed by persona id.
    pub persona_voices: HashMap<String, String>,
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields the
    /// defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            PanelError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML content.
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)
            .map_err(|e| PanelError::Config(format!("Failed to parse config: {}", e)))?;
        config.chat.context_window = config.chat.context_window.min(MAX_CONTEXT_WINDOW);
        Ok(config)
    }

    /// Write configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PanelError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path.as_ref(), content).map_err(|e| {
            PanelError::Config(format!("Failed to write {}: {}", path.as_ref().display(), e))
        })
    }

    /// The roster to seat: configured personas, else the built-in panel.
    pub fn roster(&self) -> Vec<Persona> {
        if self.personas.is_empty() {
            default_panel()
        } else {
            self.personas.clone()
        }
    }

    /// Per-run orchestrator parameters.
    pub fn run_config(&self) -> PanelRunConfig {
        PanelRunConfig {
            mode: self.chat.mode,
            context_window: self.chat.context_window.min(MAX_CONTEXT_WINDOW),
            default_model: self.chat.default_model.clone(),
            persona_models: self.chat.persona_models.clone(),
        }
    }

    /// Speech settings with keys pulled from the environment. Under the
    /// Azure provider, personas without a configured voice fall back to
    /// their roster voice hint; configured voices always win.
    pub fn speech_settings(&self, roster: &[Persona]) -> SpeechSettings {
        let mut persona_voices = self.speech.persona_voices.clone();
        if self.speech.provider == SpeechProvider::Azure {
            for persona in roster {
                if let Some(hint) = &persona.voice_hint {
                    let voice = persona_voices.entry(persona.id.clone()).or_default();
                    if voice.is_empty() {
                        *voice = hint.clone();
                    }
                }
            }
        }
        SpeechSettings {
            provider: self.speech.provider,
            default_voice: self.speech.default_voice.clone(),
            persona_voices,
            azure_region: some_nonempty(self.speech.azure_region.clone()),
            azure_key: std::env::var(AZURE_KEY_ENV).ok().and_then(some_nonempty),
            eleven_api_key: std::env::var(ELEVEN_KEY_ENV).ok().and_then(some_nonempty),
        }
    }
}

fn some_nonempty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
