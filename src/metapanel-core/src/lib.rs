//! Metapanel Core Library
//!
//! Puts one question to a panel of AI personas over an Ollama-compatible
//! chat endpoint, keeps the shared transcript, and narrates every answer
//! through a serialized speech playback queue.

pub mod chat;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod persona;
pub mod sanitize;
pub mod speech;
pub mod transcript;

pub use chat::{
    ChatBackend, ChatMessage, ChatOutcome, ChatRole, OllamaClient, DEFAULT_BASE_URL,
    FALLBACK_ANSWER,
};
pub use config::{ChatConfig, Config, SpeechConfig};
pub use error::{PanelError, Result};
pub use orchestrator::{PanelEvent, PanelMode, PanelOrchestrator, PanelRunConfig};
pub use persona::{default_panel, Persona};
pub use sanitize::sanitize_answer;
pub use speech::{
    AmplitudeFrame, PlaybackHandle, PlaybackQueue, SpeechBackend, SpeechJob, SpeechProvider,
    SpeechSettings, Synthesizer,
};
pub use transcript::{to_chat_history, PanelSession, Role, TranscriptMessage};
