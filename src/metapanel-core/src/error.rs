//! Error types for the panel system.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PanelError>;

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Speech synthesis error: {0}")]
    Speech(String),

    #[error("Audio playback error: {0}")]
    Playback(String),
}
