//! Session transcript and chat-history translation.
//!
//! The transcript is append-only: one user turn per question, one assistant
//! turn per produced panel answer.

use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::persona::Persona;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in the session transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    /// Unique within a session ("m-1", "m-2", ...).
    pub id: String,
    pub role: Role,
    /// Producing persona; `Some` iff `role == Assistant`.
    pub persona_id: Option<String>,
    pub text: String,
}

/// In-memory conversation state for one application session.
#[derive(Debug, Default)]
pub struct PanelSession {
    transcript: Vec<TranscriptMessage>,
    next_id: u64,
}

impl PanelSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full transcript so far, oldest first.
    pub fn transcript(&self) -> &[TranscriptMessage] {
        &self.transcript
    }

    /// Append a user turn and return a copy of the stored entry.
    pub fn push_user(&mut self, text: impl Into<String>) -> TranscriptMessage {
        self.push(Role::User, None, text.into())
    }

    /// Append an assistant turn attributed to a persona.
    pub fn push_assistant(
        &mut self,
        persona_id: impl Into<String>,
        text: impl Into<String>,
    ) -> TranscriptMessage {
        self.push(Role::Assistant, Some(persona_id.into()), text.into())
    }

    fn push(&mut self, role: Role, persona_id: Option<String>, text: String) -> TranscriptMessage {
        self.next_id += 1;
        let message = TranscriptMessage {
            id: format!("m-{}", self.next_id),
            role,
            persona_id,
            text,
        };
        self.transcript.push(message.clone());
        message
    }
}

/// Translate the transcript tail into chat-backend history.
///
/// User turns map verbatim. Assistant turns become `"<Name>: <text>"` so each
/// persona can see who said what; an unknown persona id is attributed to
/// "Assistant". `window` selects the last N entries; 0 means no prior context.
pub fn to_chat_history(
    transcript: &[TranscriptMessage],
    roster: &[Persona],
    window: usize,
) -> Vec<ChatMessage> {
    let start = transcript.len().saturating_sub(window);
    transcript[start..]
        .iter()
        .map(|m| match m.role {
            Role::User => ChatMessage::user(&m.text),
            Role::Assistant => {
                let speaker = m
                    .persona_id
                    .as_deref()
                    .and_then(|id| roster.iter().find(|p| p.id == id))
                    .map(|p| p.name.as_str())
                    .unwrap_or("Assistant");
                ChatMessage::assistant(format!("{}: {}", speaker, m.text))
            }
        })
        .collect()
}
