//! Panel orchestration: which persona answers when, and what context each
//! one sees.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::chat::{ChatBackend, ChatMessage};
use crate::persona::Persona;
use crate::sanitize::sanitize_answer;
use crate::speech::{PlaybackQueue, SpeechJob};
use crate::transcript::{to_chat_history, PanelSession, TranscriptMessage};

/// Appended to each persona's system prompt in sequential mode.
const SEQUENTIAL_INSTRUCTION: &str =
    "\n\nYou are one panelist among several. Build on previous panelists' points when helpful.";
/// Appended to each persona's system prompt in the concurrent first phase.
const CONCURRENT_INSTRUCTION: &str = "\n\nYou are one panelist among several.";
/// Appended to each persona's system prompt in the addendum phase.
const ADDENDUM_INSTRUCTION: &str =
    "\n\nProvide a brief addendum (1–2 sentences) responding to the panel so far.";
/// The user-turn ask for the addendum phase.
const ADDENDUM_PROMPT: &str =
    "Give a concise addendum (1–2 sentences) acknowledging or refining your point.";

/// How the panel produces answers to one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PanelMode {
    /// Personas answer one after another, each seeing the answers before it.
    #[default]
    Sequential,
    /// All personas answer concurrently and land in arrival order, then add
    /// short addenda in roster order.
    FastestFirst,
}

/// Per-run parameters, fixed while one question is being answered.
#[derive(Debug, Clone)]
pub struct PanelRunConfig {
    pub mode: PanelMode,
    /// Transcript entries included as context; 0 disables history.
    pub context_window: usize,
    pub default_model: String,
    /// Per-persona model overrides keyed by persona id.
    pub persona_models: HashMap<String, String>,
}

impl PanelRunConfig {
    pub fn new(mode: PanelMode, default_model: impl Into<String>) -> Self {
        Self {
            mode,
            context_window: 20,
            default_model: default_model.into(),
            persona_models: HashMap::new(),
        }
    }

    /// The model a persona answers with: its override if set, else the run
    /// default. Empty overrides count as unset.
    pub fn model_for(&self, persona_id: &str) -> &str {
        self.persona_models
            .get(persona_id)
            .map(String::as_str)
            .filter(|model| !model.is_empty())
            .unwrap_or(&self.default_model)
    }
}

/// Progress notifications emitted while a panel run executes.
#[derive(Debug, Clone)]
pub enum PanelEvent {
    /// A new phase of the run is starting.
    PhaseStarted { name: String },
    /// A persona's chat request is in flight.
    SpeakerThinking { persona_id: String },
    /// An answer was appended to the transcript and queued for narration.
    MessageReady { message: TranscriptMessage },
    /// All phases finished.
    RunCompleted,
}

/// Drives one panel run per question over a chat backend and a playback
/// queue.
pub struct PanelOrchestrator {
    chat: Arc<dyn ChatBackend>,
    queue: Arc<PlaybackQueue>,
    events: mpsc::UnboundedSender<PanelEvent>,
}

impl PanelOrchestrator {
    /// Create an orchestrator and the receiving end of its event stream.
    pub fn new(
        chat: Arc<dyn ChatBackend>,
        queue: Arc<PlaybackQueue>,
    ) -> (Self, mpsc::UnboundedReceiver<PanelEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                chat,
                queue,
                events,
            },
            receiver,
        )
    }

    /// Put one question to the whole panel.
    ///
    /// Appends the user turn and every produced answer to the session and
    /// returns the answers in emission order. Never fails: chat errors
    /// surface as the fallback sentence. A blank question or an empty
    /// roster is a complete no-op.
    pub async fn run_panel(
        &self,
        session: &mut PanelSession,
        question: &str,
        roster: &[Persona],
        config: &PanelRunConfig,
    ) -> Vec<TranscriptMessage> {
        let question = question.trim();
        if question.is_empty() || roster.is_empty() {
            return Vec::new();
        }

        // Context reflects the conversation before this question
        let history = to_chat_history(session.transcript(), roster, config.context_window);
        session.push_user(question);
        info!(mode = ?config.mode, panelists = roster.len(), "starting panel run");

        let produced = match config.mode {
            PanelMode::Sequential => {
                self.run_sequential(session, question, roster, config, history)
                    .await
            }
            PanelMode::FastestFirst => {
                self.run_fastest_first(session, question, roster, config, history)
                    .await
            }
        };

        self.emit(PanelEvent::RunCompleted);
        produced
    }

    async fn run_sequential(
        &self,
        session: &mut PanelSession,
        question: &str,
        roster: &[Persona],
        config: &PanelRunConfig,
        mut history: Vec<ChatMessage>,
    ) -> Vec<TranscriptMessage> {
        self.emit(PanelEvent::PhaseStarted {
            name: "Panel responses".to_string(),
        });
        let mut produced = Vec::new();

        for persona in roster {
            self.emit(PanelEvent::SpeakerThinking {
                persona_id: persona.id.clone(),
            });

            let mut messages = Vec::with_capacity(history.len() + 2);
            messages.push(ChatMessage::system(format!(
                "{}{}",
                persona.system_prompt, SEQUENTIAL_INSTRUCTION
            )));
            messages.extend(history.iter().cloned());
            messages.push(ChatMessage::user(question));

            let outcome = self
                .chat
                .chat(config.model_for(&persona.id), messages)
                .await;
            let answer = sanitize_answer(outcome.text());
            produced.push(self.record(session, persona, &answer));

            // Later panelists see this answer with attribution
            history.push(ChatMessage::assistant(format!(
                "{}: {}",
                persona.name, answer
            )));
        }

        produced
    }

    async fn run_fastest_first(
        &self,
        session: &mut PanelSession,
        question: &str,
        roster: &[Persona],
        config: &PanelRunConfig,
        history: Vec<ChatMessage>,
    ) -> Vec<TranscriptMessage> {
        self.emit(PanelEvent::PhaseStarted {
            name: "Initial answers".to_string(),
        });
        let mut produced = Vec::new();

        // Phase one: identical context for everyone, all requests in flight
        // at once
        let mut calls = FuturesUnordered::new();
        for persona in roster {
            self.emit(PanelEvent::SpeakerThinking {
                persona_id: persona.id.clone(),
            });

            let mut messages = Vec::with_capacity(history.len() + 2);
            messages.push(ChatMessage::system(format!(
                "{}{}",
                persona.system_prompt, CONCURRENT_INSTRUCTION
            )));
            messages.extend(history.iter().cloned());
            messages.push(ChatMessage::user(question));

            let chat = Arc::clone(&self.chat);
            let model = config.model_for(&persona.id).to_string();
            let persona_id = persona.id.clone();
            calls.push(async move {
                let outcome = chat.chat(&model, messages).await;
                (persona_id, outcome)
            });
        }

        // Emit in arrival order; remember who said what for the addenda
        let mut first_answers: HashMap<String, String> = HashMap::new();
        while let Some((persona_id, outcome)) = calls.next().await {
            let answer = sanitize_answer(outcome.text());
            if let Some(persona) = roster.iter().find(|p| p.id == persona_id) {
                produced.push(self.record(session, persona, &answer));
            }
            first_answers.insert(persona_id, answer);
        }

        // Phase two: short addenda in roster order, each persona seeing only
        // the other panelists' first answers
        if roster.len() > 1 {
            self.emit(PanelEvent::PhaseStarted {
                name: "Addenda".to_string(),
            });
            for persona in roster {
                let others: Vec<String> = roster
                    .iter()
                    .filter(|other| other.id != persona.id)
                    .filter_map(|other| {
                        first_answers
                            .get(&other.id)
                            .map(|answer| format!("{}: {}", other.name, answer))
                    })
                    .collect();
                if others.is_empty() {
                    continue;
                }

                self.emit(PanelEvent::SpeakerThinking {
                    persona_id: persona.id.clone(),
                });

                let mut messages = Vec::with_capacity(history.len() + 3);
                messages.push(ChatMessage::system(format!(
                    "{}{}",
                    persona.system_prompt, ADDENDUM_INSTRUCTION
                )));
                messages.extend(history.iter().cloned());
                messages.push(ChatMessage::assistant(format!(
                    "Panel so far:\n{}",
                    others.join("\n")
                )));
                messages.push(ChatMessage::user(ADDENDUM_PROMPT));

                let outcome = self
                    .chat
                    .chat(config.model_for(&persona.id), messages)
                    .await;
                let addendum = sanitize_answer(outcome.text());
                produced.push(self.record(session, persona, &addendum));
            }
        }

        produced
    }

    /// Append an answer to the transcript, notify listeners, and queue its
    /// narration.
    fn record(
        &self,
        session: &mut PanelSession,
        persona: &Persona,
        answer: &str,
    ) -> TranscriptMessage {
        let message = session.push_assistant(persona.id.as_str(), answer);
        self.emit(PanelEvent::MessageReady {
            message: message.clone(),
        });
        // Narration is fire-and-forget here; the queue serializes it
        let _ = self.queue.enqueue(SpeechJob {
            text: answer.to_string(),
            persona_id: Some(persona.id.clone()),
        });
        message
    }

    fn emit(&self, event: PanelEvent) {
        let _ = self.events.send(event);
    }
}
