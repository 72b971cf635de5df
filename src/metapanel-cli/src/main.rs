//! Metapanel CLI - Ask a panel of AI personas
//!
//! Runs a panel of personas over an Ollama-compatible chat endpoint and
//! reads every answer aloud, one panelist at a time.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use metapanel_core::{
    AmplitudeFrame, Config, OllamaClient, PanelEvent, PanelMode, PanelOrchestrator,
    PanelRunConfig, PanelSession, Persona, PlaybackQueue, SpeechProvider, Synthesizer,
    TranscriptMessage,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Sequential,
    FastestFirst,
}

impl From<ModeArg> for PanelMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Sequential => PanelMode::Sequential,
            ModeArg::FastestFirst => PanelMode::FastestFirst,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ProviderArg {
    Offline,
    Azure,
    Elevenlabs,
}

impl From<ProviderArg> for SpeechProvider {
    fn from(provider: ProviderArg) -> Self {
        match provider {
            ProviderArg::Offline => SpeechProvider::Offline,
            ProviderArg::Azure => SpeechProvider::Azure,
            ProviderArg::Elevenlabs => SpeechProvider::ElevenLabs,
        }
    }
}

#[derive(Parser)]
#[command(
    name = "metapanel",
    version,
    about = "Ask a panel of AI personas and hear their answers",
    long_about = "Puts questions to a panel of AI personas over an Ollama-compatible chat \
                  endpoint. Answers are read aloud one panelist at a time; cloud speech \
                  providers fall back to the bundled offline voice when not configured."
)]
struct Cli {
    /// Question for the panel; omit to enter interactive mode
    #[arg(value_name = "QUESTION")]
    question: Option<String>,

    /// Path to the configuration file (created on first run)
    #[arg(short, long, default_value = "metapanel.toml", value_name = "FILE")]
    config: PathBuf,

    /// Response order for the panel
    #[arg(long, value_enum, value_name = "MODE")]
    mode: Option<ModeArg>,

    /// Default chat model
    #[arg(short, long, value_name = "MODEL")]
    model: Option<String>,

    /// Chat endpoint base URL
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Transcript entries sent as context (0 disables history)
    #[arg(long, value_name = "N")]
    context_window: Option<usize>,

    /// Speech provider
    #[arg(long, value_enum, value_name = "PROVIDER")]
    provider: Option<ProviderArg>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config_existed = cli.config.exists();
    let mut config = Config::load(&cli.config)?;
    if !config_existed {
        config.save(&cli.config)?;
        info!(path = %cli.config.display(), "wrote default configuration");
    }

    // Command-line overrides win over the file
    if let Some(mode) = cli.mode {
        config.chat.mode = mode.into();
    }
    if let Some(model) = &cli.model {
        config.chat.default_model = model.clone();
    }
    if let Some(base_url) = &cli.base_url {
        config.chat.base_url = base_url.clone();
    }
    if let Some(window) = cli.context_window {
        config.chat.context_window = window;
    }
    if let Some(provider) = cli.provider {
        config.speech.provider = provider.into();
    }

    let roster = config.roster();
    let run_config = config.run_config();

    let chat = Arc::new(OllamaClient::new(config.chat.base_url.clone())?);
    let synthesizer = Arc::new(Synthesizer::new()?);
    let queue = Arc::new(PlaybackQueue::new(
        synthesizer,
        config.speech_settings(&roster),
    ));
    let (orchestrator, events) = PanelOrchestrator::new(chat, Arc::clone(&queue));

    print_header(&roster, &config);

    // Printing runs on its own task so answers appear as they land; the
    // run_done channel keeps the prompt from racing the last answer
    let (run_done_tx, mut run_done) = mpsc::unbounded_channel::<()>();
    let events_task = tokio::spawn(print_events(events, roster.clone(), run_done_tx));
    tokio::spawn(print_speaking(queue.subscribe(), roster.clone()));

    let mut session = PanelSession::new();
    match &cli.question {
        Some(question) => {
            println!("{} {}", "You:".bold(), question.bright_white());
            orchestrator
                .run_panel(&mut session, question, &roster, &run_config)
                .await;
            let _ = run_done.recv().await;
        }
        None => {
            interactive_loop(
                &orchestrator,
                &mut session,
                &roster,
                &run_config,
                &mut run_done,
            )
            .await?;
        }
    }

    // Let queued narration finish before the process exits
    queue.flush().await;
    drop(orchestrator);
    let _ = events_task.await;

    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!("{}", "  Panel adjourned.".bright_green().bold());
    println!("{}", "═".repeat(70).bright_blue());
    println!();

    Ok(())
}

async fn interactive_loop(
    orchestrator: &PanelOrchestrator,
    session: &mut PanelSession,
    roster: &[Persona],
    run_config: &PanelRunConfig,
    run_done: &mut mpsc::UnboundedReceiver<()>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "Type a question, or \"exit\" to leave.".dimmed());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n{} ", ">".bright_blue().bold());
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }
        orchestrator
            .run_panel(session, question, roster, run_config)
            .await;
        let _ = run_done.recv().await;
    }
    Ok(())
}

/// Print the banner and the seated panel.
fn print_header(roster: &[Persona], config: &Config) {
    println!();
    println!("{}", "═".repeat(70).bright_blue());
    println!(
        "{}",
        format!("  {} - ask the panel anything", "Metapanel".bold()).bright_blue()
    );
    println!("{}", "═".repeat(70).bright_blue());
    println!();
    println!("{}", "Panelists:".bold());
    for persona in roster {
        let (r, g, b) = hex_to_rgb(&persona.color);
        let model = config
            .chat
            .persona_models
            .get(&persona.id)
            .filter(|m| !m.is_empty())
            .unwrap_or(&config.chat.default_model);
        println!(
            "  {} {} - {} {}",
            "•".truecolor(r, g, b),
            persona.name.truecolor(r, g, b).bold(),
            persona.short_bio,
            format!("[{}]", model).dimmed()
        );
    }
    println!();
    println!("{}", "─".repeat(70).dimmed());
}

/// Print panel events as they arrive. Sends on `run_done` after each run so
/// the caller can sequence its prompt.
async fn print_events(
    mut events: mpsc::UnboundedReceiver<PanelEvent>,
    roster: Vec<Persona>,
    run_done: mpsc::UnboundedSender<()>,
) {
    while let Some(event) = events.recv().await {
        match event {
            PanelEvent::PhaseStarted { name } => {
                println!();
                println!("{}", "─".repeat(70).bright_magenta());
                println!("{}", format!("  {}", name).bright_magenta().bold());
                println!("{}", "─".repeat(70).bright_magenta());
            }
            PanelEvent::SpeakerThinking { persona_id } => {
                if let Some(persona) = roster.iter().find(|p| p.id == persona_id) {
                    eprintln!("{}", format!("… {} is thinking", persona.name).dimmed());
                }
            }
            PanelEvent::MessageReady { message } => {
                print_message(&message, &roster);
            }
            PanelEvent::RunCompleted => {
                let _ = run_done.send(());
            }
        }
    }
}

fn print_message(message: &TranscriptMessage, roster: &[Persona]) {
    let persona = message
        .persona_id
        .as_deref()
        .and_then(|id| roster.iter().find(|p| p.id == id));
    let (name, color) = match persona {
        Some(p) => (p.name.as_str(), p.color.as_str()),
        None => ("Assistant", "#3B82F6"),
    };
    let (r, g, b) = hex_to_rgb(color);
    println!();
    println!("{} {}", "▶".truecolor(r, g, b), name.truecolor(r, g, b).bold());
    for line in textwrap(&message.text, 66).lines() {
        println!("  {}", line);
    }
}

/// Announce on stderr whenever narration moves to a new persona.
async fn print_speaking(mut amp: broadcast::Receiver<AmplitudeFrame>, roster: Vec<Persona>) {
    let mut current: Option<String> = None;
    loop {
        match amp.recv().await {
            Ok(frame) => {
                if frame.amplitude > 0.0 {
                    if current != frame.persona_id {
                        current = frame.persona_id.clone();
                        if let Some(persona) = frame
                            .persona_id
                            .as_deref()
                            .and_then(|id| roster.iter().find(|p| p.id == id))
                        {
                            let (r, g, b) = hex_to_rgb(&persona.color);
                            eprintln!(
                                "{} {}",
                                "♪".truecolor(r, g, b),
                                format!("{} is speaking", persona.name).dimmed()
                            );
                        }
                    }
                } else {
                    current = None;
                }
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Parse "#RRGGBB" into components; anything else gets the default blue.
fn hex_to_rgb(hex: &str) -> (u8, u8, u8) {
    let hex = hex.trim_start_matches('#');
    if hex.len() == 6 && hex.is_ascii() {
        if let (Ok(r), Ok(g), Ok(b)) = (
            u8::from_str_radix(&hex[0..2], 16),
            u8::from_str_radix(&hex[2..4], 16),
            u8::from_str_radix(&hex[4..6], 16),
        ) {
            return (r, g, b);
        }
    }
    (59, 130, 246)
}

/// Simple text wrapping function.
fn textwrap(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut current_line_len = 0;

    for word in text.split_whitespace() {
        if current_line_len + word.len() + 1 > width && current_line_len > 0 {
            result.push('\n');
            current_line_len = 0;
        }
        if current_line_len > 0 {
            result.push(' ');
            current_line_len += 1;
        }
        result.push_str(word);
        current_line_len += word.len();
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_rgb_parses_full_hex() {
        assert_eq!(hex_to_rgb("#7C3AED"), (0x7C, 0x3A, 0xED));
        assert_eq!(hex_to_rgb("059669"), (0x05, 0x96, 0x69));
    }

    #[test]
    fn test_hex_to_rgb_defaults_on_garbage() {
        assert_eq!(hex_to_rgb("not-a-color"), (59, 130, 246));
        assert_eq!(hex_to_rgb("#fff"), (59, 130, 246));
    }

    #[test]
    fn test_textwrap_keeps_lines_under_width() {
        let wrapped = textwrap("one two three four five six seven eight nine ten", 15);
        for line in wrapped.lines() {
            assert!(line.len() <= 15);
        }
    }

    #[test]
    fn test_textwrap_short_text_is_untouched() {
        assert_eq!(textwrap("short text", 66), "short text");
    }
}
