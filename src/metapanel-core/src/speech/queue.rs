//! The serialized playback queue.
//!
//! Answers arrive faster than they can be spoken, so jobs are drained by a
//! single worker strictly in enqueue order: at most one utterance plays at
//! a time, and a failed job never blocks the ones behind it.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

use crate::speech::{
    AmplitudeFrame, ResolvedProvider, ResolvedSpeechJob, SpeechBackend, SpeechJob, SpeechProvider,
    SpeechSettings,
};

/// Non-zero level emitted when a job starts, before live samples arrive.
pub const SPEAKING_BASELINE: f32 = 0.2;

/// Amplitude channel capacity; slow subscribers lag and miss frames rather
/// than blocking playback.
const AMP_CHANNEL_CAPACITY: usize = 64;

enum WorkerCommand {
    Play(QueuedJob),
    Flush(oneshot::Sender<()>),
}

struct QueuedJob {
    resolved: ResolvedSpeechJob,
    done: oneshot::Sender<()>,
}

/// Resolves once the corresponding job has finished playing, including jobs
/// that failed and were suppressed. Dropping the handle does not cancel the
/// job.
pub struct PlaybackHandle {
    done: oneshot::Receiver<()>,
}

impl Future for PlaybackHandle {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // A dropped worker also counts as completion
        match Pin::new(&mut self.get_mut().done).poll(cx) {
            Poll::Ready(_) => Poll::Ready(()),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Owns the playback chain: jobs go in, audio comes out one at a time.
pub struct PlaybackQueue {
    commands: mpsc::UnboundedSender<WorkerCommand>,
    settings: RwLock<SpeechSettings>,
    amp: broadcast::Sender<AmplitudeFrame>,
}

impl PlaybackQueue {
    /// Start the queue worker over the given backend.
    pub fn new(backend: Arc<dyn SpeechBackend>, settings: SpeechSettings) -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let (amp, _) = broadcast::channel(AMP_CHANNEL_CAPACITY);
        tokio::spawn(run_worker(rx, backend, amp.clone()));
        Self {
            commands,
            settings: RwLock::new(settings),
            amp,
        }
    }

    /// Replace the speech settings. Applies from the next enqueued job;
    /// jobs already queued keep the settings they were resolved with.
    pub fn update_settings(&self, settings: SpeechSettings) {
        *self.settings.write() = settings;
    }

    /// Subscribe to amplitude frames for all jobs.
    pub fn subscribe(&self) -> broadcast::Receiver<AmplitudeFrame> {
        self.amp.subscribe()
    }

    /// Append a job to the chain. The voice and provider are resolved
    /// against a snapshot of the current settings before queueing.
    pub fn enqueue(&self, job: SpeechJob) -> PlaybackHandle {
        let snapshot = self.settings.read().clone();
        let resolved = resolve_job(job, &snapshot);
        debug!(voice = %resolved.voice, provider = ?resolved.provider, "queueing speech job");
        let (done, done_rx) = oneshot::channel();
        let queued = QueuedJob { resolved, done };
        if self.commands.send(WorkerCommand::Play(queued)).is_err() {
            warn!("playback worker is gone, dropping speech job");
        }
        PlaybackHandle { done: done_rx }
    }

    /// Resolves when every job enqueued before this call has finished.
    pub async fn flush(&self) {
        let (ack, ack_rx) = oneshot::channel();
        if self.commands.send(WorkerCommand::Flush(ack)).is_err() {
            return;
        }
        let _ = ack_rx.await;
    }
}

/// Resolve the effective voice and route the provider, downgrading to the
/// offline engine when the cloud configuration is incomplete.
fn resolve_job(job: SpeechJob, settings: &SpeechSettings) -> ResolvedSpeechJob {
    let voice = job
        .persona_id
        .as_deref()
        .and_then(|id| settings.persona_voices.get(id))
        .filter(|v| !v.is_empty())
        .cloned()
        .unwrap_or_else(|| settings.default_voice.clone());

    let provider = match settings.provider {
        SpeechProvider::Offline => ResolvedProvider::Offline,
        SpeechProvider::Azure => match (&settings.azure_region, &settings.azure_key) {
            (Some(region), Some(key))
                if !region.is_empty() && !key.is_empty() && !voice.is_empty() =>
            {
                ResolvedProvider::Azure {
                    region: region.clone(),
                    key: key.clone(),
                }
            }
            _ => {
                debug!("Azure speech not fully configured, using offline synthesis");
                ResolvedProvider::Offline
            }
        },
        SpeechProvider::ElevenLabs => match &settings.eleven_api_key {
            Some(api_key) if !api_key.is_empty() && !voice.is_empty() => {
                ResolvedProvider::ElevenLabs {
                    api_key: api_key.clone(),
                }
            }
            _ => {
                debug!("ElevenLabs speech not fully configured, using offline synthesis");
                ResolvedProvider::Offline
            }
        },
    };

    ResolvedSpeechJob {
        text: job.text,
        persona_id: job.persona_id,
        voice,
        provider,
    }
}

async fn run_worker(
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    backend: Arc<dyn SpeechBackend>,
    amp: broadcast::Sender<AmplitudeFrame>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Play(QueuedJob { resolved, done }) => {
                let _ = amp.send(AmplitudeFrame {
                    persona_id: resolved.persona_id.clone(),
                    amplitude: SPEAKING_BASELINE,
                });
                if let Err(error) = backend.speak(&resolved, amp.clone()).await {
                    warn!(%error, "speech job failed, continuing with the next one");
                }
                // Exactly one terminal zero per job, before its handle resolves
                let _ = amp.send(AmplitudeFrame {
                    persona_id: resolved.persona_id.clone(),
                    amplitude: 0.0,
                });
                let _ = done.send(());
            }
            WorkerCommand::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PanelError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    /// Backend fake that records jobs and their play intervals; the delay
    /// stands in for synthesis plus playback time.
    struct RecordingBackend {
        delay: Duration,
        fail_texts: Vec<String>,
        jobs: Mutex<Vec<ResolvedSpeechJob>>,
        spans: Mutex<Vec<(String, Instant, Instant)>>,
    }

    impl RecordingBackend {
        fn new(delay_ms: u64) -> Arc<Self> {
            Self::failing_on(delay_ms, &[])
        }

        fn failing_on(delay_ms: u64, texts: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                delay: Duration::from_millis(delay_ms),
                fail_texts: texts.iter().map(|t| t.to_string()).collect(),
                jobs: Mutex::new(Vec::new()),
                spans: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl SpeechBackend for RecordingBackend {
        async fn speak(
            &self,
            job: &ResolvedSpeechJob,
            amp: broadcast::Sender<AmplitudeFrame>,
        ) -> crate::error::Result<()> {
            let started = Instant::now();
            tokio::time::sleep(self.delay).await;
            // A live frame mid-playback, like the real audio path emits
            let _ = amp.send(AmplitudeFrame {
                persona_id: job.persona_id.clone(),
                amplitude: 0.5,
            });
            self.jobs.lock().push(job.clone());
            self.spans
                .lock()
                .push((job.text.clone(), started, Instant::now()));
            if self.fail_texts.contains(&job.text) {
                return Err(PanelError::Speech("synthesis exploded".to_string()));
            }
            Ok(())
        }
    }

    fn job(text: &str, persona: &str) -> SpeechJob {
        SpeechJob {
            text: text.to_string(),
            persona_id: Some(persona.to_string()),
        }
    }

    #[tokio::test]
    async fn test_jobs_play_in_enqueue_order_one_at_a_time() {
        let backend = RecordingBackend::new(20);
        let queue = PlaybackQueue::new(backend.clone(), SpeechSettings::default());
        let _ = queue.enqueue(job("one", "p1"));
        let _ = queue.enqueue(job("two", "p2"));
        let _ = queue.enqueue(job("three", "p1"));
        queue.flush().await;

        let spans = backend.spans.lock();
        let order: Vec<&str> = spans.iter().map(|(text, _, _)| text.as_str()).collect();
        assert_eq!(order, ["one", "two", "three"]);
        for pair in spans.windows(2) {
            assert!(
                pair[1].1 >= pair[0].2,
                "a job started before the previous one finished"
            );
        }
    }

    #[tokio::test]
    async fn test_baseline_then_terminal_zero_before_handle_resolves() {
        let backend = RecordingBackend::new(10);
        let queue = PlaybackQueue::new(backend, SpeechSettings::default());
        let mut amp = queue.subscribe();
        queue.enqueue(job("hello", "p1")).await;

        // Everything for the job is already buffered once the handle resolved
        let mut frames = Vec::new();
        while let Ok(frame) = amp.try_recv() {
            frames.push(frame);
        }
        assert!(frames.len() >= 2);
        assert_eq!(frames[0].amplitude, SPEAKING_BASELINE);
        assert_eq!(frames[0].persona_id.as_deref(), Some("p1"));
        let zeros: Vec<_> = frames.iter().filter(|f| f.amplitude == 0.0).collect();
        assert_eq!(zeros.len(), 1);
        assert_eq!(frames.last().map(|f| f.amplitude), Some(0.0));
    }

    #[tokio::test]
    async fn test_failed_job_does_not_stall_the_queue() {
        let backend = RecordingBackend::failing_on(5, &["bad"]);
        let queue = PlaybackQueue::new(backend.clone(), SpeechSettings::default());
        let mut amp = queue.subscribe();
        queue.enqueue(job("bad", "p1")).await;
        queue.enqueue(job("good", "p2")).await;

        assert_eq!(backend.jobs.lock().len(), 2);
        // One terminal zero per job, failure or not
        let mut zeros = 0;
        while let Ok(frame) = amp.try_recv() {
            if frame.amplitude == 0.0 {
                zeros += 1;
            }
        }
        assert_eq!(zeros, 2);
    }

    #[tokio::test]
    async fn test_voice_resolution_prefers_persona_override() {
        let settings = SpeechSettings {
            default_voice: "af_sky".to_string(),
            persona_voices: [("p1".to_string(), "bm_george".to_string())].into(),
            ..SpeechSettings::default()
        };
        let backend = RecordingBackend::new(1);
        let queue = PlaybackQueue::new(backend.clone(), settings);
        let _ = queue.enqueue(job("a", "p1"));
        let _ = queue.enqueue(job("b", "p2"));
        queue.flush().await;

        let jobs = backend.jobs.lock();
        assert_eq!(jobs[0].voice, "bm_george");
        assert_eq!(jobs[1].voice, "af_sky");
    }

    #[tokio::test]
    async fn test_unconfigured_azure_downgrades_to_offline() {
        let settings = SpeechSettings {
            provider: SpeechProvider::Azure,
            default_voice: "en-US-JennyNeural".to_string(),
            ..SpeechSettings::default()
        };
        let backend = RecordingBackend::new(1);
        let queue = PlaybackQueue::new(backend.clone(), settings);
        queue.enqueue(job("a", "p1")).await;
        assert_eq!(backend.jobs.lock()[0].provider, ResolvedProvider::Offline);
    }

    #[tokio::test]
    async fn test_configured_azure_passes_preflight() {
        let settings = SpeechSettings {
            provider: SpeechProvider::Azure,
            default_voice: "en-US-JennyNeural".to_string(),
            azure_region: Some("eastus".to_string()),
            azure_key: Some("secret".to_string()),
            ..SpeechSettings::default()
        };
        let backend = RecordingBackend::new(1);
        let queue = PlaybackQueue::new(backend.clone(), settings);
        queue.enqueue(job("a", "p1")).await;
        match &backend.jobs.lock()[0].provider {
            ResolvedProvider::Azure { region, .. } => assert_eq!(region, "eastus"),
            other => panic!("expected Azure routing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_elevenlabs_without_key_downgrades_to_offline() {
        let settings = SpeechSettings {
            provider: SpeechProvider::ElevenLabs,
            default_voice: "some-voice-id".to_string(),
            ..SpeechSettings::default()
        };
        let backend = RecordingBackend::new(1);
        let queue = PlaybackQueue::new(backend.clone(), settings);
        queue.enqueue(job("a", "p1")).await;
        assert_eq!(backend.jobs.lock()[0].provider, ResolvedProvider::Offline);
    }

    #[tokio::test]
    async fn test_settings_change_applies_from_next_enqueue() {
        let backend = RecordingBackend::new(1);
        let queue = PlaybackQueue::new(backend.clone(), SpeechSettings::default());
        queue.enqueue(job("first", "p1")).await;

        queue.update_settings(SpeechSettings {
            provider: SpeechProvider::ElevenLabs,
            default_voice: "voice-id".to_string(),
            eleven_api_key: Some("sk-test".to_string()),
            ..SpeechSettings::default()
        });
        queue.enqueue(job("second", "p1")).await;

        let jobs = backend.jobs.lock();
        assert_eq!(jobs[0].provider, ResolvedProvider::Offline);
        assert_eq!(
            jobs[1].provider,
            ResolvedProvider::ElevenLabs {
                api_key: "sk-test".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_flush_waits_for_all_prior_jobs() {
        let backend = RecordingBackend::new(15);
        let queue = PlaybackQueue::new(backend.clone(), SpeechSettings::default());
        let _ = queue.enqueue(job("a", "p1"));
        let _ = queue.enqueue(job("b", "p2"));
        queue.flush().await;
        assert_eq!(backend.jobs.lock().len(), 2);
    }
}
