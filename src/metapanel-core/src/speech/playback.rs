//! Audio output on a dedicated thread.
//!
//! `rodio`'s `OutputStream` is not `Send`, so a single thread owns the
//! device for the lifetime of the process and plays requests it receives
//! over a channel. A missing device degrades to silent completion rather
//! than failing jobs.

use std::io::Cursor;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use rodio::buffer::SamplesBuffer;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use tokio::sync::{broadcast, oneshot};
use tracing::warn;

use crate::error::{PanelError, Result};
use crate::speech::AmplitudeFrame;

/// Amplitude frames emitted per second while audio plays.
const AMP_RATE_HZ: u32 = 20;
/// Gain applied to the raw RMS before clamping to `[0, 1]`.
const AMP_GAIN: f32 = 3.0;

struct PlayRequest {
    bytes: Vec<u8>,
    persona_id: Option<String>,
    amp: broadcast::Sender<AmplitudeFrame>,
    done: oneshot::Sender<Result<()>>,
}

/// Handle to the audio thread.
pub struct AudioOutput {
    requests: mpsc::Sender<PlayRequest>,
}

impl AudioOutput {
    pub fn new() -> Self {
        let (requests, rx) = mpsc::channel::<PlayRequest>();
        std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || run_audio_thread(rx))
            .ok();
        Self { requests }
    }

    /// Play encoded audio (WAV or MP3) and resolve once it has finished.
    /// Amplitude frames for `persona_id` are sent on `amp` throughout.
    pub async fn play(
        &self,
        bytes: Vec<u8>,
        persona_id: Option<String>,
        amp: broadcast::Sender<AmplitudeFrame>,
    ) -> Result<()> {
        let (done, done_rx) = oneshot::channel();
        let request = PlayRequest { bytes, persona_id, amp, done };
        if self.requests.send(request).is_err() {
            warn!("audio thread is gone, skipping playback");
            return Ok(());
        }
        match done_rx.await {
            Ok(result) => result,
            Err(_) => {
                warn!("audio thread dropped a playback request");
                Ok(())
            }
        }
    }
}

impl Default for AudioOutput {
    fn default() -> Self {
        Self::new()
    }
}

fn run_audio_thread(rx: mpsc::Receiver<PlayRequest>) {
    let output = match OutputStream::try_default() {
        Ok(output) => Some(output),
        Err(error) => {
            warn!(%error, "no audio output device, playback will be silent");
            None
        }
    };

    while let Ok(request) = rx.recv() {
        let result = match &output {
            Some((_stream, handle)) => play_request(handle, &request),
            None => Ok(()),
        };
        let _ = request.done.send(result);
    }
}

fn play_request(handle: &OutputStreamHandle, request: &PlayRequest) -> Result<()> {
    let decoder = Decoder::new(Cursor::new(request.bytes.clone()))
        .map_err(|e| PanelError::Playback(format!("failed to decode audio: {}", e)))?;
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.convert_samples().collect();
    if samples.is_empty() {
        return Ok(());
    }

    let sink = Sink::try_new(handle).map_err(|e| PanelError::Playback(e.to_string()))?;
    sink.append(SamplesBuffer::new(channels, sample_rate, samples.clone()));

    let started = Instant::now();
    let window_len = (sample_rate / AMP_RATE_HZ).max(1) as usize * channels as usize;
    while !sink.empty() {
        std::thread::sleep(Duration::from_millis(1000 / u64::from(AMP_RATE_HZ)));
        let cursor =
            (started.elapsed().as_secs_f32() * sample_rate as f32) as usize * channels as usize;
        let rms = window_rms(&samples, cursor, window_len);
        let _ = request.amp.send(AmplitudeFrame {
            persona_id: request.persona_id.clone(),
            amplitude: (rms * AMP_GAIN).clamp(0.0, 1.0),
        });
    }
    sink.sleep_until_end();
    Ok(())
}

/// RMS over `len` samples starting at `start`; zero past the end.
fn window_rms(samples: &[f32], start: usize, len: usize) -> f32 {
    let start = start.min(samples.len());
    let end = (start + len).min(samples.len());
    let window = &samples[start..end];
    if window.is_empty() {
        return 0.0;
    }
    let mean_sq = window.iter().map(|s| s * s).sum::<f32>() / window.len() as f32;
    mean_sq.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_rms_of_constant_signal() {
        let samples = vec![0.5_f32; 100];
        let rms = window_rms(&samples, 0, 50);
        assert!((rms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_window_rms_of_silence_is_zero() {
        let samples = vec![0.0_f32; 100];
        assert_eq!(window_rms(&samples, 0, 50), 0.0);
    }

    #[test]
    fn test_window_rms_past_end_is_zero() {
        let samples = vec![0.5_f32; 10];
        assert_eq!(window_rms(&samples, 100, 50), 0.0);
    }

    #[test]
    fn test_window_rms_clips_partial_window_at_end() {
        let samples = vec![1.0_f32; 10];
        let rms = window_rms(&samples, 8, 50);
        assert!((rms - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_play_resolves_with_or_without_device() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 24_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..240 {
            writer.write_sample(0.0_f32).unwrap();
        }
        writer.finalize().unwrap();

        let (amp, _keep) = broadcast::channel(16);
        let output = AudioOutput::new();
        let result = output.play(cursor.into_inner(), Some("p1".into()), amp).await;
        assert!(result.is_ok());
    }
}
