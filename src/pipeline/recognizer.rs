//! Bounded listen-and-transcribe attempts.
//!
//! Every call to [`SpeechCaptureEngine::capture`] opens its own input
//! stream and decoder session, listens until a final transcript, a timeout
//! or playback activity, and releases the stream on every exit path.
//!
//! Two time limits apply. Before any partial hypothesis has been heard the
//! attempt ends after the adaptive listen timeout. Once speech has started,
//! the attempt is allowed to run to `max(timeout, long_speech_threshold)`,
//! at which point the decoder is flushed and whatever it has is returned.

use crate::audio::device::{AudioDevice, StreamGuard};
use crate::audio::level::apply_noise_gate;
use crate::bounded::{BoundedValue, Clamp, TimeoutPolicy, log_correction};
use crate::config::VoiceConfig;
use crate::echo_guard::PlaybackObserver;
use crate::pipeline::messages::{CaptureReport, RecognizerStatus, StopReason};
use crate::stt::{DecoderFactory, StreamingDecoder};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Clamped settings that may change between attempts.
#[derive(Debug)]
struct Settings {
    timeout: TimeoutPolicy,
    short_wait: BoundedValue<f64>,
    long_wait: BoundedValue<f64>,
    long_speech_threshold: BoundedValue<f64>,
    volume_threshold: BoundedValue<u16>,
    last_text: String,
}

/// Captures one utterance at a time from an input device.
pub struct SpeechCaptureEngine {
    device: Arc<dyn AudioDevice>,
    decoder: Arc<dyn DecoderFactory>,
    playback: PlaybackObserver,
    sample_rate: u32,
    channels: u16,
    frame_size: usize,
    noise_gate: bool,
    max_read_errors: u32,
    settings: Mutex<Settings>,
}

/// Running totals for one attempt.
struct Attempt {
    started: Instant,
    frames: u64,
    in_speech: bool,
}

impl Attempt {
    fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn finish(&self, stop_reason: StopReason, text: &str) -> CaptureReport {
        CaptureReport {
            text: text.trim().to_owned(),
            stop_reason,
            frames: self.frames,
            elapsed: self.started.elapsed(),
            heard_speech: self.in_speech,
        }
    }
}

impl SpeechCaptureEngine {
    /// Build an engine from configuration.
    ///
    /// `playback` is the read side of the playback flag. The engine never
    /// writes it.
    pub fn new(
        config: &VoiceConfig,
        device: Arc<dyn AudioDevice>,
        decoder: Arc<dyn DecoderFactory>,
        playback: PlaybackObserver,
    ) -> Self {
        let rec = &config.recognition;
        let settings = Settings {
            timeout: TimeoutPolicy::new(
                "timeout",
                rec.timeout.initial,
                rec.timeout.min,
                rec.timeout.max,
            ),
            short_wait: BoundedValue::new(
                "post_speech_short_wait",
                rec.post_speech_short_wait.value,
                rec.post_speech_short_wait.min,
                rec.post_speech_short_wait.max,
            ),
            long_wait: BoundedValue::new(
                "post_speech_long_wait",
                rec.post_speech_long_wait.value,
                rec.post_speech_long_wait.min,
                rec.post_speech_long_wait.max,
            ),
            long_speech_threshold: BoundedValue::new(
                "long_speech_threshold",
                rec.long_speech_threshold.value,
                rec.long_speech_threshold.min,
                rec.long_speech_threshold.max,
            ),
            volume_threshold: BoundedValue::new(
                "volume_threshold",
                rec.volume_threshold.base,
                rec.volume_threshold.min,
                rec.volume_threshold.max,
            ),
            last_text: String::new(),
        };

        info!(
            device = %device.name(),
            decoder = decoder.name(),
            sample_rate = config.audio.sample_rate,
            frame_size = config.audio.frame_size,
            timeout = settings.timeout.get(),
            "speech capture engine ready"
        );

        Self {
            device,
            decoder,
            playback,
            sample_rate: config.audio.sample_rate,
            channels: config.audio.channels,
            frame_size: config.audio.frame_size,
            noise_gate: rec.noise_gate,
            max_read_errors: rec.max_consecutive_read_errors.max(1),
            settings: Mutex::new(settings),
        }
    }

    /// Listen for one utterance and return its transcript.
    ///
    /// `timeout` overrides the adaptive timeout for this attempt only and is
    /// clamped into the same bounds. Returns an empty string on timeout,
    /// while playback is active, or when the device or decoder fails.
    pub fn capture(&self, timeout: Option<f64>) -> String {
        self.capture_report(timeout).text
    }

    /// Like [`capture`](Self::capture), reporting why the attempt ended.
    pub fn capture_report(&self, timeout: Option<f64>) -> CaptureReport {
        self.capture_with_cancel(timeout, &CancellationToken::new())
    }

    /// Like [`capture_report`](Self::capture_report), also ending the
    /// attempt at the next frame once `cancel` fires.
    pub fn capture_with_cancel(
        &self,
        timeout: Option<f64>,
        cancel: &CancellationToken,
    ) -> CaptureReport {
        let report = self.run_attempt(timeout, cancel);
        match report.stop_reason {
            StopReason::Transcript | StopReason::SpeechCap if report.has_text() => {
                info!(
                    reason = %report.stop_reason,
                    frames = report.frames,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    text = %report.text,
                    "recognized"
                );
            }
            _ => {
                debug!(
                    reason = %report.stop_reason,
                    frames = report.frames,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    heard_speech = report.heard_speech,
                    "capture ended without text"
                );
            }
        }
        report
    }

    fn run_attempt(&self, timeout: Option<f64>, cancel: &CancellationToken) -> CaptureReport {
        let (timeout_secs, cap_secs, volume) = {
            let settings = self.lock_settings();
            let timeout_secs = match timeout {
                Some(requested) => {
                    let (stored, outcome) = settings.timeout.clamp(requested);
                    log_correction("capture timeout", requested, stored, outcome);
                    stored
                }
                None => settings.timeout.get(),
            };
            let cap_secs = timeout_secs.max(settings.long_speech_threshold.get());
            (timeout_secs, cap_secs, settings.volume_threshold.get())
        };

        if self.playback.is_tts_playing() {
            debug!("playback active, not opening input stream");
            return CaptureReport::empty(StopReason::PlaybackActive);
        }
        if cancel.is_cancelled() {
            return CaptureReport::empty(StopReason::Cancelled);
        }

        let report = self.open_and_listen(timeout_secs, cap_secs, volume, cancel);
        self.lock_settings().last_text.clone_from(&report.text);
        report
    }

    fn open_and_listen(
        &self,
        timeout_secs: f64,
        cap_secs: f64,
        volume: u16,
        cancel: &CancellationToken,
    ) -> CaptureReport {
        let mut decoder = match self.decoder.new_session(self.sample_rate) {
            Ok(decoder) => decoder,
            Err(e) => {
                error!("cannot start decoder session: {e}");
                return CaptureReport::empty(StopReason::DecoderError);
            }
        };

        let mut stream = match self
            .device
            .open_input_stream(self.sample_rate, self.channels, self.frame_size)
        {
            Ok(stream) => StreamGuard::new(stream),
            Err(e) => {
                error!("cannot open input stream: {e}");
                return CaptureReport::empty(StopReason::DeviceError);
            }
        };

        debug!(timeout_secs, cap_secs, "listening");
        self.listen(
            &mut stream,
            decoder.as_mut(),
            timeout_secs,
            cap_secs,
            volume,
            cancel,
        )
    }

    fn listen(
        &self,
        stream: &mut StreamGuard,
        decoder: &mut dyn StreamingDecoder,
        timeout_secs: f64,
        cap_secs: f64,
        volume: u16,
        cancel: &CancellationToken,
    ) -> CaptureReport {
        let mut attempt = Attempt {
            started: Instant::now(),
            frames: 0,
            in_speech: false,
        };
        let mut read_errors = 0_u32;

        loop {
            if cancel.is_cancelled() {
                return attempt.finish(StopReason::Cancelled, "");
            }
            if self.playback.is_tts_playing() {
                info!("playback started, abandoning capture");
                return attempt.finish(StopReason::PlaybackActive, "");
            }

            match stream.read(self.frame_size) {
                Ok(mut frame) => {
                    read_errors = 0;
                    if self.noise_gate {
                        apply_noise_gate(&mut frame, volume);
                    }
                    attempt.frames += 1;

                    match decoder.accept(&frame) {
                        Ok(true) => match decoder.final_result() {
                            Ok(result) if !result.transcript().is_empty() => {
                                return attempt.finish(StopReason::Transcript, result.transcript());
                            }
                            Ok(_) => {}
                            Err(e) => {
                                error!("decoder result failed: {e}");
                                return attempt.finish(StopReason::DecoderError, "");
                            }
                        },
                        Ok(false) => match decoder.partial_result() {
                            Ok(partial) if partial.has_speech() => {
                                if !attempt.in_speech {
                                    debug!(partial = %partial.partial, "speech started");
                                }
                                attempt.in_speech = true;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                error!("decoder partial failed: {e}");
                                return attempt.finish(StopReason::DecoderError, "");
                            }
                        },
                        Err(e) => {
                            error!("decoder rejected frame: {e}");
                            return attempt.finish(StopReason::DecoderError, "");
                        }
                    }
                }
                Err(e) => {
                    read_errors += 1;
                    warn!(read_errors, "dropped frame: {e}");
                    if read_errors >= self.max_read_errors {
                        error!(read_errors, "input stream keeps failing, giving up");
                        return attempt.finish(StopReason::DeviceError, "");
                    }
                }
            }

            let elapsed = attempt.elapsed_secs();
            if !attempt.in_speech && elapsed >= timeout_secs {
                return attempt.finish(StopReason::SilenceTimeout, "");
            }
            if attempt.in_speech && elapsed >= cap_secs {
                warn!(cap_secs, "utterance not finalized in time, flushing decoder");
                return match decoder.flush() {
                    Ok(result) => attempt.finish(StopReason::SpeechCap, result.transcript()),
                    Err(e) => {
                        error!("decoder flush failed: {e}");
                        attempt.finish(StopReason::SpeechCap, "")
                    }
                };
            }
        }
    }

    /// Probe whether an input stream can be opened right now.
    pub fn is_available(&self) -> bool {
        self.device
            .is_available(self.sample_rate, self.channels, self.frame_size)
    }

    /// Adaptive listen timeout, in seconds.
    pub fn current_timeout(&self) -> f64 {
        self.lock_settings().timeout.get()
    }

    /// Set the adaptive listen timeout, clamped into its bounds.
    pub fn set_current_timeout(&self, secs: f64) -> Clamp {
        self.lock_settings().timeout.set(secs)
    }

    /// `(min, max)` of the listen timeout.
    pub fn timeout_bounds(&self) -> (f64, f64) {
        let settings = self.lock_settings();
        (settings.timeout.min(), settings.timeout.max())
    }

    /// Listen timeout used after a reply that closes the exchange.
    pub fn post_speech_short_wait(&self) -> f64 {
        self.lock_settings().short_wait.get()
    }

    pub fn set_post_speech_short_wait(&self, secs: f64) -> Clamp {
        self.lock_settings().short_wait.set(secs)
    }

    /// Listen timeout used after a reply that expects a follow-up.
    pub fn post_speech_long_wait(&self) -> f64 {
        self.lock_settings().long_wait.get()
    }

    pub fn set_post_speech_long_wait(&self, secs: f64) -> Clamp {
        self.lock_settings().long_wait.set(secs)
    }

    /// Hard cap on an attempt once speech has started, in seconds.
    pub fn long_speech_threshold(&self) -> f64 {
        self.lock_settings().long_speech_threshold.get()
    }

    pub fn set_long_speech_threshold(&self, secs: f64) -> Clamp {
        self.lock_settings().long_speech_threshold.set(secs)
    }

    /// Noise-gate threshold (peak amplitude).
    pub fn volume_threshold(&self) -> u16 {
        self.lock_settings().volume_threshold.get()
    }

    pub fn set_volume_threshold(&self, level: u16) -> Clamp {
        self.lock_settings().volume_threshold.set(level)
    }

    /// Transcript of the most recent attempt.
    ///
    /// Empty after a silent or failed attempt. Attempts refused because
    /// playback was active or the token had fired leave it unchanged.
    pub fn last_text(&self) -> String {
        self.lock_settings().last_text.clone()
    }

    /// Diagnostic snapshot.
    pub fn status(&self) -> RecognizerStatus {
        let settings = self.lock_settings();
        RecognizerStatus {
            is_tts_playing: self.playback.is_tts_playing(),
            current_timeout: settings.timeout.get(),
            last_text: settings.last_text.clone(),
            volume_threshold: settings.volume_threshold.get(),
        }
    }

    fn lock_settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
