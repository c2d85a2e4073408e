//! Values passed between the capture engine, the interaction loop and callers.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Why a capture attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The decoder finalized a non-empty transcript.
    Transcript,
    /// No speech was heard before the listen timeout.
    SilenceTimeout,
    /// Speech started but was not finalized before the hard cap.
    SpeechCap,
    /// Playback was active, before opening the stream or mid-attempt.
    PlaybackActive,
    /// The caller's cancellation token fired.
    Cancelled,
    /// The stream could not be opened or stopped delivering audio.
    DeviceError,
    /// The decoder could not be created or failed on a frame.
    DecoderError,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transcript => "transcript",
            Self::SilenceTimeout => "silence timeout",
            Self::SpeechCap => "speech cap",
            Self::PlaybackActive => "playback active",
            Self::Cancelled => "cancelled",
            Self::DeviceError => "device error",
            Self::DecoderError => "decoder error",
        };
        f.write_str(s)
    }
}

/// Outcome of one capture attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureReport {
    /// Final transcript, trimmed. Empty when nothing was recognized.
    pub text: String,
    pub stop_reason: StopReason,
    /// Frames fed to the decoder.
    pub frames: u64,
    /// Wall-clock duration of the attempt.
    pub elapsed: Duration,
    /// Whether a non-empty partial hypothesis was seen.
    pub heard_speech: bool,
}

impl CaptureReport {
    pub(crate) fn empty(stop_reason: StopReason) -> Self {
        Self {
            text: String::new(),
            stop_reason,
            frames: 0,
            elapsed: Duration::ZERO,
            heard_speech: false,
        }
    }

    /// Whether the attempt produced text.
    pub fn has_text(&self) -> bool {
        !self.text.is_empty()
    }
}

/// A handler's answer to one transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Text to speak. May be empty.
    pub message: String,
    /// Whether the command succeeded.
    pub success: bool,
    /// Whether the user is expected to answer, so the next turn listens longer.
    pub expect_follow_up: bool,
    /// End the loop after speaking this reply.
    pub should_exit: bool,
}

impl Reply {
    /// A successful reply that closes the exchange.
    pub fn say(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            success: true,
            ..Self::default()
        }
    }

    /// A successful reply that expects an answer.
    pub fn ask(message: impl Into<String>) -> Self {
        Self {
            expect_follow_up: true,
            ..Self::say(message)
        }
    }

    /// A failed command.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Speak `message` then end the loop.
    pub fn exit(message: impl Into<String>) -> Self {
        Self {
            should_exit: true,
            ..Self::say(message)
        }
    }
}

/// Whether the interaction loop should keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Continue,
    Exit,
}

/// Diagnostic snapshot of the capture engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognizerStatus {
    pub is_tts_playing: bool,
    /// Adaptive listen timeout, in seconds.
    pub current_timeout: f64,
    pub last_text: String,
    pub volume_threshold: u16,
}
