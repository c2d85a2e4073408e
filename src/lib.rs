//! turntalk: a half-duplex voice interaction loop.
//!
//! Listens to the microphone, decodes speech to text, hands the text to a
//! command handler and speaks the reply, without ever listening to its own
//! voice.
//!
//! # Architecture
//!
//! Two long-lived contexts run side by side:
//! - **Capture**: [`SpeechCaptureEngine`] runs one bounded listen attempt at
//!   a time on the caller's thread, via an [`audio::AudioDevice`] and a
//!   fresh [`stt::StreamingDecoder`] session per attempt
//! - **Playback**: [`PlaybackQueue`] renders replies on a single worker
//!   thread through a [`tts::Synthesizer`]
//!
//! They share exactly one piece of state, the [`EchoGuard`] flag. Playback
//! writes it; capture only reads it and refuses to listen while it is set.
//! [`InteractionLoop`] alternates the two and adapts the listen timeout.

pub mod app_dirs;
pub mod audio;
pub mod bounded;
pub mod config;
pub mod echo_guard;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod stt;
pub mod tts;

pub use bounded::{BoundedValue, Clamp, TimeoutPolicy};
pub use config::VoiceConfig;
pub use echo_guard::{EchoGuard, PlaybackObserver};
pub use error::{Result, VoiceError};
pub use pipeline::{
    CaptureReport, CommandHandler, EchoHandler, InteractionLoop, Reply, SpeechCaptureEngine,
    StopReason, TurnOutcome,
};
pub use tts::{PlaybackQueue, SpeakOutcome};
