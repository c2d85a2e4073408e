//! Half-duplex voice turn-taking.
//!
//! [`SpeechCaptureEngine`] listens while [`PlaybackQueue`](crate::tts::PlaybackQueue)
//! is idle; [`InteractionLoop`] alternates the two and adapts the listen
//! timeout after each reply.

pub mod interaction;
pub mod messages;
pub mod recognizer;

pub use interaction::{CommandHandler, EchoHandler, InteractionLoop};
pub use messages::{CaptureReport, RecognizerStatus, Reply, StopReason, TurnOutcome};
pub use recognizer::SpeechCaptureEngine;
