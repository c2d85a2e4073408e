//! Speech output.
//!
//! A [`Synthesizer`] renders text as audible speech and blocks for the
//! whole playback duration. [`PlaybackQueue`] serializes all output onto a
//! single worker thread and owns the [`EchoGuard`](crate::EchoGuard) flag.

pub mod command;
pub mod queue;

pub use command::CommandSynthesizer;
pub use queue::{PlaybackQueue, SpeakOutcome};

use crate::error::Result;

/// Renders text to the speaker.
pub trait Synthesizer: Send {
    /// Synthesize and play `text`, returning once playback has finished.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VoiceError::Synthesis`] if the text could not be
    /// rendered.
    fn speak(&mut self, text: &str) -> Result<()>;

    /// Engine name for logs.
    fn name(&self) -> &str {
        "synthesizer"
    }
}
