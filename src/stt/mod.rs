//! Streaming speech decoder interface.
//!
//! A decoder consumes fixed-size PCM frames and reports, per frame, whether
//! a final result is ready. Provisional text is available at any time
//! through [`StreamingDecoder::partial_result`]. Sessions are cheap and
//! are created fresh for every capture attempt so that no recognition state
//! carries over between attempts.

pub mod result;
#[cfg(feature = "vosk")]
pub mod vosk;

pub use result::{FinalResult, PartialResult};

use crate::error::Result;

/// One recognition session.
pub trait StreamingDecoder {
    /// Feed one frame. Returns `true` when a final result is ready.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VoiceError::Decoder`] if the engine rejects the frame.
    fn accept(&mut self, frame: &[i16]) -> Result<bool>;

    /// The result made ready by the last `accept` that returned `true`.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine output cannot be read.
    fn final_result(&mut self) -> Result<FinalResult>;

    /// The current provisional hypothesis.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine output cannot be read.
    fn partial_result(&mut self) -> Result<PartialResult>;

    /// Force the engine to finalize whatever it has heard so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine output cannot be read.
    fn flush(&mut self) -> Result<FinalResult> {
        self.final_result()
    }
}

/// Creates decoder sessions bound to a loaded model.
pub trait DecoderFactory: Send + Sync {
    /// Start a new session for PCM at `sample_rate`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::VoiceError::Decoder`] if a session cannot be created.
    fn new_session(&self, sample_rate: u32) -> Result<Box<dyn StreamingDecoder>>;

    /// Backend name for logs.
    fn name(&self) -> &str {
        "decoder"
    }
}
