//! Decoder result payloads.
//!
//! Offline streaming engines report results as small JSON objects:
//! `{"text": "..."}` for a final result and `{"partial": "..."}` for a
//! provisional one. Missing keys decode as empty text.

use crate::error::{Result, VoiceError};
use serde::{Deserialize, Serialize};

/// A finalized transcript for the current utterance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalResult {
    #[serde(default)]
    pub text: String,
}

/// A provisional hypothesis that may still be revised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialResult {
    #[serde(default)]
    pub partial: String,
}

impl FinalResult {
    /// Build from a text value.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Parse an engine JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Decoder`] on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VoiceError::Decoder(format!("bad final result {json:?}: {e}")))
    }

    /// Trimmed transcript text.
    pub fn transcript(&self) -> &str {
        self.text.trim()
    }
}

impl PartialResult {
    /// Build from a text value.
    pub fn new(partial: impl Into<String>) -> Self {
        Self {
            partial: partial.into(),
        }
    }

    /// Parse an engine JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Decoder`] on malformed JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| VoiceError::Decoder(format!("bad partial result {json:?}: {e}")))
    }

    /// Whether the hypothesis contains anything but whitespace.
    pub fn has_speech(&self) -> bool {
        !self.partial.trim().is_empty()
    }
}
