//! Vosk offline decoder backend.

use crate::error::{Result, VoiceError};
use crate::stt::{DecoderFactory, FinalResult, PartialResult, StreamingDecoder};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use vosk::{DecodingState, Model, Recognizer};

/// Loads a Vosk model once and hands out per-capture recognizers.
pub struct VoskDecoderFactory {
    model: Arc<Model>,
}

impl VoskDecoderFactory {
    /// Load the model directory at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Decoder`] if the directory is missing or the
    /// model cannot be loaded.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(VoiceError::Decoder(format!(
                "model directory not found: {} (download one from https://alphacephei.com/vosk/models)",
                path.display()
            )));
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| VoiceError::Decoder(format!("non-UTF-8 model path: {}", path.display())))?;

        let model = Model::new(path_str)
            .ok_or_else(|| VoiceError::Decoder(format!("failed to load model at {path_str}")))?;
        info!(model = path_str, "vosk model loaded");

        Ok(Self {
            model: Arc::new(model),
        })
    }
}

impl DecoderFactory for VoskDecoderFactory {
    fn new_session(&self, sample_rate: u32) -> Result<Box<dyn StreamingDecoder>> {
        let recognizer = Recognizer::new(&self.model, sample_rate as f32).ok_or_else(|| {
            VoiceError::Decoder(format!("cannot create recognizer at {sample_rate} Hz"))
        })?;
        Ok(Box::new(VoskSession { recognizer }))
    }

    fn name(&self) -> &str {
        "vosk"
    }
}

struct VoskSession {
    recognizer: Recognizer,
}

impl StreamingDecoder for VoskSession {
    fn accept(&mut self, frame: &[i16]) -> Result<bool> {
        match self.recognizer.accept_waveform(frame) {
            Ok(DecodingState::Finalized) => Ok(true),
            Ok(DecodingState::Running) => Ok(false),
            Ok(DecodingState::Failed) => Err(VoiceError::Decoder("decoding failed".into())),
            Err(e) => Err(VoiceError::Decoder(format!("waveform rejected: {e:?}"))),
        }
    }

    fn final_result(&mut self) -> Result<FinalResult> {
        let text = self
            .recognizer
            .result()
            .single()
            .map(|r| r.text.to_owned())
            .unwrap_or_default();
        Ok(FinalResult::new(text))
    }

    fn partial_result(&mut self) -> Result<PartialResult> {
        Ok(PartialResult::new(self.recognizer.partial_result().partial))
    }

    fn flush(&mut self) -> Result<FinalResult> {
        let text = self
            .recognizer
            .final_result()
            .single()
            .map(|r| r.text.to_owned())
            .unwrap_or_default();
        Ok(FinalResult::new(text))
    }
}
