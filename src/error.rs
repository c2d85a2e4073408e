//! Error types for the turntalk voice loop.

/// Top-level error type for capture, decoding and playback.
#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    /// No usable input device, or the input stream cannot be opened.
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Audio stream error on an already open device.
    #[error("audio error: {0}")]
    Audio(String),

    /// Streaming decoder construction or decoding error.
    #[error("decoder error: {0}")]
    Decoder(String),

    /// Text-to-speech synthesis or render error.
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Background worker lifecycle error (spawn, join).
    #[error("worker error: {0}")]
    Worker(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoiceError>;
