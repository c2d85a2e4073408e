//! Configuration types for the voice loop.
//!
//! All values are read once when the engines are constructed. Runtime
//! changes go through the clamped setters on the engines, never back
//! into this structure.

use crate::error::{Result, VoiceError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Audio input settings.
    pub audio: AudioConfig,
    /// Capture timing and decoder settings.
    pub recognition: RecognitionConfig,
    /// Speech output settings.
    pub tts: TtsConfig,
    /// Reply wording used by the interaction loop.
    pub conversation: ConversationConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Audio input configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate delivered to the decoder, in Hz.
    pub sample_rate: u32,
    /// Channel count delivered to the decoder (1 = mono).
    pub channels: u16,
    /// Samples per frame. 1600 at 16kHz is one 100ms frame.
    pub frame_size: usize,
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Upper bound on a single blocking frame read, in milliseconds.
    pub read_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            channels: 1,
            frame_size: 1600,
            input_device: None,
            read_timeout_ms: 1000,
        }
    }
}

/// Listen timeout bounds, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeoutBounds {
    pub initial: f64,
    pub min: f64,
    pub max: f64,
}

/// A wait or threshold value with its bounds, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaitBounds {
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

/// Peak-amplitude threshold bounds on 16-bit PCM.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeBounds {
    pub base: u16,
    pub min: u16,
    pub max: u16,
}

/// Capture engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Silence timeout for a capture attempt before any speech is heard.
    pub timeout: TimeoutBounds,
    /// Listen timeout used after a reply that closes the exchange.
    pub post_speech_short_wait: WaitBounds,
    /// Listen timeout used after a reply that expects a follow-up.
    pub post_speech_long_wait: WaitBounds,
    /// Hard cap on an attempt once speech has started.
    pub long_speech_threshold: WaitBounds,
    /// Noise-gate threshold (peak amplitude).
    pub volume_threshold: VolumeBounds,
    /// Zero frames whose peak is below `volume_threshold` before decoding.
    pub noise_gate: bool,
    /// Consecutive frame read failures tolerated before an attempt is abandoned.
    pub max_consecutive_read_errors: u32,
    /// Decoder model directory (None = default under the models dir).
    pub model_path: Option<PathBuf>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            timeout: TimeoutBounds {
                initial: 5.0,
                min: 2.0,
                max: 20.0,
            },
            post_speech_short_wait: WaitBounds {
                value: 3.0,
                min: 1.0,
                max: 10.0,
            },
            post_speech_long_wait: WaitBounds {
                value: 8.0,
                min: 3.0,
                max: 20.0,
            },
            long_speech_threshold: WaitBounds {
                value: 15.0,
                min: 5.0,
                max: 60.0,
            },
            volume_threshold: VolumeBounds {
                base: 500,
                min: 100,
                max: 5000,
            },
            noise_gate: false,
            max_consecutive_read_errors: 10,
            model_path: None,
        }
    }
}

impl RecognitionConfig {
    /// Resolve the decoder model directory.
    pub fn resolved_model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| crate::app_dirs::models_dir().join(DEFAULT_MODEL_DIR))
    }
}

/// Model directory name used when `recognition.model_path` is unset.
pub const DEFAULT_MODEL_DIR: &str = "vosk-model-small-cn-0.22";

/// What `speak` does when an utterance is already playing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Discard the new request.
    #[default]
    Drop,
    /// Queue the new request up to `queue_capacity`, dropping when full.
    Queue,
}

/// Speech output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Speaking rate in words per minute.
    pub rate: u32,
    /// Output volume in `[0.0, 1.0]`.
    pub volume: f32,
    /// Voice name passed to the synthesizer (None = engine default).
    pub voice: Option<String>,
    /// Synthesizer program override (None = platform default).
    pub command: Option<String>,
    /// Behaviour when a request arrives during playback.
    pub busy_policy: BusyPolicy,
    /// Maximum accepted-but-unfinished utterances under [`BusyPolicy::Queue`].
    pub queue_capacity: usize,
    /// How long `stop()` waits for the worker to exit, in milliseconds.
    pub join_timeout_ms: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            rate: 180,
            volume: 1.0,
            voice: None,
            command: None,
            busy_policy: BusyPolicy::Drop,
            queue_capacity: 4,
            join_timeout_ms: 3000,
        }
    }
}

/// Reply wording used by the interaction loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Prefix added to failed replies that do not already start with it.
    pub apology_prefix: String,
    /// Spoken when handling a turn fails outright.
    pub error_reply: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            apology_prefix: "Sorry, ".to_owned(),
            error_reply: "Sorry, something went wrong. Please try again later.".to_owned(),
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive (overridden by `RUST_LOG`).
    pub filter: String,
    /// Also write daily-rotated log files.
    pub file: bool,
    /// Log directory (None = default logs dir).
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "turntalk=info".to_owned(),
            file: true,
            directory: None,
        }
    }
}

impl VoiceConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// loaded bounds are inconsistent.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse_merged(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VoiceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `path`, creating it with defaults when missing.
    ///
    /// A file that exists but does not parse is moved aside to
    /// `<name>.backup` and replaced with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read for a reason other than
    /// absence, or if the replacement file cannot be written.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to_file(path)?;
            tracing::info!(path = %path.display(), "created default config");
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let parsed = Self::parse_merged(&content).and_then(|c| c.validate().map(|()| c));

        match parsed {
            Ok(config) => Ok(config),
            Err(e) => {
                let backup = backup_path(path);
                warn!(
                    path = %path.display(),
                    backup = %backup.display(),
                    "unusable config ({e}), restoring defaults"
                );
                std::fs::rename(path, &backup)?;
                let config = Self::default();
                config.save_to_file(path)?;
                Ok(config)
            }
        }
    }

    /// Parse `content` as an overlay on the defaults.
    ///
    /// Tables merge key by key at every depth, so a file may set a single
    /// bound and keep the default for its siblings.
    fn parse_merged(content: &str) -> Result<Self> {
        let overlay: toml::Table =
            toml::from_str(content).map_err(|e| VoiceError::Config(e.to_string()))?;
        let mut merged =
            toml::Value::try_from(Self::default()).map_err(|e| VoiceError::Config(e.to_string()))?;
        merge_toml(&mut merged, toml::Value::Table(overlay));
        merged
            .try_into()
            .map_err(|e: toml::de::Error| VoiceError::Config(e.to_string()))
    }

    /// Returns the default config file path (`<config dir>/config.toml`).
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_dir().join("config.toml")
    }

    /// Check structural consistency of all bounds.
    ///
    /// Values outside their bounds are accepted here; the engines clamp
    /// them at construction. Only bounds that cannot be satisfied at all
    /// are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Config`] naming the first inconsistent field.
    pub fn validate(&self) -> Result<()> {
        let r = &self.recognition;
        check_range("recognition.timeout", r.timeout.min, r.timeout.max)?;
        check_range(
            "recognition.post_speech_short_wait",
            r.post_speech_short_wait.min,
            r.post_speech_short_wait.max,
        )?;
        check_range(
            "recognition.post_speech_long_wait",
            r.post_speech_long_wait.min,
            r.post_speech_long_wait.max,
        )?;
        check_range(
            "recognition.long_speech_threshold",
            r.long_speech_threshold.min,
            r.long_speech_threshold.max,
        )?;
        if r.volume_threshold.min > r.volume_threshold.max {
            return Err(VoiceError::Config(
                "recognition.volume_threshold: min exceeds max".to_owned(),
            ));
        }

        if self.audio.sample_rate == 0 || self.audio.channels == 0 || self.audio.frame_size == 0 {
            return Err(VoiceError::Config(
                "audio: sample_rate, channels and frame_size must be non-zero".to_owned(),
            ));
        }
        if self.tts.queue_capacity == 0 {
            return Err(VoiceError::Config(
                "tts.queue_capacity must be at least 1".to_owned(),
            ));
        }
        if !(0.0..=1.0).contains(&self.tts.volume) {
            return Err(VoiceError::Config(
                "tts.volume must be within [0.0, 1.0]".to_owned(),
            ));
        }
        Ok(())
    }
}

fn check_range(name: &str, min: f64, max: f64) -> Result<()> {
    if !min.is_finite() || !max.is_finite() {
        return Err(VoiceError::Config(format!("{name}: bounds must be finite")));
    }
    if min < 0.0 {
        return Err(VoiceError::Config(format!("{name}: min must not be negative")));
    }
    if min > max {
        return Err(VoiceError::Config(format!("{name}: min exceeds max")));
    }
    Ok(())
}

fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "config.toml".into());
    name.push(".backup");
    path.with_file_name(name)
}
