//! Application directory paths.
//!
//! | Purpose | Linux default | Override |
//! |---------|---------------|----------|
//! | Config  | `~/.config/turntalk/` | `TURNTALK_CONFIG_DIR` |
//! | Data    | `~/.local/share/turntalk/` | `TURNTALK_DATA_DIR` |
//!
//! Logs and decoder models live under the data directory.

use std::path::PathBuf;

/// Application data root directory.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TURNTALK_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("turntalk"))
        .unwrap_or_else(|| PathBuf::from("/tmp/turntalk-data"))
}

/// Application config directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("TURNTALK_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("turntalk"))
        .unwrap_or_else(|| PathBuf::from("/tmp/turntalk-config"))
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Decoder model directory (`data_dir()/models/`).
#[must_use]
pub fn models_dir() -> PathBuf {
    data_dir().join("models")
}
