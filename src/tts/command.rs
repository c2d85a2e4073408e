//! Synthesizer backed by the platform's speech command.
//!
//! Linux uses `espeak-ng`, macOS uses `say` and Windows drives
//! `System.Speech` through PowerShell. Each of these plays to the default
//! output device and exits when playback is done, which gives the blocking
//! behaviour the playback worker needs.

use crate::config::TtsConfig;
use crate::error::{Result, VoiceError};
use crate::tts::Synthesizer;
use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Rate at which `System.Speech` speaks with `Rate = 0`, in words per minute.
const SAPI_BASE_WPM: i64 = 180;

/// Argument convention of a speech program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandStyle {
    Espeak,
    Say,
    PowerShell,
    /// Unknown program: the text is the only argument.
    Plain,
}

impl CommandStyle {
    fn detect(program: &str) -> Self {
        let stem = Path::new(program)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(program)
            .to_ascii_lowercase();
        match stem.as_str() {
            "espeak" | "espeak-ng" => Self::Espeak,
            "say" => Self::Say,
            "powershell" | "pwsh" => Self::PowerShell,
            _ => Self::Plain,
        }
    }
}

/// Speaks text by running an external program once per utterance.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: String,
    style: CommandStyle,
    rate: u32,
    volume: f32,
    voice: Option<String>,
}

impl CommandSynthesizer {
    /// Build from configuration, using the platform default program unless
    /// `tts.command` is set.
    pub fn new(config: &TtsConfig) -> Self {
        let program = config
            .command
            .clone()
            .unwrap_or_else(|| default_program().to_owned());
        let style = CommandStyle::detect(&program);
        Self {
            program,
            style,
            rate: config.rate,
            volume: config.volume.clamp(0.0, 1.0),
            voice: config.voice.clone(),
        }
    }

    fn build_command(&self, text: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        match self.style {
            CommandStyle::Espeak => {
                // espeak amplitude runs 0..=200, 100 being normal.
                let amplitude = (self.volume * 200.0).round() as u32;
                cmd.arg("-s").arg(self.rate.to_string());
                cmd.arg("-a").arg(amplitude.to_string());
                if let Some(ref voice) = self.voice {
                    cmd.arg("-v").arg(voice);
                }
                cmd.arg("--").arg(text);
            }
            CommandStyle::Say => {
                cmd.arg("-r").arg(self.rate.to_string());
                if let Some(ref voice) = self.voice {
                    cmd.arg("-v").arg(voice);
                }
                cmd.arg("--").arg(text);
            }
            CommandStyle::PowerShell => {
                cmd.arg("-NoProfile")
                    .arg("-NonInteractive")
                    .arg("-Command")
                    .arg(self.powershell_script(text));
            }
            CommandStyle::Plain => {
                cmd.arg(text);
            }
        }
        cmd
    }

    fn powershell_script(&self, text: &str) -> String {
        let sapi_rate = ((i64::from(self.rate) - SAPI_BASE_WPM) / 20).clamp(-10, 10);
        let sapi_volume = (self.volume * 100.0).round() as u32;
        let mut script = String::from(
            "Add-Type -AssemblyName System.Speech; \
             $s = New-Object System.Speech.Synthesis.SpeechSynthesizer; ",
        );
        script.push_str(&format!("$s.Rate = {sapi_rate}; $s.Volume = {sapi_volume}; "));
        if let Some(ref voice) = self.voice {
            script.push_str(&format!("$s.SelectVoice('{}'); ", ps_quote(voice)));
        }
        script.push_str(&format!("$s.Speak('{}')", ps_quote(text)));
        script
    }
}

impl Synthesizer for CommandSynthesizer {
    fn speak(&mut self, text: &str) -> Result<()> {
        debug!(program = %self.program, chars = text.chars().count(), "speaking");
        let output = self
            .build_command(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => VoiceError::Synthesis(format!(
                    "speech program '{}' not found; install it or set tts.command",
                    self.program
                )),
                _ => VoiceError::Synthesis(format!("failed to run '{}': {e}", self.program)),
            })?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(VoiceError::Synthesis(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )))
        }
    }

    fn name(&self) -> &str {
        &self.program
    }
}

fn default_program() -> &'static str {
    if cfg!(target_os = "macos") {
        "say"
    } else if cfg!(target_os = "windows") {
        "powershell"
    } else {
        "espeak-ng"
    }
}

/// Escape for a single-quoted PowerShell string.
fn ps_quote(s: &str) -> String {
    s.replace('\'', "''")
}
