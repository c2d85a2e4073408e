//! The listen, handle, reply loop.

use crate::config::ConversationConfig;
use crate::error::Result;
use crate::pipeline::messages::{Reply, StopReason, TurnOutcome};
use crate::pipeline::recognizer::SpeechCaptureEngine;
use crate::tts::PlaybackQueue;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How often the "no speech" notice may repeat.
const SILENCE_NOTICE_INTERVAL: Duration = Duration::from_secs(30);

/// How long a turn waits for playback to end before listening again.
const PLAYBACK_SETTLE: Duration = Duration::from_millis(250);

/// Turns a transcript into a reply.
///
/// This is where intent parsing and command execution plug in.
pub trait CommandHandler: Send {
    /// Handle one transcript.
    ///
    /// # Errors
    ///
    /// Any error is logged and answered with the configured error reply.
    fn handle(&mut self, text: &str) -> anyhow::Result<Reply>;
}

impl<F> CommandHandler for F
where
    F: FnMut(&str) -> anyhow::Result<Reply> + Send,
{
    fn handle(&mut self, text: &str) -> anyhow::Result<Reply> {
        self(text)
    }
}

/// Repeats what it hears, ending the loop on an exit phrase.
#[derive(Debug, Clone)]
pub struct EchoHandler {
    exit_phrases: Vec<String>,
}

impl Default for EchoHandler {
    fn default() -> Self {
        Self {
            exit_phrases: ["exit", "quit", "goodbye", "退出", "再见"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }
}

impl CommandHandler for EchoHandler {
    fn handle(&mut self, text: &str) -> anyhow::Result<Reply> {
        let normalized = text.trim().to_lowercase();
        if self.exit_phrases.iter().any(|p| *p == normalized) {
            return Ok(Reply::exit("Goodbye."));
        }
        Ok(Reply::say(text))
    }
}

/// Drives capture and playback turn by turn.
pub struct InteractionLoop<H> {
    recognizer: SpeechCaptureEngine,
    playback: PlaybackQueue,
    handler: H,
    conversation: ConversationConfig,
    cancel: CancellationToken,
    last_silence_notice: Option<Instant>,
}

impl<H: CommandHandler> InteractionLoop<H> {
    /// Assemble a loop. The playback queue is started by [`run`](Self::run).
    pub fn new(
        recognizer: SpeechCaptureEngine,
        playback: PlaybackQueue,
        handler: H,
        conversation: ConversationConfig,
    ) -> Self {
        Self {
            recognizer,
            playback,
            handler,
            conversation,
            cancel: CancellationToken::new(),
            last_silence_notice: None,
        }
    }

    /// Token that ends the loop at the next frame when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn recognizer(&self) -> &SpeechCaptureEngine {
        &self.recognizer
    }

    pub fn playback(&self) -> &PlaybackQueue {
        &self.playback
    }

    /// Run one listen, handle, reply cycle.
    pub fn run_turn(&mut self) -> TurnOutcome {
        let report = self.recognizer.capture_with_cancel(None, &self.cancel);
        if self.cancel.is_cancelled() {
            info!("shutdown requested, ending turn");
            return TurnOutcome::Exit;
        }

        if !report.has_text() {
            match report.stop_reason {
                StopReason::PlaybackActive => {
                    self.playback.observer().wait_until_idle(PLAYBACK_SETTLE);
                }
                StopReason::SilenceTimeout => self.notice_silence(),
                _ => {}
            }
            return TurnOutcome::Continue;
        }

        info!(text = %report.text, "user said");
        let reply = match self.handler.handle(&report.text) {
            Ok(reply) => reply,
            Err(e) => {
                error!("handling transcript failed: {e:#}");
                self.playback.speak(&self.conversation.error_reply, false);
                return TurnOutcome::Continue;
            }
        };

        let message = if reply.success {
            reply.message.clone()
        } else {
            apologize(&reply.message, &self.conversation.apology_prefix)
        };
        self.playback.speak(&message, reply.should_exit);

        let next = if reply.expect_follow_up {
            self.recognizer.post_speech_long_wait()
        } else {
            self.recognizer.post_speech_short_wait()
        };
        self.recognizer.set_current_timeout(next);

        if reply.should_exit {
            info!("exit requested by handler");
            TurnOutcome::Exit
        } else {
            TurnOutcome::Continue
        }
    }

    /// Start playback and run turns until exit or cancellation, then stop
    /// playback.
    ///
    /// # Errors
    ///
    /// Returns an error if the playback worker cannot be started.
    pub fn run(&mut self) -> Result<()> {
        self.playback.start()?;
        info!("assistant ready, start speaking");
        while !self.cancel.is_cancelled() {
            if self.run_turn() == TurnOutcome::Exit {
                break;
            }
        }
        self.playback.stop();
        Ok(())
    }

    fn notice_silence(&mut self) {
        let due = self
            .last_silence_notice
            .is_none_or(|at| at.elapsed() >= SILENCE_NOTICE_INTERVAL);
        if due {
            info!("no speech detected, waiting for input");
            self.last_silence_notice = Some(Instant::now());
        }
    }
}

/// Prefix a failure message with an apology unless it already has one.
pub fn apologize(message: &str, prefix: &str) -> String {
    let marker = prefix
        .trim_end_matches(|c: char| c.is_whitespace() || c.is_ascii_punctuation() || c == '，');
    if marker.is_empty() || message.starts_with(marker) {
        return message.to_owned();
    }
    if message.trim().is_empty() {
        warn!("failed reply has no message");
        return marker.to_owned();
    }
    format!("{prefix}{message}")
}
