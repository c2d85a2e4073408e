//! Single-worker playback queue.
//!
//! All spoken output goes through one long-lived worker thread, so two
//! utterances never overlap. The queue is the only writer of the
//! [`EchoGuard`] flag: `speak` claims a playback slot (raising the flag)
//! before it returns, and the worker releases the slot after rendering,
//! whether rendering succeeded, failed or panicked.

use crate::config::{BusyPolicy, TtsConfig};
use crate::echo_guard::{EchoGuard, PlaybackObserver};
use crate::error::{Result, VoiceError};
use crate::tts::Synthesizer;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Poll interval for `speak(.., block = true)` while checking for shutdown.
const BLOCK_POLL: Duration = Duration::from_millis(50);

/// A unit of text accepted for playback.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub text: String,
    pub enqueued_at: Instant,
}

enum Job {
    Speak(Utterance),
    Shutdown,
}

/// What happened to a `speak` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// Accepted for playback. With `block = true`, playback has also ended.
    Accepted,
    /// Empty or whitespace-only text; nothing happened.
    Empty,
    /// Dropped because playback was busy (or the queue was full).
    Busy,
    /// Dropped because the worker is not running.
    NotRunning,
}

type SharedSynth = Arc<Mutex<Box<dyn Synthesizer>>>;

struct Worker {
    tx: Sender<Job>,
    done_rx: Receiver<()>,
    stopping: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Serializes speech output onto one worker thread.
pub struct PlaybackQueue {
    guard: EchoGuard,
    synthesizer: SharedSynth,
    policy: BusyPolicy,
    capacity: usize,
    join_timeout: Duration,
    worker: Mutex<Option<Worker>>,
}

impl PlaybackQueue {
    /// Create a stopped queue. Call [`start`](Self::start) before speaking.
    pub fn new(config: &TtsConfig, synthesizer: Box<dyn Synthesizer>) -> Self {
        let capacity = match config.busy_policy {
            BusyPolicy::Drop => 1,
            BusyPolicy::Queue => config.queue_capacity.max(1),
        };
        Self {
            guard: EchoGuard::new(),
            synthesizer: Arc::new(Mutex::new(synthesizer)),
            policy: config.busy_policy,
            capacity,
            join_timeout: Duration::from_millis(config.join_timeout_ms),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker. Calling this while running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Worker`] if the thread cannot be spawned.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.lock_worker();
        if slot.is_some() {
            debug!("playback worker already running");
            return Ok(());
        }

        let (tx, rx) = unbounded::<Job>();
        let (done_tx, done_rx) = bounded::<()>(1);
        let stopping = Arc::new(AtomicBool::new(false));

        let synthesizer = Arc::clone(&self.synthesizer);
        let guard = self.guard.clone();
        let stopping_worker = Arc::clone(&stopping);
        let handle = std::thread::Builder::new()
            .name("turntalk-playback".into())
            .spawn(move || {
                let _done = DoneSignal(done_tx);
                run_worker(&rx, &synthesizer, &guard, &stopping_worker);
            })
            .map_err(|e| VoiceError::Worker(format!("failed to spawn playback worker: {e}")))?;

        *slot = Some(Worker {
            tx,
            done_rx,
            stopping,
            handle,
        });
        info!(policy = ?self.policy, capacity = self.capacity, "playback worker started");
        Ok(())
    }

    /// Stop the worker, discarding utterances that have not started.
    ///
    /// An utterance already rendering is allowed to finish. Waits at most
    /// `join_timeout_ms` for the worker to exit. Safe to call when never
    /// started and safe to call repeatedly.
    pub fn stop(&self) {
        let Some(worker) = self.lock_worker().take() else {
            return;
        };

        worker.stopping.store(true, Ordering::SeqCst);
        if worker.tx.send(Job::Shutdown).is_err() {
            debug!("playback worker already gone");
        }

        match worker.done_rx.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if worker.handle.join().is_err() {
                    error!("playback worker panicked");
                }
                info!("playback worker stopped");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "playback worker did not exit in time, detaching"
                );
            }
        }
    }

    /// Submit `text` for playback.
    ///
    /// Empty text is ignored. When an utterance is already playing the
    /// request is dropped under [`BusyPolicy::Drop`], or queued behind it
    /// under [`BusyPolicy::Queue`] while there is room. On acceptance the
    /// playback flag is already set when this returns. With `block`, waits
    /// until playback is idle or the queue is stopped.
    pub fn speak(&self, text: &str, block: bool) -> SpeakOutcome {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring empty utterance");
            return SpeakOutcome::Empty;
        }

        {
            // Held across claim and send so a concurrent `stop()` cannot
            // queue its shutdown between them.
            let slot = self.lock_worker();
            let Some(worker) = slot.as_ref() else {
                warn!("playback worker not running, dropping utterance");
                return SpeakOutcome::NotRunning;
            };

            if !self.guard.try_claim(self.capacity) {
                info!(
                    policy = ?self.policy,
                    pending = self.guard.pending(),
                    "playback busy, dropping utterance"
                );
                return SpeakOutcome::Busy;
            }

            let utterance = Utterance {
                text: text.to_owned(),
                enqueued_at: Instant::now(),
            };
            if worker.tx.send(Job::Speak(utterance)).is_err() {
                self.guard.release();
                warn!("playback worker gone, dropping utterance");
                return SpeakOutcome::NotRunning;
            }
        }

        if block {
            self.wait_idle();
        }
        SpeakOutcome::Accepted
    }

    /// Whether speech is being rendered or is about to be.
    pub fn is_playing(&self) -> bool {
        self.guard.is_tts_playing()
    }

    /// Whether the worker is running.
    pub fn is_running(&self) -> bool {
        self.lock_worker().is_some()
    }

    /// Accepted utterances that have not finished.
    pub fn pending(&self) -> usize {
        self.guard.pending()
    }

    /// Read-only view of the playback flag for the capture side.
    pub fn observer(&self) -> PlaybackObserver {
        self.guard.observer()
    }

    fn wait_idle(&self) {
        while !self.guard.wait_until_idle(BLOCK_POLL) {
            if !self.is_running() {
                debug!("queue stopped while waiting for playback");
                return;
            }
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for PlaybackQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Signals `stop()` when the worker thread exits, however it exits.
struct DoneSignal(Sender<()>);

impl Drop for DoneSignal {
    fn drop(&mut self) {
        let _ = self.0.try_send(());
    }
}

/// Releases one playback slot when dropped.
struct SlotRelease<'a>(&'a EchoGuard);

impl Drop for SlotRelease<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}

fn run_worker(
    rx: &Receiver<Job>,
    synthesizer: &SharedSynth,
    guard: &EchoGuard,
    stopping: &AtomicBool,
) {
    for job in rx.iter() {
        let utterance = match job {
            Job::Shutdown => break,
            Job::Speak(utterance) => utterance,
        };
        let _slot = SlotRelease(guard);

        if stopping.load(Ordering::SeqCst) {
            debug!(text = %utterance.text, "discarding utterance on shutdown");
            continue;
        }

        let waited_ms = utterance.enqueued_at.elapsed().as_millis() as u64;
        let started = Instant::now();
        let mut synth = synthesizer.lock().unwrap_or_else(PoisonError::into_inner);
        match catch_unwind(AssertUnwindSafe(|| synth.speak(&utterance.text))) {
            Ok(Ok(())) => {
                debug!(
                    waited_ms,
                    played_ms = started.elapsed().as_millis() as u64,
                    "utterance played"
                );
            }
            Ok(Err(e)) => error!(engine = synth.name(), "synthesis failed: {e}"),
            Err(payload) => {
                error!(
                    engine = synth.name(),
                    "synthesizer panicked: {}",
                    panic_message(payload.as_ref())
                );
            }
        }
    }

    let mut leftover = 0_usize;
    for job in rx.try_iter() {
        if let Job::Speak(_) = job {
            guard.release();
            leftover += 1;
        }
    }
    if leftover > 0 {
        debug!(leftover, "released slots of unplayed utterances");
    }
    debug!("playback worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic>"
    }
}
