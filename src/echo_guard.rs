//! Half-duplex arbitration between the microphone and the speaker.
//!
//! The whole contract is one mutex-protected flag: `true` while synthesized
//! speech is being rendered, `false` otherwise. The playback worker is the
//! only writer; the capture engine only reads it through a
//! [`PlaybackObserver`], once before opening the input stream and once per
//! frame while listening. Readers never block on the flag. Up to one frame
//! of playback tail may be captured before a reader observes the change.
//!
//! A condition variable is signalled on every transition so that callers of
//! `speak(.., block = true)` can wait for playback to finish without polling.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Default)]
struct GuardState {
    playing: bool,
    /// Utterances accepted but not yet finished rendering.
    pending: usize,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<GuardState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, GuardState> {
        // A panic while holding this lock cannot leave the flag half-written.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_playing(&self) -> bool {
        self.lock().playing
    }

    fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        while state.playing {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = match self.changed.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

/// Writer side of the playback flag, owned by the playback queue.
#[derive(Debug, Clone, Default)]
pub struct EchoGuard {
    shared: Arc<Shared>,
}

impl EchoGuard {
    /// Create a guard in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only handle for the capture side.
    pub fn observer(&self) -> PlaybackObserver {
        PlaybackObserver {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Whether speech is currently being rendered.
    pub fn is_tts_playing(&self) -> bool {
        self.shared.is_playing()
    }

    /// Force the flag. Clearing it also forgets any pending utterances.
    pub fn set_tts_playing(&self, playing: bool) {
        let mut state = self.shared.lock();
        if !playing {
            state.pending = 0;
        }
        self.transition(&mut state, playing);
    }

    /// Reserve a playback slot, setting the flag.
    ///
    /// Fails without side effects when `capacity` slots are already taken.
    pub(crate) fn try_claim(&self, capacity: usize) -> bool {
        let mut state = self.shared.lock();
        if state.pending >= capacity.max(1) {
            return false;
        }
        state.pending += 1;
        self.transition(&mut state, true);
        true
    }

    /// Release one slot. The flag clears when no slots remain.
    pub(crate) fn release(&self) {
        let mut state = self.shared.lock();
        state.pending = state.pending.saturating_sub(1);
        let playing = state.pending > 0;
        self.transition(&mut state, playing);
    }

    /// Number of accepted utterances that have not finished.
    pub(crate) fn pending(&self) -> usize {
        self.shared.lock().pending
    }

    /// Block until the flag is clear or `timeout` elapses.
    ///
    /// Returns `true` if the flag was observed clear.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.shared.wait_until_idle(timeout)
    }

    fn transition(&self, state: &mut GuardState, playing: bool) {
        if state.playing != playing {
            state.playing = playing;
            debug!(playing, pending = state.pending, "echo guard transition");
            self.shared.changed.notify_all();
        }
    }
}

/// Read-only view of the playback flag.
#[derive(Debug, Clone)]
pub struct PlaybackObserver {
    shared: Arc<Shared>,
}

impl PlaybackObserver {
    /// Whether speech is currently being rendered.
    pub fn is_tts_playing(&self) -> bool {
        self.shared.is_playing()
    }

    /// Block until the flag is clear or `timeout` elapses.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.shared.wait_until_idle(timeout)
    }
}
