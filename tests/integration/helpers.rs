//! Shared helpers for integration tests.
//!
//! In-memory stand-ins for the microphone, the decoder and the speaker so
//! that capture and playback can be driven deterministically.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;
use turntalk::audio::{AudioDevice, InputStream};
use turntalk::config::{BusyPolicy, TimeoutBounds, VoiceConfig, WaitBounds};
use turntalk::stt::{DecoderFactory, FinalResult, PartialResult, StreamingDecoder};
use turntalk::tts::Synthesizer;
use turntalk::{PlaybackQueue, Result, VoiceError};

// ─── Config ──────────────────────────────────────────────────────────────────

/// Config with sub-second timings so capture tests finish quickly.
pub(crate) fn fast_config() -> VoiceConfig {
    let mut config = VoiceConfig::default();
    config.audio.frame_size = 160;
    config.recognition.timeout = TimeoutBounds {
        initial: 0.3,
        min: 0.1,
        max: 2.0,
    };
    config.recognition.post_speech_short_wait = WaitBounds {
        value: 0.2,
        min: 0.1,
        max: 1.0,
    };
    config.recognition.post_speech_long_wait = WaitBounds {
        value: 0.8,
        min: 0.1,
        max: 1.5,
    };
    config.recognition.long_speech_threshold = WaitBounds {
        value: 0.6,
        min: 0.1,
        max: 5.0,
    };
    config.recognition.max_consecutive_read_errors = 3;
    config.tts.join_timeout_ms = 2000;
    config
}

// ─── Audio device ────────────────────────────────────────────────────────────

type ReadHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Microphone stand-in that counts stream opens and closes.
pub(crate) struct MockDevice {
    pub opens: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    frame_delay: Duration,
    amplitude: i16,
    fail_open: bool,
    fail_reads: bool,
    on_read: Option<ReadHook>,
}

impl MockDevice {
    pub(crate) fn new() -> Self {
        Self {
            opens: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            frame_delay: Duration::from_millis(10),
            amplitude: 1000,
            fail_open: false,
            fail_reads: false,
            on_read: None,
        }
    }

    pub(crate) fn amplitude(mut self, amplitude: i16) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub(crate) fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub(crate) fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Call `hook(frame_index)` before each frame is delivered.
    pub(crate) fn on_read(mut self, hook: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_read = Some(Arc::new(hook));
        self
    }

    pub(crate) fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl AudioDevice for MockDevice {
    fn open_input_stream(
        &self,
        _sample_rate: u32,
        _channels: u16,
        _frame_size: usize,
    ) -> Result<Box<dyn InputStream>> {
        if self.fail_open {
            return Err(VoiceError::DeviceUnavailable("mock device unplugged".into()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockStream {
            closes: Arc::clone(&self.closes),
            closed: false,
            frame_delay: self.frame_delay,
            amplitude: self.amplitude,
            fail_reads: self.fail_reads,
            on_read: self.on_read.clone(),
            index: 0,
        }))
    }

    fn name(&self) -> String {
        "mock".into()
    }
}

struct MockStream {
    closes: Arc<AtomicUsize>,
    closed: bool,
    frame_delay: Duration,
    amplitude: i16,
    fail_reads: bool,
    on_read: Option<ReadHook>,
    index: u64,
}

impl InputStream for MockStream {
    fn read(&mut self, frame_size: usize) -> Result<Vec<i16>> {
        std::thread::sleep(self.frame_delay);
        if let Some(ref hook) = self.on_read {
            hook(self.index);
        }
        self.index += 1;
        if self.fail_reads {
            return Err(VoiceError::Audio("mock read failure".into()));
        }
        Ok(vec![self.amplitude; frame_size])
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// ─── Decoder ─────────────────────────────────────────────────────────────────

/// One decoder response, consumed per accepted frame.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Partial(&'static str),
    Final(&'static str),
    Fail,
}

/// Decoder factory replaying a fixed script in every session.
pub(crate) struct ScriptedDecoder {
    script: Vec<Step>,
    /// Step repeated once the script is exhausted.
    tail: Step,
    flush_text: &'static str,
    pub sessions: Arc<AtomicUsize>,
    /// Peak amplitude of every frame received, across sessions.
    pub peaks: Arc<Mutex<Vec<u16>>>,
}

impl ScriptedDecoder {
    pub(crate) fn new(script: Vec<Step>) -> Self {
        Self {
            script,
            tail: Step::Partial(""),
            flush_text: "",
            sessions: Arc::new(AtomicUsize::new(0)),
            peaks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Decoder that never hears anything.
    pub(crate) fn silent() -> Self {
        Self::new(Vec::new())
    }

    pub(crate) fn tail(mut self, tail: Step) -> Self {
        self.tail = tail;
        self
    }

    pub(crate) fn flush_text(mut self, text: &'static str) -> Self {
        self.flush_text = text;
        self
    }

    pub(crate) fn session_count(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl DecoderFactory for ScriptedDecoder {
    fn new_session(&self, _sample_rate: u32) -> Result<Box<dyn StreamingDecoder>> {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            script: self.script.clone(),
            tail: self.tail.clone(),
            flush_text: self.flush_text,
            position: 0,
            current: None,
            peaks: Arc::clone(&self.peaks),
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct ScriptedSession {
    script: Vec<Step>,
    tail: Step,
    flush_text: &'static str,
    position: usize,
    current: Option<Step>,
    peaks: Arc<Mutex<Vec<u16>>>,
}

impl StreamingDecoder for ScriptedSession {
    fn accept(&mut self, frame: &[i16]) -> Result<bool> {
        let peak = frame.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0);
        self.peaks.lock().unwrap().push(peak);

        let step = self
            .script
            .get(self.position)
            .cloned()
            .unwrap_or_else(|| self.tail.clone());
        self.position += 1;
        let ready = match step {
            Step::Final(_) => true,
            Step::Partial(_) => false,
            Step::Fail => return Err(VoiceError::Decoder("scripted failure".into())),
        };
        self.current = Some(step);
        Ok(ready)
    }

    fn final_result(&mut self) -> Result<FinalResult> {
        match self.current {
            Some(Step::Final(text)) => Ok(FinalResult::new(text)),
            _ => Ok(FinalResult::default()),
        }
    }

    fn partial_result(&mut self) -> Result<PartialResult> {
        match self.current {
            Some(Step::Partial(text)) => Ok(PartialResult::new(text)),
            _ => Ok(PartialResult::default()),
        }
    }

    fn flush(&mut self) -> Result<FinalResult> {
        Ok(FinalResult::new(self.flush_text))
    }
}

// ─── Synthesizer ─────────────────────────────────────────────────────────────

/// What a [`RecordingSynth`] saw, shared with the test.
#[derive(Debug, Default, Clone)]
pub(crate) struct Spoken {
    inner: Arc<Mutex<Vec<(String, ThreadId)>>>,
}

impl Spoken {
    pub(crate) fn texts(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub(crate) fn threads(&self) -> Vec<ThreadId> {
        self.inner.lock().unwrap().iter().map(|(_, id)| *id).collect()
    }
}

/// Speaker stand-in that records each utterance after a fixed delay.
pub(crate) struct RecordingSynth {
    spoken: Spoken,
    delay: Duration,
    fail_on: Option<&'static str>,
    panic_on: Option<&'static str>,
}

impl RecordingSynth {
    pub(crate) fn new(delay: Duration) -> (Self, Spoken) {
        let spoken = Spoken::default();
        (
            Self {
                spoken: spoken.clone(),
                delay,
                fail_on: None,
                panic_on: None,
            },
            spoken,
        )
    }

    pub(crate) fn failing_on(mut self, text: &'static str) -> Self {
        self.fail_on = Some(text);
        self
    }

    pub(crate) fn panicking_on(mut self, text: &'static str) -> Self {
        self.panic_on = Some(text);
        self
    }
}

impl Synthesizer for RecordingSynth {
    fn speak(&mut self, text: &str) -> Result<()> {
        std::thread::sleep(self.delay);
        if self.fail_on == Some(text) {
            return Err(VoiceError::Synthesis("mock synthesis failure".into()));
        }
        if self.panic_on == Some(text) {
            panic!("mock synthesizer panic");
        }
        self.spoken
            .inner
            .lock()
            .unwrap()
            .push((text.to_owned(), std::thread::current().id()));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// A started queue over a [`RecordingSynth`].
pub(crate) fn started_queue(
    policy: BusyPolicy,
    delay: Duration,
) -> (PlaybackQueue, Spoken) {
    let mut config = fast_config();
    config.tts.busy_policy = policy;
    let (synth, spoken) = RecordingSynth::new(delay);
    let queue = PlaybackQueue::new(&config.tts, Box::new(synth));
    queue.start().expect("start playback queue");
    (queue, spoken)
}
