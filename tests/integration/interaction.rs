//! Integration tests for `InteractionLoop` and the capture/playback handshake.

use crate::helpers::{MockDevice, RecordingSynth, ScriptedDecoder, Spoken, Step, fast_config};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use turntalk::audio::AudioDevice;
use turntalk::stt::DecoderFactory;
use turntalk::{
    CommandHandler, InteractionLoop, PlaybackQueue, Reply, SpeakOutcome, SpeechCaptureEngine,
    StopReason, TurnOutcome,
};

const SETTLE: Duration = Duration::from_secs(5);

fn build_loop<H: CommandHandler>(
    script: Vec<Step>,
    handler: H,
) -> (InteractionLoop<H>, Spoken, Arc<MockDevice>) {
    let config = fast_config();
    let device = Arc::new(MockDevice::new());
    let decoder: Arc<dyn DecoderFactory> = Arc::new(ScriptedDecoder::new(script));
    let (synth, spoken) = RecordingSynth::new(Duration::from_millis(20));
    let playback = PlaybackQueue::new(&config.tts, Box::new(synth));
    playback.start().unwrap();
    let recognizer = SpeechCaptureEngine::new(
        &config,
        Arc::clone(&device) as Arc<dyn AudioDevice>,
        decoder,
        playback.observer(),
    );
    let interaction = InteractionLoop::new(recognizer, playback, handler, config.conversation);
    (interaction, spoken, device)
}

fn settle<H: CommandHandler>(interaction: &InteractionLoop<H>) {
    assert!(interaction.playback().observer().wait_until_idle(SETTLE));
}

// ─── Turns ───────────────────────────────────────────────────────────────────

#[test]
fn test_turn_speaks_reply_and_uses_short_wait() {
    let (mut interaction, spoken, _device) = build_loop(
        vec![Step::Partial("ni"), Step::Final("你好")],
        |text: &str| -> anyhow::Result<Reply> { Ok(Reply::say(format!("heard {text}"))) },
    );

    assert_eq!(interaction.run_turn(), TurnOutcome::Continue);
    settle(&interaction);

    assert_eq!(spoken.texts(), vec!["heard 你好"]);
    let recognizer = interaction.recognizer();
    assert!((recognizer.current_timeout() - recognizer.post_speech_short_wait()).abs() < 1e-9);
}

#[test]
fn test_follow_up_reply_uses_long_wait() {
    let (mut interaction, _spoken, _device) = build_loop(
        vec![Step::Final("open a file")],
        |_: &str| -> anyhow::Result<Reply> { Ok(Reply::ask("Which one?")) },
    );

    interaction.run_turn();
    settle(&interaction);

    let recognizer = interaction.recognizer();
    assert!((recognizer.current_timeout() - 0.8).abs() < 1e-9);
}

#[test]
fn test_failed_reply_gets_apology_prefix() {
    let (mut interaction, spoken, _device) = build_loop(
        vec![Step::Final("delete everything")],
        |_: &str| -> anyhow::Result<Reply> { Ok(Reply::failed("that is not allowed")) },
    );

    interaction.run_turn();
    settle(&interaction);
    assert_eq!(spoken.texts(), vec!["Sorry, that is not allowed"]);
}

#[test]
fn test_handler_error_speaks_error_reply() {
    let (mut interaction, spoken, _device) = build_loop(
        vec![Step::Final("crash please")],
        |_: &str| -> anyhow::Result<Reply> { anyhow::bail!("planner offline") },
    );

    assert_eq!(interaction.run_turn(), TurnOutcome::Continue);
    settle(&interaction);
    assert_eq!(
        spoken.texts(),
        vec!["Sorry, something went wrong. Please try again later."]
    );
}

#[test]
fn test_exit_reply_is_spoken_before_exit() {
    let (mut interaction, spoken, _device) = build_loop(
        vec![Step::Final("goodbye")],
        |_: &str| -> anyhow::Result<Reply> { Ok(Reply::exit("Bye.")) },
    );

    assert_eq!(interaction.run_turn(), TurnOutcome::Exit);
    // Exit replies block, so the text is already rendered.
    assert_eq!(spoken.texts(), vec!["Bye."]);
}

#[test]
fn test_silence_skips_handler() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let (mut interaction, spoken, _device) =
        build_loop(Vec::new(), move |_: &str| -> anyhow::Result<Reply> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::say("never"))
        });

    assert_eq!(interaction.run_turn(), TurnOutcome::Continue);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(spoken.texts().is_empty());
}

#[test]
fn test_cancelled_loop_exits() {
    let (mut interaction, _spoken, device) = build_loop(
        vec![Step::Final("hello")],
        |_: &str| -> anyhow::Result<Reply> { Ok(Reply::say("hi")) },
    );

    interaction.cancel_token().cancel();
    assert_eq!(interaction.run_turn(), TurnOutcome::Exit);
    assert_eq!(device.open_count(), 0);
    interaction.run().unwrap();
    assert!(!interaction.playback().is_running());
}

#[test]
fn test_run_stops_playback_on_exit() {
    let (mut interaction, spoken, _device) = build_loop(
        vec![Step::Final("quit")],
        turntalk::EchoHandler::default(),
    );

    interaction.run().unwrap();
    assert!(!interaction.playback().is_running());
    assert_eq!(spoken.texts(), vec!["Goodbye."]);
}

// ─── Half-duplex handshake ───────────────────────────────────────────────────

#[test]
fn test_capture_refused_while_queue_speaks() {
    let config = fast_config();
    let device = Arc::new(MockDevice::new());
    let decoder: Arc<dyn DecoderFactory> =
        Arc::new(ScriptedDecoder::new(vec![Step::Final("user")]));
    let (synth, _spoken) = RecordingSynth::new(Duration::from_millis(200));
    let playback = PlaybackQueue::new(&config.tts, Box::new(synth));
    playback.start().unwrap();
    let recognizer = SpeechCaptureEngine::new(
        &config,
        Arc::clone(&device) as Arc<dyn AudioDevice>,
        decoder,
        playback.observer(),
    );

    assert_eq!(playback.speak("assistant talking", false), SpeakOutcome::Accepted);
    let report = recognizer.capture_report(None);
    assert_eq!(report.stop_reason, StopReason::PlaybackActive);
    assert_eq!(device.open_count(), 0);

    assert!(playback.observer().wait_until_idle(SETTLE));
    assert_eq!(recognizer.capture(None), "user");
    assert_eq!(device.open_count(), 1);
    playback.stop();
}
