//! CLI binary for turntalk.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use turntalk::audio::{AudioDevice, CpalInput};
use turntalk::stt::DecoderFactory;
use turntalk::tts::CommandSynthesizer;
use turntalk::{
    EchoHandler, InteractionLoop, PlaybackQueue, SpeakOutcome, SpeechCaptureEngine, VoiceConfig,
};

/// turntalk: listen, answer, and never listen to yourself.
#[derive(Parser)]
#[command(name = "turntalk", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long, env = "TURNTALK_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the voice loop, repeating back what it hears.
    Run,

    /// List available input devices.
    Devices,

    /// Check that the configured input device can be opened.
    Check,

    /// Speak a line of text and wait for it to finish.
    Say {
        /// Text to speak.
        text: Vec<String>,
    },

    /// Manage the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(VoiceConfig::default_config_path);

    let command = match cli.command.unwrap_or(Command::Run) {
        Command::Config { action } => return run_config(action, &config_path),
        other => other,
    };

    let config = VoiceConfig::load_or_create(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let _log_guard = turntalk::logging::init(&config.logging)?;
    info!(config = %config_path.display(), "turntalk v{}", env!("CARGO_PKG_VERSION"));

    match command {
        Command::Run => run_loop(config).await,
        Command::Devices => list_devices(),
        Command::Check => check_input(&config),
        Command::Say { text } => say(&config, &text.join(" ")),
        Command::Config { .. } => Ok(()),
    }
}

async fn run_loop(config: VoiceConfig) -> anyhow::Result<()> {
    let decoder = load_decoder(&config)?;
    let device: Arc<dyn AudioDevice> = Arc::new(CpalInput::new(&config.audio));
    let playback = PlaybackQueue::new(
        &config.tts,
        Box::new(CommandSynthesizer::new(&config.tts)),
    );
    let recognizer = SpeechCaptureEngine::new(&config, device, decoder, playback.observer());
    if !recognizer.is_available() {
        anyhow::bail!("no usable input device; see `turntalk devices`");
    }

    let mut interaction = InteractionLoop::new(
        recognizer,
        playback,
        EchoHandler::default(),
        config.conversation.clone(),
    );

    let cancel = interaction.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel.cancel();
        }
    });

    tokio::task::spawn_blocking(move || interaction.run()).await??;
    info!("goodbye");
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Input devices:");
    for name in CpalInput::list_input_devices()? {
        println!("  - {name}");
    }
    Ok(())
}

fn check_input(config: &VoiceConfig) -> anyhow::Result<()> {
    let input = CpalInput::new(&config.audio);
    let name = input.name();
    if !input.is_available(
        config.audio.sample_rate,
        config.audio.channels,
        config.audio.frame_size,
    ) {
        anyhow::bail!("input device '{name}' is unavailable");
    }
    println!("Input device '{name}' OK");
    Ok(())
}

fn say(config: &VoiceConfig, text: &str) -> anyhow::Result<()> {
    let playback = PlaybackQueue::new(
        &config.tts,
        Box::new(CommandSynthesizer::new(&config.tts)),
    );
    playback.start()?;
    let outcome = playback.speak(text, true);
    playback.stop();
    match outcome {
        SpeakOutcome::Accepted => Ok(()),
        SpeakOutcome::Empty => anyhow::bail!("nothing to say"),
        other => anyhow::bail!("utterance not played: {other:?}"),
    }
}

fn run_config(action: ConfigAction, path: &std::path::Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
            }
            VoiceConfig::default().save_to_file(path)?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Show => {
            let config = if path.exists() {
                VoiceConfig::from_file(path)?
            } else {
                VoiceConfig::default()
            };
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }
    Ok(())
}

#[cfg(feature = "vosk")]
fn load_decoder(config: &VoiceConfig) -> anyhow::Result<Arc<dyn DecoderFactory>> {
    let path = config.recognition.resolved_model_path();
    let factory = turntalk::stt::vosk::VoskDecoderFactory::load(&path)?;
    Ok(Arc::new(factory))
}

#[cfg(not(feature = "vosk"))]
fn load_decoder(_config: &VoiceConfig) -> anyhow::Result<Arc<dyn DecoderFactory>> {
    anyhow::bail!("turntalk was built without a speech decoder; rebuild with `--features vosk`")
}
