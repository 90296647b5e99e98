use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use jarvis_assistant::agent::ChatCompletionsClient;
use jarvis_assistant::voice::{
    Microphone, PhraseSpotter, Player, SpeechToText, TextToSpeech, Transcriber, VoiceOutput,
};
use jarvis_assistant::{
    ActionRegistry, Collaborators, Config, Dispatcher, Error, ReplyStrategy, Session,
};

/// Jarvis - a voice-driven personal assistant
#[derive(Parser)]
#[command(name = "jarvis", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/jarvis/config.toml)
    #[arg(short, long, env = "JARVIS_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// How tools are offered to the reasoning service (plain, json, function)
    #[arg(long)]
    strategy: Option<ReplyStrategy>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,jarvis_assistant=info",
        1 => "info,jarvis_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref()).map_err(fatal)?;
    if let Some(strategy) = cli.strategy {
        config.reasoning.strategy = strategy;
    }
    tracing::debug!(?config, "loaded configuration");

    let mut session = build_session(&config).map_err(fatal)?;

    tracing::info!(
        "jarvis ready - say \"{}\"",
        config.phrases.wake.first().map_or("", String::as_str)
    );

    session
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

/// Acquire every collaborator; anything built before a failure is dropped
/// (and so released) on the way out
fn build_session(config: &Config) -> jarvis_assistant::Result<Session> {
    let keys = &config.api_keys;
    let voice = &config.voice;

    let stt_key = keys.stt(voice.stt_provider).unwrap_or_default().to_string();
    let transcriber: Arc<dyn Transcriber> = Arc::new(SpeechToText::new(
        voice.stt_provider,
        stt_key,
        voice.stt_model(),
    )?);

    // The wake engine gets its own credential when one is configured
    let wake_transcriber: Arc<dyn Transcriber> = match &keys.wake {
        Some(key) => Arc::new(SpeechToText::new(
            voice.stt_provider,
            key.clone(),
            voice.stt_model(),
        )?),
        None => Arc::clone(&transcriber),
    };

    let llm_key = keys.llm.clone().unwrap_or_default();
    let reasoning = ChatCompletionsClient::new(
        &config.reasoning.url,
        llm_key,
        config.reasoning.model.clone(),
        config.reasoning.timeout,
    )?
    .with_max_tokens(config.reasoning.max_tokens)
    .with_retry(config.reasoning.retry_policy());

    let registry = ActionRegistry::with_builtin_actions();
    tracing::debug!(tools = ?registry.names(), "registered tools");

    let dispatcher = Dispatcher::new(
        Arc::new(reasoning),
        registry,
        config.reasoning.strategy,
        &config.reasoning.assistant_name,
        config.phrases.unknown_tool.clone(),
    );

    let tts_key = keys.tts(voice.tts_provider).unwrap_or_default().to_string();
    let tts = TextToSpeech::new(
        voice.tts_provider,
        tts_key,
        voice.tts_voice(),
        voice.tts_model(),
        voice.tts_speed,
    )?;
    let player = Player::open(voice.player.as_deref())?;
    let speech = VoiceOutput::new(tts, player);

    let audio = &config.audio;
    let mut microphone = Microphone::new(audio.sample_rate, audio.frame_size)?;
    microphone.start()?;

    let detector = PhraseSpotter::new(
        config.phrases.wake.clone(),
        wake_transcriber,
        audio.wake_energy_threshold,
        audio.sample_rate,
    );

    Ok(Session::new(
        config.phrases.clone(),
        audio.vad_settings(),
        Collaborators {
            source: Box::new(microphone),
            detector: Box::new(detector),
            transcriber,
            speech: Box::new(speech),
        },
        dispatcher,
    ))
}

/// Startup failures are all fatal
fn fatal(e: Error) -> Error {
    match e {
        Error::FatalInit(_) => e,
        other => Error::FatalInit(other.to_string()),
    }
}
