use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use euaitalk::api::ApiServerBuilder;
use euaitalk::client::health::HEALTH_PROBE_INTERVAL;
use euaitalk::client::{
    AppState, AudioSource, FileAudioSource, FileStorage, HttpBackend, NoAudio, NoSpeech,
    Orchestrator, Settings, SettingsStore, DEFAULT_BACKEND_URL,
};
use euaitalk::shell::{render_fallback_page, BuildFlavor, FallbackCause, LoadError};
use euaitalk::{config, Config, Persona};

/// EuAiTalk - voice chat gateway and client
#[derive(Parser)]
#[command(name = "euaitalk", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Client settings file
    #[arg(long, env = "EUAITALK_SETTINGS", global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default)
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT")]
        port: Option<u16>,

        /// Directory with the web app shell
        #[arg(long, env = "EUAITALK_STATIC_DIR")]
        static_dir: Option<PathBuf>,
    },
    /// Validate the gateway environment without starting it
    CheckConfig,
    /// Run one conversation turn against a running gateway
    Talk {
        /// Recorded WAV file to send instead of the microphone
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Skip transcription and send this text
        #[arg(short, long, conflicts_with = "input")]
        text: Option<String>,

        /// Persona for this turn (defaults to the saved setting)
        #[arg(short, long)]
        persona: Option<Persona>,

        /// Gateway origin (defaults to the saved setting)
        #[arg(long)]
        backend: Option<String>,
    },
    /// Show or change client settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Print the mobile shell's fallback page
    FallbackPage {
        /// What went wrong
        #[arg(long, value_enum, default_value = "connect")]
        cause: CauseArg,

        /// Render the release variant
        #[arg(long)]
        release: bool,

        /// Server URL shown on the page
        #[arg(long, default_value = DEFAULT_BACKEND_URL)]
        url: String,

        /// Status code for `--cause http`
        #[arg(long, default_value = "500")]
        status: u16,
    },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print current settings as JSON
    Show,
    /// Change one or more settings
    Set {
        #[arg(long)]
        speech_rate: Option<f32>,
        #[arg(long)]
        speech_pitch: Option<f32>,
        #[arg(long)]
        persona: Option<Persona>,
        #[arg(long)]
        autoplay: Option<bool>,
        /// Gateway origin; pass "" to use the default
        #[arg(long)]
        backend_url: Option<String>,
    },
    /// Restore defaults
    Reset,
}

#[derive(Clone, Copy, ValueEnum)]
enum CauseArg {
    HostLookup,
    Connect,
    Timeout,
    Http,
    Blank,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,euaitalk=info",
        1 => "info,euaitalk=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings_path = cli.settings.unwrap_or_else(FileStorage::default_path);

    match cli.command.unwrap_or(Command::Serve {
        port: None,
        static_dir: None,
    }) {
        Command::Serve { port, static_dir } => serve(port, static_dir).await,
        Command::CheckConfig => check_config(),
        Command::Talk {
            input,
            text,
            persona,
            backend,
        } => talk(settings_path, input, text, persona, backend).await,
        Command::Settings { action } => settings(settings_path, action),
        Command::FallbackPage {
            cause,
            release,
            url,
            status,
        } => {
            fallback_page(cause, release, &url, status);
            Ok(())
        }
    }
}

async fn serve(port: Option<u16>, static_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let mut builder = ApiServerBuilder::from_config(config);
    if let Some(port) = port {
        builder = builder.port(port);
    }
    if static_dir.is_some() {
        builder = builder.static_dir(static_dir);
    }

    let server = builder.build()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting EuAiTalk gateway");

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }
    Ok(())
}

fn check_config() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    println!("Configuration OK");
    println!("  STT endpoint:  {}", config.upstream.stt_endpoint);
    println!("  STT model:     {}", config.upstream.stt_model);
    println!("  Chat endpoint: {}", config.upstream.chat_endpoint);
    println!("  Chat model:    {}", config.upstream.chat_model);
    println!("  Port:          {}", config.port);
    match &config.static_dir {
        Some(dir) => println!("  Static files:  {}", dir.display()),
        None => println!("  Static files:  (none)"),
    }
    println!(
        "  Required:      {}",
        config::REQUIRED_VARS.join(", ")
    );
    Ok(())
}

async fn talk(
    settings_path: PathBuf,
    input: Option<PathBuf>,
    text: Option<String>,
    persona: Option<Persona>,
    backend: Option<String>,
) -> anyhow::Result<()> {
    let store = SettingsStore::load(Box::new(FileStorage::new(settings_path)));
    let persona = persona.unwrap_or(store.get().persona);
    let origin = backend.unwrap_or_else(|| store.get().backend_url(DEFAULT_BACKEND_URL).to_string());
    let backend = HttpBackend::new(&origin)?;
    tracing::debug!(backend = backend.base_url(), %persona, "starting turn");

    let audio = audio_source(input, text.is_some())?;

    let mut orchestrator =
        Orchestrator::new(AppState::new(store), Box::new(backend), audio, Box::new(NoSpeech));
    let availability = orchestrator.startup().await;
    println!("{availability}");

    if let Some(text) = text {
        let reply = orchestrator.request_reply(&text, persona).await?;
        println!("{reply}");
        return Ok(());
    }

    orchestrator.start_capture().await?;
    println!("Aufnahme läuft... Enter zum Stoppen");
    orchestrator
        .probe_while(HEALTH_PROBE_INTERVAL, wait_for_enter())
        .await?;
    let turn = orchestrator.stop_capture().await?;

    println!("Du: {}", turn.transcript);
    println!("KI: {}", turn.reply);
    for indicator in orchestrator.state().rate_limits.indicators() {
        println!("{indicator}");
    }
    Ok(())
}

/// Pick the capture source; text-only turns never touch the microphone
fn audio_source(input: Option<PathBuf>, text_only: bool) -> anyhow::Result<Box<dyn AudioSource>> {
    match input {
        _ if text_only => Ok(Box::new(NoAudio)),
        Some(path) => Ok(Box::new(FileAudioSource::new(path))),
        None => microphone(),
    }
}

#[cfg(feature = "microphone")]
#[allow(clippy::unnecessary_wraps)]
fn microphone() -> anyhow::Result<Box<dyn AudioSource>> {
    Ok(Box::new(euaitalk::client::Microphone::new()))
}

#[cfg(not(feature = "microphone"))]
fn microphone() -> anyhow::Result<Box<dyn AudioSource>> {
    anyhow::bail!("built without microphone support; pass --input <file.wav> or --text")
}

async fn wait_for_enter() -> anyhow::Result<()> {
    use tokio::io::AsyncBufReadExt;

    let mut line = String::new();
    tokio::io::BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;
    Ok(())
}

fn settings(path: PathBuf, action: SettingsAction) -> anyhow::Result<()> {
    let mut store = SettingsStore::load(Box::new(FileStorage::new(path)));

    match action {
        SettingsAction::Show => {}
        SettingsAction::Set {
            speech_rate,
            speech_pitch,
            persona,
            autoplay,
            backend_url,
        } => {
            let current = store.get().clone();
            let updated = Settings {
                speech_rate: speech_rate.unwrap_or(current.speech_rate),
                speech_pitch: speech_pitch.unwrap_or(current.speech_pitch),
                persona: persona.unwrap_or(current.persona),
                autoplay_reply: autoplay.unwrap_or(current.autoplay_reply),
                backend_endpoint: backend_url.unwrap_or(current.backend_endpoint),
            };
            if !updated.backend_endpoint.trim().is_empty() {
                HttpBackend::new(&updated.backend_endpoint)?;
            }
            store.save(updated)?;
        }
        SettingsAction::Reset => store.reset()?,
    }

    println!("{}", serde_json::to_string_pretty(store.get())?);
    Ok(())
}

fn fallback_page(cause: CauseArg, release: bool, url: &str, status: u16) {
    let cause = match cause {
        CauseArg::HostLookup => FallbackCause::Network(LoadError::HostLookup),
        CauseArg::Connect => FallbackCause::Network(LoadError::Connect),
        CauseArg::Timeout => FallbackCause::Network(LoadError::Timeout),
        CauseArg::Http => FallbackCause::Http {
            status,
            reason: reqwest::StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or_default()
                .to_string(),
        },
        CauseArg::Blank => FallbackCause::Blank,
    };
    let flavor = if release {
        BuildFlavor::Release
    } else {
        BuildFlavor::Debug
    };

    print!(
        "{}",
        render_fallback_page(&cause, flavor, url, env!("CARGO_PKG_VERSION"))
    );
}
