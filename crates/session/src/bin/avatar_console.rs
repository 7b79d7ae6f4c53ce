//! Interactive avatar console
//!
//! Terminal front end for an avatar session: prints status, chat and media
//! notifications, and sends typed lines (or recorded audio files) as turns.
//!
//! # Usage
//!
//! ```bash
//! # Relay running locally on port 5000
//! cargo run --bin avatar-console -- --relay-url http://127.0.0.1:5000
//!
//! # Connect immediately, JSON logs on stderr
//! AVATAR_AUTO_CONNECT=true RUST_LOG=avatarlink_session=debug \
//!   cargo run --bin avatar-console -- --log-json
//! ```
//!
//! Commands: `/connect`, `/destroy`, `/audio <file>`, `/status`, `/help`,
//! `/quit`. Any other line is sent as text input.

use anyhow::Context;
use avatarlink_session::{
    AudioClip, RelayAgentClient, RelaySignalingClient, SessionConfig, SessionController,
    SessionEvent, SpeechOutcome, StatusLevel, TurnInput, TurnProcessor, WebRtcTransportFactory,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// AvatarLink console
///
/// Talk to a streaming avatar through the relay backend.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay backend URL
    #[arg(long, default_value = "http://127.0.0.1:5000", env = "AVATAR_RELAY_URL")]
    relay_url: String,

    /// Relay request timeout in seconds
    #[arg(long, default_value_t = 30, env = "AVATAR_REQUEST_TIMEOUT")]
    request_timeout_secs: u64,

    /// Submit the SDP answer without waiting for ICE gathering
    #[arg(long, env = "AVATAR_NO_ICE_WAIT")]
    no_ice_wait: bool,

    /// Upper bound on the ICE gathering wait in milliseconds
    #[arg(long, default_value_t = 5000, env = "AVATAR_ICE_GATHERING_TIMEOUT_MS")]
    ice_gathering_timeout_ms: u64,

    /// Connect as soon as the console starts
    #[arg(long, env = "AVATAR_AUTO_CONNECT")]
    auto_connect: bool,

    /// Emit logs as JSON
    #[arg(long, env = "AVATAR_LOG_JSON")]
    log_json: bool,
}

fn build_config_from_args(args: &Args) -> anyhow::Result<SessionConfig> {
    let ice_wait = (!args.no_ice_wait).then(|| Duration::from_millis(args.ice_gathering_timeout_ms));

    let config = SessionConfig::default()
        .with_relay_url(args.relay_url.clone())
        .with_request_timeout_secs(args.request_timeout_secs)
        .with_ice_gathering_wait(ice_wait);

    config.validate().context("invalid console configuration")?;
    Ok(config)
}

/// One line of console input
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Connect,
    Destroy,
    Status,
    Help,
    Quit,
    Audio(PathBuf),
    Say(String),
    Empty,
    Unknown(String),
}

impl Command {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        if !line.starts_with('/') {
            return Command::Say(line.to_string());
        }

        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        match name {
            "/connect" | "/start" => Command::Connect,
            "/destroy" | "/disconnect" => Command::Destroy,
            "/status" => Command::Status,
            "/help" => Command::Help,
            "/quit" | "/exit" => Command::Quit,
            "/audio" if !rest.is_empty() => Command::Audio(PathBuf::from(rest)),
            other => Command::Unknown(other.to_string()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    init_tracing(args.log_json);

    let config = build_config_from_args(&args)?;
    info!(
        relay_url = %config.relay_url,
        request_timeout_secs = config.request_timeout_secs,
        ice_gathering_wait = ?config.ice_gathering_wait(),
        "avatar console starting"
    );

    let signaling = Arc::new(RelaySignalingClient::new(&config)?);
    let agent = Arc::new(RelayAgentClient::new(&config)?);
    let transports = Arc::new(WebRtcTransportFactory::new(&config));

    let controller = SessionController::with_config(&config, signaling, transports);
    let turns = Arc::new(TurnProcessor::new(controller.clone(), agent));

    let printer = tokio::spawn(print_events(controller.subscribe()));

    print_help();
    if args.auto_connect {
        spawn_connect(&controller);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };

                match Command::parse(&line) {
                    Command::Empty => {}
                    Command::Connect => spawn_connect(&controller),
                    Command::Destroy => controller.destroy().await,
                    Command::Status => print_status(&controller),
                    Command::Help => print_help(),
                    Command::Quit => break,
                    Command::Unknown(name) => println!("unknown command {name}, try /help"),
                    Command::Say(text) => spawn_turn(&turns, TurnInput::Text(text)),
                    Command::Audio(path) => match AudioClip::from_file(&path).await {
                        Ok(clip) => spawn_turn(&turns, TurnInput::Audio(clip)),
                        Err(e) => println!("[error] {e}"),
                    },
                }
            }
        }
    }

    controller.destroy().await;
    printer.abort();
    info!("avatar console stopped");
    Ok(())
}

fn spawn_connect(controller: &SessionController) {
    let controller = controller.clone();
    tokio::spawn(async move {
        if let Err(e) = controller.start().await {
            warn!("session start failed: {}", e);
        }
    });
}

fn spawn_turn(turns: &Arc<TurnProcessor>, input: TurnInput) {
    let turns = Arc::clone(turns);
    tokio::spawn(async move {
        match turns.process(input).await {
            Ok(outcome) if outcome.speech == SpeechOutcome::Skipped => {
                println!("[turn] reply not spoken, media connection is down");
            }
            Ok(_) => {}
            Err(e) => println!("[error] {e}"),
        }
    });
}

async fn print_events(mut events: broadcast::Receiver<SessionEvent>) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::StateChanged { from, to }) => println!("[state] {from} -> {to}"),
            Ok(SessionEvent::Status { level, message }) => {
                let tag = match level {
                    StatusLevel::Info => "status",
                    StatusLevel::Warning => "warning",
                    StatusLevel::Error => "error",
                };
                println!("[{tag}] {message}");
            }
            Ok(SessionEvent::Chat(entry)) => println!("{:>5}: {}", entry.speaker, entry.text),
            Ok(SessionEvent::RenderSource(Some(source))) => {
                let kinds: Vec<&str> = source
                    .tracks
                    .iter()
                    .map(|t| match t.kind {
                        avatarlink_session::transport::TrackKind::Audio => "audio",
                        avatarlink_session::transport::TrackKind::Video => "video",
                    })
                    .collect();
                println!("[media] avatar stream {} ({})", source.stream_id, kinds.join("+"));
            }
            Ok(SessionEvent::RenderSource(None)) => println!("[media] avatar stream closed"),
            Ok(SessionEvent::Transport(snapshot)) => {
                tracing::debug!(connectivity = %snapshot.describe(), "transport update");
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "console fell behind on session events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_status(controller: &SessionController) {
    let session = controller.session();
    println!("state:      {}", session.state);
    println!(
        "stream:     {}",
        session.stream_id().unwrap_or("(none)")
    );
    match controller.transport_connectivity() {
        Some(snapshot) => println!("transport:  {}", snapshot.describe()),
        None => println!("transport:  (none)"),
    }
    if let Some(pending) = session.pending_speech_text {
        println!("pending:    {pending}");
    }
    println!("chat lines: {}", controller.chat().len());
}

fn print_help() {
    println!("commands: /connect  /destroy  /audio <file>  /status  /help  /quit");
    println!("anything else is sent to the agent as text");
}

fn init_tracing(json: bool) {
    // Initialize tracing with EnvFilter for RUST_LOG support
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .try_init();

    if let Err(e) = result {
        eprintln!("tracing already initialized: {e}");
    }
}
