//! Relay server binary entry point
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (127.0.0.1:5000)
//! PROVIDER_API_KEY=... GEMINI_API_KEY=... cargo run -p avatarlink-relay-server
//!
//! # Custom address, JSON logs
//! RELAY_BIND_ADDRESS="0.0.0.0:5000" RUST_LOG=debug \
//!   cargo run -p avatarlink-relay-server -- --log-json
//! ```
//!
//! # Environment Variables
//!
//! - `RELAY_BIND_ADDRESS`: Server bind address (default: `127.0.0.1:5000`)
//! - `PROVIDER_API_KEY`, `PROVIDER_BASE_URL`, `AVATAR_IMAGE_URL`: avatar provider
//! - `GEMINI_API_KEY`, `GEMINI_MODEL`: text generation
//! - `SPEECH_API_KEY`, `STT_LANGUAGE`: speech-to-text
//! - `RUST_LOG`: Logging level (default: `info`)

use anyhow::Context;
use avatarlink_relay::{RelayArgs, RelayConfig, RelayServer};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    let args = RelayArgs::parse();
    init_tracing(args.log_json);

    let config = RelayConfig::try_from(args).context("invalid relay configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.bind_address,
        provider = %config.provider_base_url,
        model = %config.gemini_model,
        "AvatarLink relay starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .thread_name("avatarlink-relay")
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let server = RelayServer::new(config).context("failed to create relay server")?;
        server
            .serve(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("Ctrl+C received, shutting down");
            })
            .await
            .context("relay server error")
    })?;

    info!("Relay shutdown complete");
    Ok(())
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing already initialized: {e}");
    }
}
