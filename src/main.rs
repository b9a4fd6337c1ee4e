use anyhow::{Context, Result};
use clap::Parser;
use speech_relay::{
    create_router, AppState, Config, JsonlTranscriptStore, RecognizerBackend, RemoteRecognizer,
    SessionLifecycleCoordinator, SessionRegistry, StreamParams, TranscriptStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "speech-relay", about = "Streams client audio to a speech recognizer")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(long, default_value = "config/speech-relay")]
    config: String,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = Config::load(&args.config).context("Failed to load configuration")?;
    if let Some(port) = args.port {
        cfg.service.http.port = port;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Recognizer endpoint: {}", cfg.recognizer.url);
    info!(
        "Heartbeat every {}s, timeout {}s, max retries {}",
        cfg.relay.heartbeat_interval_secs,
        cfg.relay.heartbeat_timeout_secs,
        cfg.relay.max_retry_attempts
    );

    let backend: Arc<dyn RecognizerBackend> = Arc::new(
        RemoteRecognizer::new(cfg.recognizer.clone())
            .context("Failed to create recognizer client")?,
    );
    let registry = Arc::new(SessionRegistry::new(
        backend,
        StreamParams::pcm(cfg.recognizer.sample_rate),
    ));
    let coordinator = Arc::new(SessionLifecycleCoordinator::new(registry));
    let store: Arc<dyn TranscriptStore> = Arc::new(
        JsonlTranscriptStore::open(&cfg.store.path)
            .await
            .context("Failed to open transcript store")?,
    );

    let state = AppState::new(coordinator, store, &cfg.relay);
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
