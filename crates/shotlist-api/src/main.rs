//! shotlist API server binary.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shotlist_core::defaults;
use shotlist_inference::transcription::WhisperBackend;
use shotlist_inference::{EmbeddingBackend, OllamaBackend, TranscriptionBackend};
use shotlist_jobs::WorkerConfig;

use shotlist_api::{bootstrap, build_router};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug"));

    let format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let embedder: Arc<dyn EmbeddingBackend> = Arc::new(OllamaBackend::from_env());
    info!(model = embedder.model_name(), "Embedding backend configured");

    let transcriber: Option<Arc<dyn TranscriptionBackend>> = match WhisperBackend::from_env() {
        Some(backend) => {
            info!(model = backend.model_name(), "Transcription backend configured");
            Some(Arc::new(backend) as Arc<dyn TranscriptionBackend>)
        }
        None => {
            info!("No transcription backend configured; transcript stage will be skipped for audio");
            None
        }
    };

    let (state, worker) = bootstrap(embedder, transcriber, WorkerConfig::from_env());
    let app = build_router(state);

    let port = std::env::var(defaults::ENV_SERVER_PORT)
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(defaults::SERVER_PORT);
    let addr = format!("0.0.0.0:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "shotlist API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    worker.shutdown().await.ok();
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
