//! `parley` - HTTP relay keeping short-lived chat histories per client id.
//!
//! Loads configuration from the environment (and `.env`), sets up logging,
//! and serves the relay until Ctrl-C.

use anyhow::Context;
use parley_core::{LogFormat, ParleyConfig};
use parley_llm::OpenAiClient;
use parley_server::{app_with_state, state::AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ParleyConfig::from_env().context("invalid configuration")?;
    init_tracing(config.log_format);

    let generator = Arc::new(OpenAiClient::from_config(&config.generation));
    let state = AppState::new(&config, generator);
    let app = app_with_state(state);

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(
        addr = %addr,
        model = %config.generation.model,
        backend = %config.generation.base_url,
        style = ?config.response.style,
        inactivity_window_ms = config.session.inactivity_window_ms,
        rate_limited = config.session.access_key.is_some(),
        "Server is running"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("Server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Pretty => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
