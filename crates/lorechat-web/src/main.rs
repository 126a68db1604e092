//! lorechat web server
//!
//! Serves the role-play chat page on the configured address. Startup halts
//! if no API key can be found or the Claude client cannot be built.

mod routes;
mod view;

use anyhow::{Context, Result};
use lorechat_core::{resolve_api_key, ChatSession, ClaudeClient, Config, SecretSources};
use routes::AppState;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use view::PageRenderer;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %format!("{:#}", e), "lorechat stopped");
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "could not read config file, using defaults");
            Config::new()
        })
        .with_env_overrides();

    let api_key = resolve_api_key(&SecretSources::default())?;
    let client = ClaudeClient::with_base_url(&api_key, config.api_base_url())
        .context("❌ Failed to connect to the API")?;
    tracing::info!("✅ API client ready");

    let session = ChatSession::open(config.data_paths(), config.completion_settings())?;
    let state = AppState::new(session, Arc::new(client), PageRenderer::new()?);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;
    tracing::info!(addr = %config.bind_addr(), data_dir = %config.data_dir().display(), "lorechat listening");

    axum::serve(listener, app).await?;
    Ok(())
}
