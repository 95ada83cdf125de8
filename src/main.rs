mod agent;
mod config;
mod llm;
mod memory;
mod platform;
mod search;
mod tools;
mod webhook;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::memory::HistoryStore;
use crate::webhook::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Local runs keep secrets in .env; a missing file is fine
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaybot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // `relaybot [--init-db] [config.toml]`
    let mut init_db_only = false;
    let mut config_path = PathBuf::from("config.toml");
    for arg in std::env::args().skip(1) {
        if arg == "--init-db" {
            init_db_only = true;
        } else {
            config_path = PathBuf::from(arg);
        }
    }

    info!("Loading configuration from: {}", config_path.display());

    if init_db_only {
        let config = Config::read(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
        let path = config
            .memory
            .database_path
            .context("--init-db needs HISTORY_DB_PATH or memory.database_path")?;
        HistoryStore::open(&path)?;
        info!("History schema ready in {}", path.display());
        return Ok(());
    }

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Provider: {}", config.llm.provider);
    info!("  Model: {}", config.llm.model);
    info!("  Max tokens: {}", config.llm.max_tokens);
    info!("  Chat filter: {:?}", config.telegram.chat_filter);
    info!(
        "  Webhook secret: {}",
        if config.telegram.webhook_secret().is_some() { "set" } else { "not set" }
    );
    info!(
        "  Web search: {}",
        if config.search.is_enabled() { "enabled" } else { "disabled" }
    );

    if let Some(path) = &config.memory.database_path {
        HistoryStore::open(path)?;
    }

    let addr = config.server.bind_address();
    let state = Arc::new(AppState::new(config)?);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Listening on {}", addr);

    axum::serve(listener, webhook::router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
