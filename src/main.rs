mod bot;
mod config;
mod mention;
mod registry;
mod storage;
mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;
use crate::registry::Registry;
use crate::storage::JsonFileStore;
use crate::sync::GitSync;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mentionbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Member store: {}", config.storage.members_file.display());
    info!("  Sync enabled: {}", config.sync.enabled);

    // Best-effort: fetch the latest member store before serving
    let git_sync = GitSync::new(&config.sync, &config.storage.members_file);
    if let Err(e) = git_sync.pull().await {
        warn!("Startup sync pull failed, continuing with local store: {:#}", e);
    }

    let registry = Registry::new(Box::new(JsonFileStore::new(
        config.storage.members_file.clone(),
    )));
    let state = Arc::new(AppState::new(config, registry, git_sync));

    info!("Bot is starting...");
    bot::run(state.clone()).await?;

    // Best-effort: persist any member store changes before exiting
    match state.sync.push_if_changed().await {
        Ok(true) => info!("Member store changes pushed on shutdown"),
        Ok(false) => info!("No member store changes to push"),
        Err(e) => warn!("Shutdown sync push failed: {:#}", e),
    }

    Ok(())
}
