//! Command implementations for the automemer CLI.
//!
//! Each submodule implements one subcommand.

pub mod run;
pub mod scrape;
pub mod settings;

use crate::config::Config;
use anyhow::{Context, Result};
use automemer_core::source::RedditClient;
use automemer_core::{Database, SettingsStore, StagingStore};
use std::sync::Arc;

/// The on-disk stores every subcommand works against.
pub struct Stores {
    pub settings: Arc<SettingsStore>,
    pub staging: Arc<StagingStore>,
    pub archive: Arc<Database>,
}

/// Create the data directory and open (or create) all three stores.
pub fn open_stores(config: &Config) -> Result<Stores> {
    config.ensure_dirs()?;

    let settings = Arc::new(SettingsStore::new(config.settings_path()));
    settings
        .ensure_exists()
        .context("Failed to initialise settings")?;

    let staging = Arc::new(StagingStore::new(config.staging_path()));
    staging
        .ensure_exists()
        .context("Failed to initialise staging")?;

    let archive_path = config.archive_path();
    let archive = Arc::new(
        Database::open(&archive_path)
            .with_context(|| format!("Failed to open archive {}", archive_path.display()))?,
    );

    Ok(Stores {
        settings,
        staging,
        archive,
    })
}

pub fn reddit_client(config: &Config) -> Result<RedditClient> {
    RedditClient::with_base_url(&config.reddit.base_url, &config.reddit.user_agent)
        .context("Failed to build Reddit client")
}
