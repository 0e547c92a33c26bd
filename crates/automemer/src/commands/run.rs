//! `automemer run`: the long-running bot.

use super::{open_stores, reddit_client};
use crate::bot::{Bot, BotOptions, Exit, Services};
use crate::config::Config;
use anyhow::{Context, Result};
use automemer_core::chat::SlackClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub async fn execute(config: &Config, dry_run: bool) -> Result<()> {
    let credentials = config.slack_credentials()?;
    let stores = open_stores(config)?;
    let source = Arc::new(reddit_client(config)?);
    let chat = Arc::new(
        SlackClient::new(&credentials.token, &credentials.channel)
            .context("Failed to build Slack client")?,
    );

    let (services, outbox) = Services::new(
        stores.settings,
        stores.staging,
        stores.archive,
        source,
        &credentials.channel,
    );
    let options = BotOptions {
        bot_id: credentials.bot_id,
        tick: Duration::from_millis(config.bot.tick_millis),
        scrape_every_minutes: config.bot.scrape_every_minutes,
        dry_run: dry_run || config.bot.dry_run,
    };
    if options.dry_run {
        info!("Dry run: outbound messages will be logged, not posted");
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    match Bot::new(chat, services, outbox, options).run(shutdown).await? {
        Exit::Killed => info!("Killed from chat"),
        Exit::Interrupted => info!("Interrupted"),
    }
    Ok(())
}
