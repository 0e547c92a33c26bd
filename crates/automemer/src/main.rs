//! automemer - subreddit meme curator for Slack
//!
//! Scrapes watched subreddits on a schedule, stages the posts, and releases
//! the ones that clear their upvote threshold into a Slack channel, taking
//! turns between subs. Settings are edited from chat by mentioning the bot.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod bot;
mod cli;
mod commands;
mod config;
mod scheduler;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::from_default_env()
        .add_directive("automemer=info".parse()?)
        .add_directive("automemer_core=info".parse()?);
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    // Load configuration
    let config = config::Config::load()?;

    // Execute command
    match cli.action() {
        Commands::Run { dry_run } => commands::run::execute(&config, dry_run).await,
        Commands::Scrape { progress } => commands::scrape::execute(&config, progress).await,
        Commands::Settings => commands::settings::execute(&config),
        Commands::Version => {
            println!("automemer {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
