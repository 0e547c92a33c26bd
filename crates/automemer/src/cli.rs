//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};

/// AutoMemer - scrapes subreddits and curates memes into a Slack channel
#[derive(Parser, Debug)]
#[command(name = "automemer")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "AUTOMEMER_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot: scrape, release and answer chat commands (default)
    Run {
        /// Log outbound messages instead of posting them
        #[arg(long)]
        dry_run: bool,
    },

    /// Run one ingestion pass and exit
    Scrape {
        /// Show a progress bar over the watched subs
        #[arg(long)]
        progress: bool,
    },

    /// Print the current runtime settings
    Settings,

    /// Show version information
    Version,
}

impl Cli {
    /// The subcommand to run; a bare `automemer` runs the bot.
    pub fn action(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or(Commands::Run { dry_run: false })
    }
}
