//! Configuration management for automemer.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (`AUTOMEMER_DIR`, `BOT_ID`, `MEME_SPAM_CHANNEL`,
//!    `SLACK_BOT_TOKEN`, `AUTOMEMER_USER_AGENT`)
//! 2. Config file (`$AUTOMEMER_DIR/config.toml`, default `~/.automemer/config.toml`)
//! 3. Default values
//!
//! This is the process configuration. The runtime settings edited from chat
//! (subs, thresholds, publish interval) live in `settings.json` under the
//! data directory.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Slack connection
    #[serde(default)]
    pub slack: SlackConfig,

    /// Reddit access
    #[serde(default)]
    pub reddit: RedditConfig,

    /// Delivery loop settings
    #[serde(default)]
    pub bot: BotConfig,

    /// Paths
    #[serde(default)]
    pub paths: PathsConfig,

    /// Directory the config file was looked up in
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlackConfig {
    /// User id of the bot; messages mentioning `<@bot_id>` are commands
    pub bot_id: Option<String>,

    /// Channel the bot listens in and posts memes to
    pub channel: Option<String>,

    /// Bot token (`xoxb-...`)
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedditConfig {
    /// Reddit origin
    #[serde(default = "default_reddit_url")]
    pub base_url: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Delay between delivery loop ticks in milliseconds
    #[serde(default = "default_tick_millis")]
    pub tick_millis: u64,

    /// Scrape whenever minutes since midnight is a multiple of this
    #[serde(default = "default_scrape_every")]
    pub scrape_every_minutes: u32,

    /// Log outbound messages instead of posting them
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where settings, staging and the archive are kept (default: the
    /// config directory)
    pub data_dir: Option<PathBuf>,
}

/// Everything needed to talk to Slack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackCredentials {
    pub token: String,
    pub bot_id: String,
    pub channel: String,
}

// Default value functions
fn default_reddit_url() -> String {
    automemer_core::source::reddit::DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("automemer/{} (Slack meme bot)", env!("CARGO_PKG_VERSION"))
}

fn default_tick_millis() -> u64 {
    1000
}

fn default_scrape_every() -> u32 {
    10
}

fn default_base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".automemer")
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            base_url: default_reddit_url(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            tick_millis: default_tick_millis(),
            scrape_every_minutes: default_scrape_every(),
            dry_run: false,
        }
    }
}

impl Config {
    /// Load configuration from the process environment and config file.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration using `env` to look up environment variables.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_dir = env("AUTOMEMER_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_base_dir);
        let config_path = base_dir.join("config.toml");

        let mut config: Config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?
        } else {
            Config::default()
        };
        config.base_dir = base_dir;

        if let Some(bot_id) = env("BOT_ID") {
            config.slack.bot_id = Some(bot_id);
        }
        if let Some(channel) = env("MEME_SPAM_CHANNEL") {
            config.slack.channel = Some(channel);
        }
        if let Some(token) = env("SLACK_BOT_TOKEN") {
            config.slack.token = Some(token);
        }
        if let Some(user_agent) = env("AUTOMEMER_USER_AGENT") {
            config.reddit.user_agent = user_agent;
        }

        Ok(config)
    }

    /// Directory holding settings, staging and the archive.
    pub fn data_dir(&self) -> &Path {
        self.paths.data_dir.as_deref().unwrap_or(&self.base_dir)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir().join("settings.json")
    }

    pub fn staging_path(&self) -> PathBuf {
        self.data_dir().join("scraped.json")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.data_dir().join("memes.sqlite3")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(self.data_dir()).context("Failed to create data directory")?;
        Ok(())
    }

    /// Slack token, bot id and channel, all of which the bot requires.
    pub fn slack_credentials(&self) -> Result<SlackCredentials> {
        let Some(token) = self.slack.token.clone().filter(|t| !t.is_empty()) else {
            bail!("Slack token missing: set SLACK_BOT_TOKEN or [slack] token");
        };
        let Some(bot_id) = self.slack.bot_id.clone().filter(|b| !b.is_empty()) else {
            bail!("Bot id missing: set BOT_ID or [slack] bot_id");
        };
        let Some(channel) = self.slack.channel.clone().filter(|c| !c.is_empty()) else {
            bail!("Meme channel missing: set MEME_SPAM_CHANNEL or [slack] channel");
        };
        Ok(SlackCredentials {
            token,
            bot_id,
            channel,
        })
    }
}
