//! The delivery loop.
//!
//! One cooperative loop per connection. Each tick it:
//!
//! 1. polls inbound chat events and dispatches the ones addressed to the bot
//! 2. reaps a finished background ingestion, if any
//! 3. starts an ingestion task when the scrape job is due
//! 4. runs a release cycle when the publish job is due
//! 5. delivers at most one queued outbound message
//!
//! then sleeps for the tick interval. Losing the chat connection drops back
//! to the connect step; any other error is logged and the loop carries on.

use crate::scheduler::{Job, Scheduler};
use anyhow::{Context, Result, bail};
use automemer_core::archive::MemeArchive;
use automemer_core::chat::{self, ChatPlatform, UserDirectory};
use automemer_core::source::ContentSource;
use automemer_core::{
    CommandInterpreter, Disposition, IngestReport, Ingestor, OutboundMessage, OutboxReceiver,
    ReleaseEngine, Settings, SettingsStore, StagingStore, outbox,
};
use chrono::{Local, NaiveDateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Posted when a user kills the bot
pub const KILL_FAREWELL: &str = "have it your way";

/// Posted on a graceful shutdown
pub const SHUTDOWN_FAREWELL: &str = "exiting gracefully";

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// A user sent `kill`
    Killed,
    /// The shutdown signal fired
    Interrupted,
}

/// The pipeline components the loop drives, wired to one outbox.
pub struct Services {
    pub settings: Arc<SettingsStore>,
    pub ingestor: Ingestor,
    pub release: Arc<ReleaseEngine>,
    pub interpreter: CommandInterpreter,
}

impl Services {
    /// Wire ingestion, release and the command interpreter together.
    ///
    /// Released memes and notices go to `channel`.
    pub fn new(
        settings: Arc<SettingsStore>,
        staging: Arc<StagingStore>,
        archive: Arc<dyn MemeArchive>,
        source: Arc<dyn ContentSource>,
        channel: &str,
    ) -> (Self, OutboxReceiver) {
        let (tx, rx) = outbox::channel();
        let ingestor = Ingestor::new(source, archive.clone(), settings.clone(), staging.clone());
        let release = Arc::new(ReleaseEngine::new(
            settings.clone(),
            staging,
            archive,
            tx.clone(),
            channel,
        ));
        let interpreter = CommandInterpreter::new(settings.clone(), release.clone(), ingestor.clone(), tx);

        (
            Self {
                settings,
                ingestor,
                release,
                interpreter,
            },
            rx,
        )
    }
}

/// Delivery loop settings
#[derive(Debug, Clone)]
pub struct BotOptions {
    /// The bot's user id; `<@bot_id>` marks a command
    pub bot_id: String,
    pub tick: Duration,
    pub scrape_every_minutes: u32,
    pub dry_run: bool,
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub struct Bot {
    chat: Arc<dyn ChatPlatform>,
    services: Services,
    outbox: OutboxReceiver,
    options: BotOptions,
    scheduler: Scheduler,
    ingestion: Option<JoinHandle<automemer_core::Result<IngestReport>>>,
    users: UserDirectory,
    /// A message whose delivery was cut off by a lost connection
    undelivered: Option<OutboundMessage>,
    /// Set while `settings.json` cannot be read, so the failure is logged once
    settings_unreadable: bool,
    clock: fn() -> NaiveDateTime,
}

impl Bot {
    pub fn new(
        chat: Arc<dyn ChatPlatform>,
        services: Services,
        outbox: OutboxReceiver,
        options: BotOptions,
    ) -> Self {
        Self {
            chat,
            services,
            outbox,
            options,
            scheduler: Scheduler::new(),
            ingestion: None,
            users: UserDirectory::default(),
            undelivered: None,
            settings_unreadable: false,
            clock: local_now,
        }
    }

    /// Use `clock` instead of the local wall clock for scheduling.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    /// Run until a user kills the bot or `shutdown` resolves.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> Result<Exit> {
        tokio::pin!(shutdown);

        loop {
            match self.chat.connect().await {
                Ok(true) => info!("AutoMemer connected and running!"),
                Ok(false) => bail!("Connection failed. Invalid Slack token or bot ID?"),
                Err(e) if e.is_transport_closed() => {
                    warn!("Could not reach the chat platform, retrying: {}", e);
                    tokio::select! {
                        _ = &mut shutdown => return Ok(self.shut_down(Exit::Interrupted).await),
                        _ = tokio::time::sleep(self.options.tick) => continue,
                    }
                }
                Err(e) => return Err(e).context("Failed to connect to the chat platform"),
            }

            self.users = match self.chat.list_users().await {
                Ok(users) => users,
                Err(e) => {
                    warn!("Failed to load the user directory: {}", e);
                    UserDirectory::default()
                }
            };

            loop {
                match self.tick().await {
                    Ok(Disposition::Continue) => {}
                    Ok(Disposition::Shutdown) => return Ok(self.shut_down(Exit::Killed).await),
                    Err(e) if e.is_transport_closed() => {
                        warn!("Chat connection lost, reconnecting: {}", e);
                        break;
                    }
                    Err(e) => error!("Delivery loop error: {}", e),
                }

                tokio::select! {
                    _ = &mut shutdown => return Ok(self.shut_down(Exit::Interrupted).await),
                    _ = tokio::time::sleep(self.options.tick) => {}
                }
            }
        }
    }

    async fn tick(&mut self) -> automemer_core::Result<Disposition> {
        let events = self.chat.poll_events().await?;
        let received_at = Utc::now();
        for mut event in events {
            chat::annotate(&mut event, &self.users, &self.options.bot_id, received_at);
            debug!(
                target: "automemer::events",
                event = %serde_json::to_string(&event).unwrap_or_default(),
                "Inbound event"
            );
            if self.services.interpreter.handle(&event).await == Disposition::Shutdown {
                return Ok(Disposition::Shutdown);
            }
        }

        self.reap_ingestion().await;

        let now = (self.clock)();
        if self
            .scheduler
            .try_fire(Job::Scrape, now, self.options.scrape_every_minutes)
        {
            self.start_ingestion();
        }

        let publish_every = self.publish_interval();
        if self.scheduler.try_fire(Job::Publish, now, publish_every) {
            info!("Publishing memes");
            self.services.release.release_or_notify(None, false);
        }

        self.deliver_one().await?;
        Ok(Disposition::Continue)
    }

    /// The configured publish interval, or the default while the settings
    /// file is unreadable.
    fn publish_interval(&mut self) -> u32 {
        match self.services.settings.load() {
            Ok(settings) => {
                if self.settings_unreadable {
                    info!("Settings readable again");
                    self.settings_unreadable = false;
                }
                settings.publish_interval_minutes
            }
            Err(e) => {
                let fallback = Settings::default().publish_interval_minutes;
                if self.settings_unreadable {
                    debug!("Settings still unreadable: {}", e);
                } else {
                    error!(
                        path = %self.services.settings.path().display(),
                        "Failed to read settings, publishing every {} minutes: {}",
                        fallback,
                        e
                    );
                    self.settings_unreadable = true;
                }
                fallback
            }
        }
    }

    fn start_ingestion(&mut self) {
        if self.ingestion.is_some() {
            warn!("Previous ingestion still running, skipping this scrape");
            return;
        }

        info!("Starting background ingestion");
        let ingestor = self.services.ingestor.clone();
        self.ingestion = Some(tokio::spawn(async move { ingestor.run().await }));
    }

    async fn reap_ingestion(&mut self) {
        if !self.ingestion.as_ref().is_some_and(|task| task.is_finished()) {
            return;
        }
        let Some(task) = self.ingestion.take() else {
            return;
        };

        match task.await {
            Ok(Ok(report)) => info!(%report, "Background ingestion finished"),
            Ok(Err(e)) => error!("Background ingestion failed: {}", e),
            Err(e) => error!("Background ingestion task died: {}", e),
        }
    }

    /// Deliver the oldest queued message, if any.
    async fn deliver_one(&mut self) -> automemer_core::Result<()> {
        let Some(message) = self.undelivered.take().or_else(|| self.outbox.try_recv()) else {
            return Ok(());
        };

        if self.options.dry_run {
            info!(
                channel = %message.channel,
                thread_ts = ?message.thread_ts,
                text = %message.text,
                "Dry run, not posting"
            );
            return Ok(());
        }

        match self.chat.post_message(&message).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transport_closed() => {
                self.undelivered = Some(message);
                Err(e)
            }
            Err(e) => {
                error!(channel = %message.channel, "Failed to post message: {}", e);
                Ok(())
            }
        }
    }

    /// Post the farewell for `exit` straight to the meme channel.
    async fn shut_down(self, exit: Exit) -> Exit {
        let text = match exit {
            Exit::Killed => KILL_FAREWELL,
            Exit::Interrupted => SHUTDOWN_FAREWELL,
        };
        info!(?exit, "Shutting down");

        let farewell = OutboundMessage::new(self.services.release.channel(), text);
        if self.options.dry_run {
            info!(text = %farewell.text, "Dry run, not posting farewell");
        } else if let Err(e) = self.chat.post_message(&farewell).await {
            warn!("Failed to post farewell: {}", e);
        }
        exit
    }
}
