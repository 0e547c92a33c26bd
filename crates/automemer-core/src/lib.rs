//! automemer-core - Core library for AutoMemer
//!
//! This crate holds everything the bot binary drives:
//!
//! - **settings**: Watched subs, thresholds and publish interval (`settings.json`)
//! - **staging**: Memes collected but not yet released (`scraped.json`)
//! - **archive** / **db**: Durable record of every meme seen (SQLite)
//! - **source**: Content source trait and Reddit client
//! - **chat**: Chat platform trait and Slack client
//! - **pipeline**: Ingestion and round-robin release
//! - **command**: Chat command grammar and handlers
//! - **outbox**: Outbound message queue

pub mod archive;
pub mod chat;
pub mod command;
pub mod error;
pub mod outbox;
pub mod pipeline;
pub mod settings;
pub mod source;
pub mod staging;
pub mod types;

mod persist;

#[cfg(feature = "db")]
pub mod db;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export commonly used types
pub use archive::MemeArchive;
pub use chat::{ChatPlatform, UserDirectory};
pub use command::{CommandInterpreter, Disposition};
pub use error::{Error, Result};
pub use outbox::{Outbox, OutboxReceiver};
pub use pipeline::{IngestReport, Ingestor, ReleaseEngine};
pub use settings::{Settings, SettingsStore};
pub use source::ContentSource;
pub use staging::StagingStore;
pub use types::{ChatEvent, MemeRecord, OutboundMessage, SourcePost};

#[cfg(feature = "db")]
pub use db::Database;
