//! Durable archive interface.
//!
//! The archive records every meme ever seen, keyed by source id, with its
//! score high-water mark and publish status. Several ids may share one
//! content URL (cross-posts).

use crate::error::Result;
use crate::types::MemeRecord;
use chrono::{DateTime, Utc};

/// Storage backend for archived memes.
pub trait MemeArchive: Send + Sync {
    /// Get a meme by source id.
    fn get(&self, id: &str) -> Result<Option<MemeRecord>>;

    /// All memes sharing a content URL.
    fn find_by_url(&self, url: &str) -> Result<Vec<MemeRecord>>;

    /// Insert a meme that has never been seen before.
    fn insert(&self, meme: &MemeRecord) -> Result<()>;

    /// Persist an observation: score, ratio, high-water mark, publish flag
    /// and timestamp.
    ///
    /// The stored high-water mark never decreases and a published meme stays
    /// published, even when `meme` was read before a concurrent write.
    /// Returns the record as stored.
    fn update(&self, meme: &MemeRecord) -> Result<MemeRecord>;

    /// Flip the publish flag for one id.
    fn mark_published(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Whether any meme sharing this URL has been published.
    fn url_published(&self, url: &str) -> Result<bool> {
        Ok(self.find_by_url(url)?.iter().any(|m| m.published))
    }
}
