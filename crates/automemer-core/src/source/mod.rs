//! Upstream content source (subreddits and their posts).

#[cfg(feature = "client")]
pub mod reddit;

#[cfg(feature = "client")]
pub use reddit::RedditClient;

use crate::error::Result;
use crate::types::SourcePost;
use async_trait::async_trait;

/// Read access to the upstream content source.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Up to `limit` "hot" posts from a sub.
    async fn fetch_hot(&self, sub: &str, limit: u32) -> Result<Vec<SourcePost>>;

    /// Whether a sub is marked adult-only.
    ///
    /// Fails with `Error::Forbidden` when the sub is private or quarantined.
    async fn is_adult(&self, sub: &str) -> Result<bool>;

    /// Fetch a single post by id.
    async fn fetch_by_id(&self, id: &str) -> Result<SourcePost>;
}
