//! Reddit client over the public JSON listing endpoints.
//!
//! # Usage
//!
//! ```rust,no_run
//! use automemer_core::source::{ContentSource, RedditClient};
//!
//! #[tokio::main]
//! async fn main() -> automemer_core::Result<()> {
//!     let reddit = RedditClient::new("automemer/0.1 (by /u/AutoMemer)")?;
//!     let posts = reddit.fetch_hot("me_irl", 25).await?;
//!     println!("{} posts", posts.len());
//!     Ok(())
//! }
//! ```

use super::ContentSource;
use crate::error::{Error, Result};
use crate::types::SourcePost;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Default Reddit origin
pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";

/// HTTP client for Reddit
#[derive(Clone)]
pub struct RedditClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Thing<RawPost>>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    id: String,
    subreddit: String,
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    over_18: bool,
    #[serde(default)]
    ups: i64,
    #[serde(default)]
    upvote_ratio: f64,
    #[serde(default)]
    author: Option<String>,
    created_utc: f64,
}

#[derive(Debug, Deserialize)]
struct AboutSub {
    #[serde(default)]
    over18: bool,
}

impl RawPost {
    fn into_post(self) -> SourcePost {
        let created_utc =
            DateTime::<Utc>::from_timestamp(self.created_utc as i64, 0).unwrap_or_default();
        SourcePost {
            permalink: format!("https://redd.it/{}", self.id),
            author: self.author.unwrap_or_else(|| "[deleted]".to_string()),
            id: self.id,
            sub: self.subreddit,
            title: self.title,
            url: self.url,
            over_18: self.over_18,
            ups: self.ups,
            upvote_ratio: self.upvote_ratio,
            created_utc,
        }
    }
}

impl RedditClient {
    /// Create a client against reddit.com
    pub fn new(user_agent: &str) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, user_agent)
    }

    /// Create a client against a custom origin
    pub fn with_base_url(base_url: &str, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| Error::source(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "GET");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::source(format!("request for {} failed: {}", what, e)))?;

        match response.status() {
            reqwest::StatusCode::FORBIDDEN => return Err(Error::Forbidden(what.to_string())),
            reqwest::StatusCode::NOT_FOUND => return Err(Error::NotFound(what.to_string())),
            status if !status.is_success() => {
                return Err(Error::source(format!("{} returned HTTP {}", what, status)));
            }
            _ => {}
        }

        response
            .json::<T>()
            .await
            .map_err(|e| Error::source(format!("invalid response for {}: {}", what, e)))
    }
}

#[async_trait]
impl ContentSource for RedditClient {
    async fn fetch_hot(&self, sub: &str, limit: u32) -> Result<Vec<SourcePost>> {
        let listing: Listing = self
            .get(&format!("/r/{}/hot.json?limit={}&raw_json=1", sub, limit), sub)
            .await?;
        Ok(listing
            .data
            .children
            .into_iter()
            .take(limit as usize)
            .map(|thing| thing.data.into_post())
            .collect())
    }

    async fn is_adult(&self, sub: &str) -> Result<bool> {
        let about: Thing<AboutSub> = self.get(&format!("/r/{}/about.json", sub), sub).await?;
        Ok(about.data.over18)
    }

    async fn fetch_by_id(&self, id: &str) -> Result<SourcePost> {
        let listing: Listing = self
            .get(&format!("/by_id/t3_{}.json?raw_json=1", id), id)
            .await?;
        listing
            .data
            .children
            .into_iter()
            .next()
            .map(|thing| thing.data.into_post())
            .ok_or_else(|| Error::NotFound(format!("post {}", id)))
    }
}
