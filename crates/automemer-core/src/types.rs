//! Shared data types for automemer-core.
//!
//! `MemeRecord` is serialized with the field names the staging file and the
//! archive have always used (`over_18`, `ups`, `highest_ups`, ...), so older
//! `scraped.json` files keep loading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Memes
// ─────────────────────────────────────────────────────────────────────────────

/// A post as returned by the content source, before it is archived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePost {
    pub id: String,
    /// Display-cased name of the sub the post lives in
    pub sub: String,
    pub title: String,
    pub url: String,
    pub permalink: String,
    pub over_18: bool,
    pub ups: i64,
    pub upvote_ratio: f64,
    pub author: String,
    pub created_utc: DateTime<Utc>,
}

/// A scraped meme with its popularity metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemeRecord {
    pub id: String,
    /// Display-cased source name
    #[serde(rename = "sub")]
    pub source: String,
    pub title: String,
    /// Content URL; the staging key
    pub url: String,
    #[serde(rename = "link")]
    pub permalink: String,
    #[serde(rename = "over_18")]
    pub is_adult: bool,
    /// Score at the most recent observation
    #[serde(rename = "ups")]
    pub score: i64,
    /// Highest score ever observed for this id
    #[serde(rename = "highest_ups")]
    pub highest_score: i64,
    #[serde(rename = "upvote_ratio")]
    pub score_ratio: f64,
    pub author: String,
    #[serde(rename = "created_utc")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "recorded")]
    pub first_seen_at: DateTime<Utc>,
    #[serde(rename = "last_updated")]
    pub last_updated_at: DateTime<Utc>,
    #[serde(rename = "posted_to_slack")]
    pub published: bool,
}

impl MemeRecord {
    /// Build a fresh, unpublished record from a source post.
    pub fn from_post(post: SourcePost, now: DateTime<Utc>) -> Self {
        Self {
            id: post.id,
            source: post.sub,
            title: post.title,
            url: post.url,
            permalink: post.permalink,
            is_adult: post.over_18,
            score: post.ups,
            highest_score: post.ups,
            score_ratio: post.upvote_ratio,
            author: post.author,
            created_at: post.created_utc,
            first_seen_at: now,
            last_updated_at: now,
            published: false,
        }
    }

    /// Lower-cased source name, used for threshold lookups.
    pub fn source_key(&self) -> String {
        self.source.to_lowercase()
    }

    /// Fold a new observation of the same post into this record.
    ///
    /// The high-water mark never decreases: it becomes the max of the new
    /// score, the previous high-water mark and the previous current score.
    pub fn observe(&mut self, score: i64, score_ratio: f64, now: DateTime<Utc>) {
        self.highest_score = score.max(self.highest_score).max(self.score);
        self.score = score;
        self.score_ratio = score_ratio;
        self.last_updated_at = now;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

/// An inbound message from the chat platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    pub channel: String,
    pub user: Option<String>,
    pub text: Option<String>,
    /// Platform timestamp / message id
    pub ts: String,
    pub thread_ts: Option<String>,
    /// Resolved display name of `user` (attached locally)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Time the event was read (attached locally)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    /// Text following the bot mention, if the message was addressed to the bot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mention: Option<String>,
}

/// A message waiting in the outbound queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

impl OutboundMessage {
    pub fn new(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            text: text.into(),
            thread_ts: None,
        }
    }

    /// Reply to an event, threading when the event was threaded.
    pub fn reply_to(event: &ChatEvent, text: impl Into<String>) -> Self {
        Self {
            channel: event.channel.clone(),
            text: text.into(),
            thread_ts: event.thread_ts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_post() -> SourcePost {
        SourcePost {
            id: "abc".to_string(),
            sub: "Me_IRL".to_string(),
            title: "me irl".to_string(),
            url: "https://i.redd.it/abc.png".to_string(),
            permalink: "https://redd.it/abc".to_string(),
            over_18: false,
            ups: 120,
            upvote_ratio: 0.97,
            author: "someone".to_string(),
            created_utc: Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_from_post() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 11, 0, 0).unwrap();
        let meme = MemeRecord::from_post(sample_post(), now);
        assert_eq!(meme.highest_score, 120);
        assert_eq!(meme.first_seen_at, now);
        assert_eq!(meme.last_updated_at, now);
        assert!(!meme.published);
        assert_eq!(meme.source_key(), "me_irl");
    }

    #[test]
    fn test_observe_high_water_mark() {
        let now = Utc::now();
        let mut meme = MemeRecord::from_post(sample_post(), now);

        meme.observe(300, 0.9, now);
        assert_eq!(meme.highest_score, 300);
        assert_eq!(meme.score, 300);

        meme.observe(50, 0.5, now);
        assert_eq!(meme.highest_score, 300);
        assert_eq!(meme.score, 50);
        assert_eq!(meme.score_ratio, 0.5);
    }

    #[test]
    fn test_observe_uses_previous_current_score() {
        let now = Utc::now();
        let mut meme = MemeRecord::from_post(sample_post(), now);
        // A record whose high-water mark lagged behind its current score
        meme.highest_score = 10;
        meme.score = 500;

        meme.observe(40, 0.8, now);
        assert_eq!(meme.highest_score, 500);
    }

    #[test]
    fn test_staging_field_names() {
        let meme = MemeRecord::from_post(sample_post(), Utc::now());
        let value = serde_json::to_value(&meme).unwrap();
        for key in [
            "id", "sub", "title", "url", "link", "over_18", "ups", "highest_ups",
            "upvote_ratio", "author", "created_utc", "recorded", "last_updated",
            "posted_to_slack",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
    }

    #[test]
    fn test_reply_to_threads() {
        let event = ChatEvent {
            channel: "C1".to_string(),
            ts: "1.0".to_string(),
            thread_ts: Some("0.5".to_string()),
            ..Default::default()
        };
        let msg = OutboundMessage::reply_to(&event, "hi");
        assert_eq!(msg.channel, "C1");
        assert_eq!(msg.thread_ts.as_deref(), Some("0.5"));
    }
}
