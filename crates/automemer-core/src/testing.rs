//! In-memory test doubles for the content source and the chat platform.
//!
//! Available to this crate's tests and, through the `test-support` feature,
//! to downstream crates.

use crate::chat::{ChatPlatform, UserDirectory};
use crate::error::{Error, Result};
use crate::source::ContentSource;
use crate::types::{ChatEvent, MemeRecord, OutboundMessage, SourcePost};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 2024-01-15 10:00 UTC plus `minutes`.
pub fn at_minute(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0)
        .single()
        .unwrap_or_default()
        + chrono::Duration::minutes(minutes)
}

/// A source post whose content URL is derived from its id.
pub fn post(id: &str, sub: &str, ups: i64) -> SourcePost {
    SourcePost {
        id: id.to_string(),
        sub: sub.to_string(),
        title: format!("meme {id}"),
        url: format!("https://i.redd.it/{id}.png"),
        permalink: format!("https://redd.it/{id}"),
        over_18: false,
        ups,
        upvote_ratio: 0.9,
        author: "poster".to_string(),
        created_utc: at_minute(0),
    }
}

/// An unpublished archive record for `post(id, sub, score)`.
pub fn meme(id: &str, sub: &str, score: i64) -> MemeRecord {
    MemeRecord::from_post(post(id, sub, score), at_minute(30))
}

// ─────────────────────────────────────────────────────────────────────────────
// Content source
// ─────────────────────────────────────────────────────────────────────────────

/// Scriptable content source.
#[derive(Default)]
pub struct FakeSource {
    hot: Mutex<BTreeMap<String, Vec<SourcePost>>>,
    adult: Mutex<BTreeSet<String>>,
    forbidden: Mutex<BTreeSet<String>>,
    broken: Mutex<BTreeSet<String>>,
    fetches: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the hot listing of a sub.
    pub fn set_hot(&self, sub: &str, posts: Vec<SourcePost>) {
        locked(&self.hot).insert(sub.to_lowercase(), posts);
    }

    /// Change the score of a post wherever it is listed.
    pub fn set_score(&self, id: &str, ups: i64) {
        for post in locked(&self.hot).values_mut().flatten() {
            if post.id == id {
                post.ups = ups;
            }
        }
    }

    pub fn mark_adult(&self, sub: &str) {
        locked(&self.adult).insert(sub.to_lowercase());
    }

    /// Make the adult-flag lookup for a sub fail with `Forbidden`.
    pub fn forbid(&self, sub: &str) {
        locked(&self.forbidden).insert(sub.to_lowercase());
    }

    /// Make hot-listing fetches for a sub fail.
    pub fn break_fetch(&self, sub: &str) {
        locked(&self.broken).insert(sub.to_lowercase());
    }

    /// Number of `fetch_hot` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn fetch_hot(&self, sub: &str, limit: u32) -> Result<Vec<SourcePost>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let key = sub.to_lowercase();
        if locked(&self.broken).contains(&key) {
            return Err(Error::source(format!("{sub} is unavailable")));
        }
        Ok(locked(&self.hot)
            .get(&key)
            .map(|posts| posts.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn is_adult(&self, sub: &str) -> Result<bool> {
        let key = sub.to_lowercase();
        if locked(&self.forbidden).contains(&key) {
            return Err(Error::Forbidden(sub.to_string()));
        }
        Ok(locked(&self.adult).contains(&key))
    }

    async fn fetch_by_id(&self, id: &str) -> Result<SourcePost> {
        locked(&self.hot)
            .values()
            .flatten()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("post {id}")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat platform
// ─────────────────────────────────────────────────────────────────────────────

/// What the next `connect` call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    Rejected,
    Unreachable,
}

/// What the next `poll_events` call returns.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    Events(Vec<ChatEvent>),
    Closed,
    Failed,
}

/// Scriptable chat platform that records everything posted.
#[derive(Default)]
pub struct FakeChat {
    connects: Mutex<VecDeque<ConnectOutcome>>,
    polls: Mutex<VecDeque<PollOutcome>>,
    posted: Mutex<Vec<OutboundMessage>>,
    users: Mutex<UserDirectory>,
    connect_calls: AtomicUsize,
}

impl FakeChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of a future `connect`; unscripted calls succeed.
    pub fn script_connect(&self, outcome: ConnectOutcome) {
        locked(&self.connects).push_back(outcome);
    }

    /// Queue the result of a future poll; unscripted polls return nothing.
    pub fn script_poll(&self, outcome: PollOutcome) {
        locked(&self.polls).push_back(outcome);
    }

    pub fn set_users(&self, users: UserDirectory) {
        *locked(&self.users) = users;
    }

    /// Messages posted so far.
    pub fn posted(&self) -> Vec<OutboundMessage> {
        locked(&self.posted).clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn connect(&self) -> Result<bool> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        match locked(&self.connects).pop_front() {
            None | Some(ConnectOutcome::Connected) => Ok(true),
            Some(ConnectOutcome::Rejected) => Ok(false),
            Some(ConnectOutcome::Unreachable) => Err(Error::transport_closed("connect refused")),
        }
    }

    async fn poll_events(&self) -> Result<Vec<ChatEvent>> {
        match locked(&self.polls).pop_front() {
            None => Ok(Vec::new()),
            Some(PollOutcome::Events(events)) => Ok(events),
            Some(PollOutcome::Closed) => Err(Error::transport_closed("socket closed")),
            Some(PollOutcome::Failed) => Err(Error::chat("ratelimited")),
        }
    }

    async fn post_message(&self, message: &OutboundMessage) -> Result<()> {
        locked(&self.posted).push(message.clone());
        Ok(())
    }

    async fn list_users(&self) -> Result<UserDirectory> {
        Ok(locked(&self.users).clone())
    }
}

/// An event already addressed to the bot, as the delivery loop hands it to
/// the interpreter.
pub fn command_event(command: &str) -> ChatEvent {
    ChatEvent {
        channel: "C_MEMES".to_string(),
        user: Some("U1".to_string()),
        text: Some(format!("<@UBOT> {command}")),
        ts: "1705312800.000100".to_string(),
        mention: Some(command.to_string()),
        ..Default::default()
    }
}

/// A raw event mentioning the bot `UBOT`, as the platform delivers it.
pub fn raw_event(text: &str) -> ChatEvent {
    ChatEvent {
        channel: "C_MEMES".to_string(),
        user: Some("U1".to_string()),
        text: Some(text.to_string()),
        ts: "1705312800.000100".to_string(),
        ..Default::default()
    }
}
