//! Slack Web API client.
//!
//! Inbound events are read by polling `conversations.history` on the bot's
//! channel with an `oldest` cursor, so a poll only ever returns messages
//! newer than the last one seen. A backlog longer than one page is followed
//! through `response_metadata.next_cursor` before the cursor moves.
//!
//! `conversations.history` lists top-level messages only. Commands posted as
//! thread replies are not seen, so replies threaded with
//! [`OutboundMessage::reply_to`] only happen for events that already carry a
//! `thread_ts` (a thread parent, or an event delivered by another
//! [`ChatPlatform`]).
//!
//! # Usage
//!
//! ```rust,no_run
//! use automemer_core::chat::{ChatPlatform, SlackClient};
//!
//! #[tokio::main]
//! async fn main() -> automemer_core::Result<()> {
//!     let slack = SlackClient::new("xoxb-...", "C0123456")?;
//!     if slack.connect().await? {
//!         for event in slack.poll_events().await? {
//!             println!("{:?}", event.text);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use super::{ChatPlatform, UserDirectory};
use crate::error::{Error, Result};
use crate::types::{ChatEvent, OutboundMessage};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Default Slack Web API origin
const DEFAULT_API_URL: &str = "https://slack.com/api";

/// Messages requested per history poll
const HISTORY_PAGE_SIZE: u32 = 100;

/// Slack client bound to one channel
pub struct SlackClient {
    api_url: String,
    token: String,
    channel: String,
    client: reqwest::Client,
    /// `ts` of the newest message already delivered
    cursor: Mutex<Option<String>>,
    /// The bot's own user id, learned on connect
    self_id: Mutex<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct AuthTest {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct History {
    #[serde(default)]
    messages: Vec<HistoryMessage>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

impl History {
    /// Cursor for the next page, if Slack has more.
    fn next_page(&self) -> Option<&str> {
        if !self.has_more {
            return None;
        }
        self.response_metadata
            .as_ref()
            .map(|meta| meta.next_cursor.as_str())
            .filter(|cursor| !cursor.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct HistoryMessage {
    ts: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thread_ts: Option<String>,
}

/// Slack timestamp (`seconds.micros`) for an instant.
fn slack_ts(at: chrono::DateTime<Utc>) -> String {
    format!("{}.{:06}", at.timestamp(), at.timestamp_subsec_micros())
}

fn ts_value(ts: &str) -> f64 {
    ts.parse().unwrap_or(0.0)
}

fn transport_error(method: &str, e: reqwest::Error) -> Error {
    Error::transport_closed(format!("{}: {}", method, e))
}

impl SlackClient {
    /// Create a client against slack.com
    pub fn new(token: &str, channel: &str) -> Result<Self> {
        Self::with_api_url(DEFAULT_API_URL, token, channel)
    }

    /// Create a client against a custom API origin
    pub fn with_api_url(api_url: &str, token: &str, channel: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::chat(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            channel: channel.to_string(),
            client,
            cursor: Mutex::new(None),
            self_id: Mutex::new(None),
        })
    }

    async fn get<T: DeserializeOwned>(&self, method: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.api_url, method);
        debug!(%method, "Slack GET");

        let response = self
            .client
            .get(&url)
            .query(query)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;

        Self::unwrap_body(method, response).await
    }

    async fn post<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T> {
        let url = format!("{}/{}", self.api_url, method);
        debug!(%method, "Slack POST");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(method, e))?;

        Self::unwrap_body(method, response).await
    }

    /// Decode a Web API response, turning `{"ok": false}` into an error.
    async fn unwrap_body<T: DeserializeOwned>(method: &str, response: reqwest::Response) -> Result<T> {
        let status = response.status();
        if status.is_server_error() {
            return Err(Error::transport_closed(format!("{} returned HTTP {}", method, status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::chat(format!("invalid response for {}: {}", method, e)))?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(Error::chat(format!("{} failed: {}", method, reason)));
        }

        Ok(serde_json::from_value(body)?)
    }

    fn set_cursor(&self, ts: String) -> Result<()> {
        *self.cursor.lock().map_err(|_| Error::LockPoisoned)? = Some(ts);
        Ok(())
    }

    fn cursor(&self) -> Result<Option<String>> {
        Ok(self.cursor.lock().map_err(|_| Error::LockPoisoned)?.clone())
    }

    fn self_id(&self) -> Result<Option<String>> {
        Ok(self.self_id.lock().map_err(|_| Error::LockPoisoned)?.clone())
    }
}

#[async_trait]
impl ChatPlatform for SlackClient {
    async fn connect(&self) -> Result<bool> {
        let auth: AuthTest = match self.get("auth.test", &[]).await {
            Ok(auth) => auth,
            Err(Error::Chat(reason)) => {
                warn!("Slack rejected the bot token: {}", reason);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        *self.self_id.lock().map_err(|_| Error::LockPoisoned)? = auth.user_id;

        // Only messages sent after connecting are delivered
        if self.cursor()?.is_none() {
            self.set_cursor(slack_ts(Utc::now()))?;
        }
        Ok(true)
    }

    async fn poll_events(&self) -> Result<Vec<ChatEvent>> {
        let oldest = self.cursor()?;
        let limit = HISTORY_PAGE_SIZE.to_string();
        let mut messages = Vec::new();
        let mut page: Option<String> = None;

        loop {
            let mut query = vec![("channel", self.channel.as_str()), ("limit", limit.as_str())];
            if let Some(oldest) = &oldest {
                query.push(("oldest", oldest.as_str()));
                query.push(("inclusive", "false"));
            }
            if let Some(page) = &page {
                query.push(("cursor", page.as_str()));
            }

            let history: History = self.get("conversations.history", &query).await?;
            let next = history.next_page().map(str::to_string);
            messages.extend(history.messages);
            match next {
                Some(next) => page = Some(next),
                None => break,
            }
        }
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        // Slack returns newest first
        messages.sort_by(|a, b| ts_value(&a.ts).total_cmp(&ts_value(&b.ts)));
        if let Some(newest) = messages.last() {
            self.set_cursor(newest.ts.clone())?;
        }

        let self_id = self.self_id()?;
        Ok(messages
            .into_iter()
            .filter(|m| self_id.is_none() || m.user != self_id)
            .map(|m| ChatEvent {
                channel: self.channel.clone(),
                user: m.user,
                text: m.text,
                ts: m.ts,
                thread_ts: m.thread_ts,
                ..Default::default()
            })
            .collect())
    }

    async fn post_message(&self, message: &OutboundMessage) -> Result<()> {
        let mut body = json!({
            "channel": message.channel,
            "text": message.text,
            "as_user": true,
        });
        if let Some(thread_ts) = &message.thread_ts {
            body["thread_ts"] = json!(thread_ts);
        }

        let _: Value = self.post("chat.postMessage", &body).await?;
        Ok(())
    }

    async fn list_users(&self) -> Result<UserDirectory> {
        self.get("users.list", &[]).await
    }
}
