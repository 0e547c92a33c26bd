//! Chat platform seam: event polling, posting and the user directory.

#[cfg(feature = "client")]
pub mod slack;

#[cfg(feature = "client")]
pub use slack::SlackClient;

use crate::error::Result;
use crate::types::{ChatEvent, OutboundMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connection to the chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Establish (or re-establish) the session.
    ///
    /// `Ok(false)` means the platform rejected the credentials.
    async fn connect(&self) -> Result<bool>;

    /// Events received since the previous poll, oldest first. Never blocks
    /// waiting for new events.
    async fn poll_events(&self) -> Result<Vec<ChatEvent>>;

    async fn post_message(&self, message: &OutboundMessage) -> Result<()>;

    async fn list_users(&self) -> Result<UserDirectory>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub real_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

/// Snapshot of the workspace's members.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserDirectory {
    #[serde(default)]
    pub members: Vec<Member>,
}

impl UserDirectory {
    /// Best display name for a user id: handle, then real name, then the id.
    pub fn display_name(&self, user_id: &str) -> String {
        self.members
            .iter()
            .find(|m| m.id == user_id)
            .and_then(|m| {
                m.name
                    .clone()
                    .or_else(|| m.profile.as_ref().and_then(|p| p.real_name.clone()))
            })
            .unwrap_or_else(|| user_id.to_string())
    }
}

/// Text addressed to the bot, if `text` mentions it.
///
/// Returns what follows the first `<@BOT_ID>` (up to any second mention),
/// trimmed.
pub fn extract_mention(text: &str, bot_id: &str) -> Option<String> {
    let at_bot = format!("<@{}>", bot_id);
    text.split(at_bot.as_str())
        .nth(1)
        .map(|rest| rest.trim().to_string())
}

/// Attach locally resolved metadata to a freshly polled event.
pub fn annotate(event: &mut ChatEvent, users: &UserDirectory, bot_id: &str, now: DateTime<Utc>) {
    event.received_at = Some(now);
    if let Some(user) = &event.user {
        event.username = Some(users.display_name(user));
    }
    event.mention = event
        .text
        .as_deref()
        .and_then(|text| extract_mention(text, bot_id));
}
