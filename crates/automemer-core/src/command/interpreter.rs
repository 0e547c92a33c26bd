//! Command handlers.
//!
//! Every directed message produces exactly one reply in the event's channel
//! (and thread), framed as `>{command}\n{response}`. `pop` replies through
//! the release engine instead, and `kill` produces no reply at all.

use super::{COMMAND_HELP, Command};
use crate::error::Result;
use crate::outbox::Outbox;
use crate::pipeline::{Ingestor, ReleaseEngine};
use crate::settings::{MINUTES_PER_DAY, SettingsStore};
use crate::types::{ChatEvent, MemeRecord, OutboundMessage};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};

/// What the delivery loop should do after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Shutdown,
}

enum ThresholdChange {
    NotFollowed,
    NotAnInteger,
    Changed { old: String, new: i64 },
}

/// Strip Slack link markup (`<url>` or `<url|label>`) and HTML escapes.
fn unwrap_link(arg: &str) -> String {
    let inner = arg
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(arg);
    let target = inner.split('|').next().unwrap_or(inner);
    target
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn describe(record: &MemeRecord) -> Result<String> {
    let value = serde_json::to_value(record)?;
    let mut fields: Vec<_> = value
        .as_object()
        .map(|map| map.iter().collect())
        .unwrap_or_default();
    fields.sort_by(|a, b| a.0.cmp(b.0));

    Ok(fields
        .into_iter()
        .map(|(key, val)| format!("`{}`: {}\n", key, display_value(val)))
        .collect())
}

/// Parses directed messages and acts on them.
pub struct CommandInterpreter {
    settings: Arc<SettingsStore>,
    release: Arc<ReleaseEngine>,
    ingestor: Ingestor,
    outbox: Outbox,
}

impl CommandInterpreter {
    pub fn new(
        settings: Arc<SettingsStore>,
        release: Arc<ReleaseEngine>,
        ingestor: Ingestor,
        outbox: Outbox,
    ) -> Self {
        Self {
            settings,
            release,
            ingestor,
            outbox,
        }
    }

    /// Handle one inbound event. Events not addressed to the bot are ignored.
    pub async fn handle(&self, event: &ChatEvent) -> Disposition {
        let Some(raw) = event.mention.as_deref() else {
            return Disposition::Continue;
        };

        let command = Command::parse(raw);
        info!(
            user = event.username.as_deref().or(event.user.as_deref()).unwrap_or("unknown"),
            ?command,
            "Handling command"
        );

        let reply = match command {
            Command::Kill => return Disposition::Shutdown,
            Command::Echo => Some(raw.split_whitespace().skip(1).collect::<Vec<_>>().join(" ")),
            Command::Unknown => Some(format!(
                ">*{}*\nI don't know this command :dealwithitparrot:\n",
                raw.to_lowercase()
            )),
            Command::Pop => self.pop(raw).map(|body| format!(">{}\n{}", raw, body)),
            other => {
                let body = match self.respond(other, raw).await {
                    Ok(body) => body,
                    Err(e) => {
                        error!(?command, "Command failed: {}", e);
                        format!(":sadparrot: error\n{}", e)
                    }
                };
                Some(format!(">{}\n{}", raw, body))
            }
        };

        if let Some(text) = reply {
            if let Err(e) = self.outbox.send(OutboundMessage::reply_to(event, text)) {
                error!("Could not queue reply: {}", e);
            }
        }
        Disposition::Continue
    }

    async fn respond(&self, command: Command, raw: &str) -> Result<String> {
        match command {
            Command::Add => self.add(raw),
            Command::Delete => self.delete(raw),
            Command::Details => self.details(raw, false).await,
            Command::Link => self.details(raw, true).await,
            Command::Help => Ok(help()),
            Command::IncreaseThreshold => self.set_threshold(raw, true),
            Command::SetThreshold => self.set_threshold(raw, false),
            Command::ListThresholds => self.list_thresholds(),
            Command::ListSettings => self.list_settings(),
            Command::ListSubreddits => self.list_subreddits(),
            Command::SetPostInterval => self.set_post_interval(raw),
            Command::NumMemes => self.num_memes(raw),
            Command::Pop | Command::Kill | Command::Echo | Command::Unknown => Ok(String::new()),
        }
    }

    fn add(&self, raw: &str) -> Result<String> {
        let lowered = raw.to_lowercase();
        let tokens: Vec<_> = lowered.split_whitespace().collect();
        let [_, sub] = tokens.as_slice() else {
            return Ok("command must be in the form `add [name]`".to_string());
        };

        let added = self
            .settings
            .update(|s| s.watched_sources.insert(sub.to_string()))?;
        if added {
            info!(%sub, "Now following sub");
            Ok(format!("_/r/{}_ has been added!", sub))
        } else {
            Ok(format!("_/r/{}_ is already being followed", sub))
        }
    }

    fn delete(&self, raw: &str) -> Result<String> {
        let lowered = raw.to_lowercase();
        let tokens: Vec<_> = lowered.split_whitespace().collect();
        let [_, sub] = tokens.as_slice() else {
            return Ok("command must be in the form `delete [name]`".to_string());
        };

        let removed = self.settings.update(|s| {
            let removed = s.watched_sources.remove(*sub);
            if removed {
                s.thresholds.per_source.remove(*sub);
            }
            removed
        })?;
        if removed {
            info!(%sub, "Stopped following sub");
            Ok(format!("_/r/{}_ has been removed", sub))
        } else {
            Ok(format!(
                "_/r/{0}_ is not currently being followed, to add it use the command `add {0}`",
                sub
            ))
        }
    }

    async fn details(&self, raw: &str, link_only: bool) -> Result<String> {
        let tokens: Vec<_> = raw.split_whitespace().collect();
        let [_, arg] = tokens.as_slice() else {
            let usage = if link_only { "link <meme_url>" } else { "details <meme_url>" };
            return Ok(format!("command must be in the form `{}`\n", usage));
        };

        let url = unwrap_link(arg);
        let records = self.ingestor.refresh_by_url(&url).await?;
        if records.is_empty() {
            return Ok(format!("I couldn't find any data for this url: `{}`, sorry\n", url));
        }

        let mut response = String::new();
        for record in &records {
            if link_only {
                response.push_str(&record.permalink);
                response.push('\n');
            } else {
                response.push_str(&describe(record)?);
                response.push('\n');
            }
        }
        Ok(response)
    }

    fn set_threshold(&self, raw: &str, increase: bool) -> Result<String> {
        let change = if increase { "increase" } else { "set" };
        let lowered = raw.to_lowercase();
        let tokens: Vec<_> = lowered.split_whitespace().collect();
        if !(3..=4).contains(&tokens.len()) {
            return Ok(format!(
                "command must be in the form '{} threshold {{threshold}} <optional-sub>'",
                change
            ));
        }

        let target = tokens.get(3).copied().filter(|sub| *sub != "global");
        let value = tokens[2].parse::<i64>().ok();

        let outcome = self.settings.update(|s| {
            if let Some(sub) = target {
                if !s.watched_sources.contains(sub) {
                    return ThresholdChange::NotFollowed;
                }
            }
            let Some(value) = value else {
                return ThresholdChange::NotAnInteger;
            };

            let (old, base) = match target {
                None => (Some(s.thresholds.global), s.thresholds.global),
                Some(sub) => {
                    let old = s.thresholds.per_source.get(sub).copied();
                    (old, old.unwrap_or(s.thresholds.global))
                }
            };
            let new = (if increase { base.saturating_add(value) } else { value }).max(1);
            match target {
                None => s.thresholds.global = new,
                Some(sub) => {
                    s.thresholds.per_source.insert(sub.to_string(), new);
                }
            }

            ThresholdChange::Changed {
                old: old.map_or_else(|| "global".to_string(), |v| v.to_string()),
                new,
            }
        })?;

        Ok(match (outcome, target) {
            (ThresholdChange::NotFollowed, sub) => format!(
                "{} is not in the list of subreddits. run `list subreddits` to view a list",
                sub.unwrap_or_default()
            ),
            (ThresholdChange::NotAnInteger, _) => format!("{} is not a valid integer", tokens[2]),
            (ThresholdChange::Changed { old, new }, None) => format!(
                "The global threshold has been set to *{}*! (previously {})",
                new, old
            ),
            (ThresholdChange::Changed { old, new }, Some(sub)) => format!(
                "The threshold upvotes for _{}_ has been set to *{}*! (previously {})",
                sub, new, old
            ),
        })
    }

    fn set_post_interval(&self, raw: &str) -> Result<String> {
        let tokens: Vec<_> = raw.split_whitespace().collect();
        if tokens.len() != 4 {
            return Ok("command must be in the form `set post interval <integer>`".to_string());
        }

        let arg = tokens[3];
        let Ok(interval) = arg.parse::<i64>() else {
            return Ok(format!("{} is not an integer :parrotcop:", arg));
        };
        if interval >= i64::from(MINUTES_PER_DAY) {
            return Ok(format!(
                "```\n>>> minutes_per_day()\n{}```\nToo many minutes!",
                MINUTES_PER_DAY
            ));
        }
        if interval <= 0 {
            return Ok("Please enter a number greater than 0".to_string());
        }

        // 0 < interval < 1440, so the narrowing cannot fail
        let minutes = u32::try_from(interval).unwrap_or(MINUTES_PER_DAY - 1);
        self.settings
            .update(|s| s.publish_interval_minutes = minutes)?;
        info!(minutes, "Publish interval changed");
        Ok(format!("scrape_interval has been set to *{}*!", minutes))
    }

    /// Returns a reply only for invalid input; otherwise releases.
    fn pop(&self, raw: &str) -> Option<String> {
        let tokens: Vec<_> = raw.split_whitespace().collect();
        let limit = match tokens.as_slice() {
            [_, arg] => match arg.parse::<i64>() {
                Err(_) => return Some(format!("{} isn't a number!", arg)),
                Ok(n) if n <= 0 => return Some("You can't pop 0 or fewer memes..".to_string()),
                Ok(n) => Some(usize::try_from(n).unwrap_or(usize::MAX)),
            },
            _ => None,
        };

        self.release.release_or_notify(limit, true);
        None
    }

    fn num_memes(&self, raw: &str) -> Result<String> {
        let lowered = raw.to_lowercase();
        let tokens: Vec<_> = lowered.split_whitespace().collect();
        let by_sub = tokens.contains(&"by_sub");
        let postable_only = tokens.contains(&"postable_only");

        let counts = self.release.count_memes()?;
        let total = counts.total_count();
        let postable = counts.postable_count();

        let mut response = String::new();
        match (by_sub, postable_only) {
            (false, false) => {
                response.push_str(&format!("Total memes: {}\nPostable memes: {}", total, postable));
            }
            (false, true) => response.push_str(&format!("Postable memes: {}", postable)),
            (true, false) => {
                for (sub, tot) in &counts.total {
                    let good = counts.postable.get(sub).copied().unwrap_or(0);
                    response.push_str(&format!("*{}*: {}   ({})\n", sub, good, tot));
                }
                response.push_str(&format!("\n*Combined*: {}    ({})", postable, total));
            }
            (true, true) => {
                for sub in counts.total.keys() {
                    let good = counts.postable.get(sub).copied().unwrap_or(0);
                    response.push_str(&format!("*{}*: {}\n", sub, good));
                }
                response.push_str(&format!("\n*Combined*: {}", postable));
            }
        }
        Ok(response)
    }

    fn list_settings(&self) -> Result<String> {
        let settings = self.settings.load()?;
        let value = serde_json::to_value(&settings)?;
        let mut entries: Vec<_> = value
            .as_object()
            .map(|map| map.iter().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut response = String::new();
        for (key, val) in entries {
            response.push_str(&format!("`{}`: {}\n", key, serde_json::to_string_pretty(val)?));
        }
        Ok(response)
    }

    fn list_thresholds(&self) -> Result<String> {
        let settings = self.settings.load()?;
        Ok(serde_json::to_string_pretty(&settings.thresholds)?)
    }

    fn list_subreddits(&self) -> Result<String> {
        let settings = self.settings.load()?;
        let subs: Vec<_> = settings.watched_sources.iter().map(String::as_str).collect();
        Ok(format!(
            "The following subreddits are currently being followed: {}",
            subs.join(", ")
        ))
    }
}

fn help() -> String {
    let mut commands = COMMAND_HELP.to_vec();
    commands.sort_by_key(|(name, _)| *name);
    commands
        .into_iter()
        .map(|(name, description)| format!("`{}` - {}\n", name, description))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemeArchive;
    use crate::db::Database;
    use crate::outbox::{self, OutboxReceiver};
    use crate::settings::Settings;
    use crate::staging::StagingStore;
    use crate::testing::{FakeSource, command_event, meme, post};

    struct Harness {
        _dir: tempfile::TempDir,
        source: Arc<FakeSource>,
        archive: Arc<Database>,
        settings: Arc<SettingsStore>,
        staging: Arc<StagingStore>,
        interpreter: CommandInterpreter,
        rx: OutboxReceiver,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(FakeSource::new());
        let archive = Arc::new(Database::open_in_memory().unwrap());
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")));
        let staging = Arc::new(StagingStore::new(dir.path().join("scraped.json")));
        settings.ensure_exists().unwrap();
        staging.ensure_exists().unwrap();

        let (tx, rx) = outbox::channel();
        let release = Arc::new(ReleaseEngine::new(
            settings.clone(),
            staging.clone(),
            archive.clone(),
            tx.clone(),
            "C_MEMES",
        ));
        let ingestor = Ingestor::new(source.clone(), archive.clone(), settings.clone(), staging.clone());
        let interpreter = CommandInterpreter::new(settings.clone(), release, ingestor, tx);
        Harness {
            _dir: dir,
            source,
            archive,
            settings,
            staging,
            interpreter,
            rx,
        }
    }

    impl Harness {
        /// Run a command and return the single reply it produced.
        async fn reply(&mut self, command: &str) -> String {
            let disposition = self.interpreter.handle(&command_event(command)).await;
            assert_eq!(disposition, Disposition::Continue);
            let mut replies = self.rx.drain();
            assert_eq!(replies.len(), 1, "expected exactly one reply to {command:?}");
            replies.remove(0).text
        }

        fn stage(&self, record: MemeRecord) {
            self.archive.insert(&record).unwrap();
            let guard = self.staging.lock().unwrap();
            let mut staged = guard.read().unwrap();
            staged.insert(record.url.clone(), record);
            guard.write(&staged).unwrap();
        }
    }

    #[test]
    fn test_unwrap_link() {
        assert_eq!(unwrap_link("<https://i.redd.it/a.png>"), "https://i.redd.it/a.png");
        assert_eq!(unwrap_link("<https://x.io/?a=1&amp;b=2|x.io>"), "https://x.io/?a=1&b=2");
        assert_eq!(unwrap_link("https://plain.example/a"), "https://plain.example/a");
    }

    #[tokio::test]
    async fn test_events_without_mention_are_ignored() {
        let mut h = harness();
        let mut event = command_event("help");
        event.mention = None;
        assert_eq!(h.interpreter.handle(&event).await, Disposition::Continue);
        assert!(h.rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_reply_is_framed_and_threaded() {
        let mut h = harness();
        let mut event = command_event("list subreddits");
        event.thread_ts = Some("1705312000.000001".into());
        h.interpreter.handle(&event).await;

        let reply = h.rx.try_recv().unwrap();
        assert_eq!(reply.channel, "C_MEMES");
        assert_eq!(reply.thread_ts.as_deref(), Some("1705312000.000001"));
        assert_eq!(
            reply.text,
            ">list subreddits\nThe following subreddits are currently being followed: me_irl"
        );
    }

    #[tokio::test]
    async fn test_unknown_and_echo() {
        let mut h = harness();
        assert_eq!(
            h.reply("Make Me A Sandwich").await,
            ">*make me a sandwich*\nI don't know this command :dealwithitparrot:\n"
        );
        assert_eq!(h.reply("echo hello   there").await, "hello there");
    }

    #[tokio::test]
    async fn test_kill_requests_shutdown_without_reply() {
        let mut h = harness();
        assert_eq!(h.interpreter.handle(&command_event("kill")).await, Disposition::Shutdown);
        assert!(h.rx.drain().is_empty());
    }

    #[tokio::test]
    async fn test_help_lists_commands() {
        let mut h = harness();
        let reply = h.reply("help").await;
        assert!(reply.starts_with(">help\n`add <sub>` - "));
        assert_eq!(reply.lines().count(), 1 + COMMAND_HELP.len());
    }

    #[tokio::test]
    async fn test_add_and_delete() {
        let mut h = harness();
        assert_eq!(h.reply("add DankMemes").await, ">add DankMemes\n_/r/dankmemes_ has been added!");
        assert!(h.settings.load().unwrap().watched_sources.contains("dankmemes"));
        assert_eq!(
            h.reply("add dankmemes").await,
            ">add dankmemes\n_/r/dankmemes_ is already being followed"
        );

        h.reply("set threshold 10 dankmemes").await;
        assert_eq!(h.reply("remove dankmemes").await, ">remove dankmemes\n_/r/dankmemes_ has been removed");
        let settings = h.settings.load().unwrap();
        assert!(!settings.watched_sources.contains("dankmemes"));
        assert!(!settings.thresholds.per_source.contains_key("dankmemes"));

        assert_eq!(
            h.reply("delete funny").await,
            ">delete funny\n_/r/funny_ is not currently being followed, to add it use the command `add funny`"
        );
        assert_eq!(h.reply("add").await, ">add\ncommand must be in the form `add [name]`");
        assert_eq!(
            h.reply("delete a b").await,
            ">delete a b\ncommand must be in the form `delete [name]`"
        );
    }

    #[tokio::test]
    async fn test_threshold_set_then_increase() {
        let mut h = harness();
        assert_eq!(
            h.reply("set threshold 5").await,
            ">set threshold 5\nThe global threshold has been set to *5*! (previously 1000)"
        );
        assert_eq!(
            h.reply("increase threshold 3 global").await,
            ">increase threshold 3 global\nThe global threshold has been set to *8*! (previously 5)"
        );
        assert_eq!(h.settings.load().unwrap().thresholds.global, 8);

        assert_eq!(
            h.reply("increase threshold -100").await,
            ">increase threshold -100\nThe global threshold has been set to *1*! (previously 8)"
        );
    }

    #[tokio::test]
    async fn test_per_sub_threshold() {
        let mut h = harness();
        assert_eq!(
            h.reply("increase threshold 50 me_irl").await,
            ">increase threshold 50 me_irl\nThe threshold upvotes for _me_irl_ has been set to *1050*! (previously global)"
        );
        assert_eq!(
            h.reply("set threshold -3 ME_IRL").await,
            ">set threshold -3 ME_IRL\nThe threshold upvotes for _me_irl_ has been set to *1*! (previously 1050)"
        );
        assert_eq!(h.settings.load().unwrap().threshold_for("me_irl"), 1);
    }

    #[tokio::test]
    async fn test_threshold_input_errors_do_not_mutate() {
        let mut h = harness();
        let before = std::fs::read_to_string(h.settings.path()).unwrap();

        assert_eq!(
            h.reply("set threshold lots").await,
            ">set threshold lots\nlots is not a valid integer"
        );
        assert_eq!(
            h.reply("set threshold 5 funny").await,
            ">set threshold 5 funny\nfunny is not in the list of subreddits. run `list subreddits` to view a list"
        );
        assert_eq!(
            h.reply("set threshold").await,
            ">set threshold\ncommand must be in the form 'set threshold {threshold} <optional-sub>'"
        );

        assert_eq!(std::fs::read_to_string(h.settings.path()).unwrap(), before);
    }

    #[tokio::test]
    async fn test_set_post_interval() {
        let mut h = harness();
        assert_eq!(
            h.reply("set post interval 30").await,
            ">set post interval 30\nscrape_interval has been set to *30*!"
        );
        assert_eq!(h.settings.load().unwrap().publish_interval_minutes, 30);

        assert!(h.reply("set post interval 1440").await.ends_with("Too many minutes!"));
        assert_eq!(
            h.reply("set post interval 0").await,
            ">set post interval 0\nPlease enter a number greater than 0"
        );
        assert_eq!(
            h.reply("set post interval soon").await,
            ">set post interval soon\nsoon is not an integer :parrotcop:"
        );
        assert_eq!(
            h.reply("set post interval").await,
            ">set post interval\ncommand must be in the form `set post interval <integer>`"
        );
        assert_eq!(h.settings.load().unwrap().publish_interval_minutes, 30);
    }

    #[tokio::test]
    async fn test_pop_validation() {
        let mut h = harness();
        assert_eq!(h.reply("pop lots").await, ">pop lots\nlots isn't a number!");
        assert_eq!(h.reply("pop 0").await, ">pop 0\nYou can't pop 0 or fewer memes..");
    }

    #[tokio::test]
    async fn test_pop_releases_to_meme_channel() {
        let mut h = harness();
        h.settings.update(|s| s.thresholds.global = 10).unwrap();
        h.stage(meme("a1", "me_irl", 100));

        let disposition = h.interpreter.handle(&command_event("pop 2")).await;
        assert_eq!(disposition, Disposition::Continue);

        let messages = h.rx.drain();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].text.starts_with("*meme a1* _(from /r/me_irl)_ `100`"));
        assert_eq!(messages[1].text, "Sorry, we ran out of memes :(");
        assert!(h.archive.get("a1").unwrap().unwrap().published);
    }

    #[tokio::test]
    async fn test_num_memes_shapes() {
        let mut h = harness();
        h.settings.update(|s| s.thresholds.global = 50).unwrap();
        h.stage(meme("a1", "funny", 100));
        h.stage(meme("a2", "funny", 10));
        h.stage(meme("b1", "Memes", 70));

        assert_eq!(h.reply("num-memes").await, ">num-memes\nTotal memes: 3\nPostable memes: 2");
        assert_eq!(
            h.reply("num-memes postable_only").await,
            ">num-memes postable_only\nPostable memes: 2"
        );
        assert_eq!(
            h.reply("num-memes by_sub").await,
            ">num-memes by_sub\n*funny*: 1   (2)\n*memes*: 1   (1)\n\n*Combined*: 2    (3)"
        );
        assert_eq!(
            h.reply("num-memes postable_only by_sub").await,
            ">num-memes postable_only by_sub\n*funny*: 1\n*memes*: 1\n\n*Combined*: 2"
        );
    }

    #[tokio::test]
    async fn test_details_and_link() {
        let mut h = harness();
        let p = post("a1", "funny", 42);
        h.source.set_hot("funny", vec![p.clone()]);
        h.archive
            .insert(&MemeRecord::from_post(p.clone(), chrono::Utc::now()))
            .unwrap();
        h.source.set_score("a1", 84);

        let reply = h.reply(&format!("details <{}>", p.url)).await;
        assert!(reply.contains("`highest_ups`: 84\n"));
        assert!(reply.contains("`sub`: funny\n"));
        assert!(reply.contains("`over_18`: false\n"));
        let keys: Vec<_> = reply
            .lines()
            .filter_map(|l| l.strip_prefix('`'))
            .filter_map(|l| l.split('`').next())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);

        assert_eq!(
            h.reply(&format!("link <{}>", p.url)).await,
            format!(">link <{}>\nhttps://redd.it/a1\n", p.url)
        );
        assert_eq!(h.archive.get("a1").unwrap().unwrap().highest_score, 84);
    }

    #[tokio::test]
    async fn test_details_unknown_url_mutates_nothing() {
        let mut h = harness();
        let settings_before = std::fs::read_to_string(h.settings.path()).unwrap();
        let staging_before = std::fs::read_to_string(h.staging.path()).unwrap();

        assert_eq!(
            h.reply("details <https://nowhere.example/x.png>").await,
            ">details <https://nowhere.example/x.png>\nI couldn't find any data for this url: `https://nowhere.example/x.png`, sorry\n"
        );
        assert_eq!(
            h.reply("details").await,
            ">details\ncommand must be in the form `details <meme_url>`\n"
        );

        assert_eq!(std::fs::read_to_string(h.settings.path()).unwrap(), settings_before);
        assert_eq!(std::fs::read_to_string(h.staging.path()).unwrap(), staging_before);
        assert_eq!(h.archive.count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_settings_and_thresholds() {
        let mut h = harness();
        let reply = h.reply("list settings").await;
        let keys: Vec<_> = reply
            .lines()
            .filter_map(|l| l.strip_prefix('`'))
            .filter_map(|l| l.split('`').next())
            .collect();
        assert_eq!(keys, vec!["num_memes", "scrape_interval", "subs", "threshold_upvotes"]);

        let reply = h.reply("list thresholds").await;
        let body = reply.strip_prefix(">list thresholds\n").unwrap();
        let parsed: Value = serde_json::from_str(body).unwrap();
        assert_eq!(parsed["global"], 1000);
    }

    #[tokio::test]
    async fn test_store_errors_become_replies() {
        let mut h = harness();
        std::fs::write(h.settings.path(), "{\"subs\": [], \"bogus\": 1}").unwrap();
        let reply = h.reply("list subreddits").await;
        assert!(reply.starts_with(">list subreddits\n:sadparrot: error\n"));

        // Defaults are still valid input for a fresh record
        h.settings.lock().unwrap().write(&Settings::default()).unwrap();
        assert!(h.reply("list subreddits").await.ends_with("me_irl"));
    }
}
