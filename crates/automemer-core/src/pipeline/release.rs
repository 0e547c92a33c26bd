//! Admission & release: move threshold-clearing staged memes into the
//! outbound queue, fairly across subs.
//!
//! A release cycle visits subs round-robin in a fixed order. On each visit
//! it pops that sub's oldest staged memes until one clears the threshold
//! (which is published) or the sub runs dry. Every popped meme leaves
//! staging whether or not it was published.

use crate::archive::MemeArchive;
use crate::error::Result;
use crate::outbox::Outbox;
use crate::settings::SettingsStore;
use crate::staging::StagingStore;
use crate::types::{MemeRecord, OutboundMessage};
use chrono::Utc;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Budget floor when no explicit limit is given.
pub const MIN_RELEASE_BUDGET: usize = 10;

pub const RAN_OUT_NOTICE: &str = "Sorry, we ran out of memes :(";

/// Staged meme counts keyed by lower-cased sub.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemeCounts {
    /// Non-adult staged memes
    pub total: BTreeMap<String, usize>,
    /// Non-adult staged memes whose high-water mark meets the threshold
    pub postable: BTreeMap<String, usize>,
}

impl MemeCounts {
    pub fn total_count(&self) -> usize {
        self.total.values().sum()
    }

    pub fn postable_count(&self) -> usize {
        self.postable.values().sum()
    }

    /// Default release budget: a fifth of the postable memes, at least
    /// [`MIN_RELEASE_BUDGET`].
    pub fn default_budget(&self) -> usize {
        MIN_RELEASE_BUDGET.max(self.postable_count() / 5)
    }
}

/// Outcome of one release cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub budget: usize,
    /// Ids published, in release order
    pub released: Vec<String>,
    /// Memes popped without being published
    pub discarded: usize,
}

impl ReleaseReport {
    pub fn remaining_budget(&self) -> usize {
        self.budget - self.released.len()
    }
}

/// Render a meme as the message posted to the meme channel.
pub fn format_meme_message(meme: &MemeRecord) -> String {
    format!(
        "*{}* _(from /r/{})_ `{}`\n{}",
        meme.title.trim_matches('*'),
        meme.source.trim_matches('_'),
        thousands(meme.highest_score),
        meme.url
    )
}

/// `12345` -> `12,345`
fn thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if n < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Round-robin queues of staged memes, one per sub, oldest first.
///
/// Sub order is the order of first appearance when all staged memes are
/// sorted by creation time.
fn partition_by_source(mut memes: Vec<MemeRecord>) -> Vec<VecDeque<MemeRecord>> {
    memes.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let mut order: Vec<String> = Vec::new();
    let mut queues: BTreeMap<String, VecDeque<MemeRecord>> = BTreeMap::new();
    for meme in memes {
        let key = meme.source_key();
        if !queues.contains_key(&key) {
            order.push(key.clone());
        }
        queues.entry(key).or_default().push_back(meme);
    }

    order
        .into_iter()
        .filter_map(|key| queues.remove(&key))
        .collect()
}

/// Releases staged memes into the outbound queue.
pub struct ReleaseEngine {
    settings: Arc<SettingsStore>,
    staging: Arc<StagingStore>,
    archive: Arc<dyn MemeArchive>,
    outbox: Outbox,
    /// Channel released memes and notices are posted to
    channel: String,
}

impl ReleaseEngine {
    pub fn new(
        settings: Arc<SettingsStore>,
        staging: Arc<StagingStore>,
        archive: Arc<dyn MemeArchive>,
        outbox: Outbox,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            settings,
            staging,
            archive,
            outbox,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Count staged memes per sub.
    ///
    /// Adult entries are ignored. A meme is postable when its high-water
    /// mark is at least the threshold for its sub.
    pub fn count_memes(&self) -> Result<MemeCounts> {
        let settings = self.settings.load()?;
        let staged = self.staging.snapshot()?;

        let mut counts = MemeCounts::default();
        for meme in staged.values().filter(|m| !m.is_adult) {
            let key = meme.source_key();
            *counts.total.entry(key.clone()).or_default() += 1;
            let postable = counts.postable.entry(key).or_default();
            if meme.highest_score >= settings.threshold_for(&meme.source) {
                *postable += 1;
            }
        }
        Ok(counts)
    }

    /// Run one release cycle.
    ///
    /// With no `limit` the budget is [`MemeCounts::default_budget`]. When the
    /// cycle was requested by a user and the budget is not exhausted, a
    /// ran-out notice follows the released memes.
    pub fn release(&self, limit: Option<usize>, user_initiated: bool) -> Result<ReleaseReport> {
        let budget = match limit {
            Some(limit) => limit,
            None => self.count_memes()?.default_budget(),
        };
        let settings = self.settings.load()?;

        let mut report = ReleaseReport {
            budget,
            ..Default::default()
        };
        let mut messages = Vec::new();
        {
            let guard = self.staging.lock()?;
            let mut staged = guard.read()?;
            let mut queues = partition_by_source(staged.values().cloned().collect());

            let mut next = 0;
            while report.released.len() < budget && queues.iter().any(|q| !q.is_empty()) {
                let queue = &mut queues[next];
                while let Some(meme) = queue.pop_front() {
                    staged.remove(&meme.url);

                    let threshold = settings.threshold_for(&meme.source);
                    if meme.is_adult || meme.highest_score <= threshold {
                        report.discarded += 1;
                        continue;
                    }

                    if let Err(e) = self.archive.mark_published(&meme.id, Utc::now()) {
                        // Keep the meme staged so a later cycle can retry it
                        staged.insert(meme.url.clone(), meme);
                        guard.write(&staged)?;
                        self.enqueue_all(messages)?;
                        return Err(e);
                    }
                    messages.push(OutboundMessage::new(&self.channel, format_meme_message(&meme)));
                    report.released.push(meme.id);
                    break;
                }
                next = (next + 1) % queues.len();
            }

            guard.write(&staged)?;
        }

        self.enqueue_all(messages)?;
        if user_initiated && report.remaining_budget() > 0 {
            self.outbox.send(OutboundMessage::new(&self.channel, RAN_OUT_NOTICE))?;
        }

        info!(
            budget,
            released = report.released.len(),
            discarded = report.discarded,
            "Release cycle complete"
        );
        Ok(report)
    }

    /// Run a release cycle, reporting any failure to the meme channel.
    pub fn release_or_notify(&self, limit: Option<usize>, user_initiated: bool) -> Option<ReleaseReport> {
        match self.release(limit, user_initiated) {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Release cycle failed: {}", e);
                let notice = format!("There was an error :sadparrot:\n>`{}`", e);
                if let Err(e) = self.outbox.send(OutboundMessage::new(&self.channel, notice)) {
                    warn!("Could not queue error notice: {}", e);
                }
                None
            }
        }
    }

    fn enqueue_all(&self, messages: Vec<OutboundMessage>) -> Result<()> {
        messages.into_iter().try_for_each(|m| self.outbox.send(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::error::Error;
    use crate::outbox::{self, OutboxReceiver};
    use crate::settings::Settings;
    use crate::staging::StagedMemes;
    use crate::testing::{at_minute, meme};

    struct Harness {
        _dir: tempfile::TempDir,
        archive: Arc<Database>,
        settings: Arc<SettingsStore>,
        staging: Arc<StagingStore>,
        engine: ReleaseEngine,
        rx: OutboxReceiver,
    }

    fn harness(global: i64) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let archive = Arc::new(Database::open_in_memory().unwrap());
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")));
        let staging = Arc::new(StagingStore::new(dir.path().join("scraped.json")));

        let mut initial = Settings::default();
        initial.thresholds.global = global;
        settings.lock().unwrap().write(&initial).unwrap();
        staging.ensure_exists().unwrap();

        let (tx, rx) = outbox::channel();
        let engine = ReleaseEngine::new(settings.clone(), staging.clone(), archive.clone(), tx, "C_MEMES");
        Harness {
            _dir: dir,
            archive,
            settings,
            staging,
            engine,
            rx,
        }
    }

    /// Archive and stage a meme created `minute` minutes into the test day.
    fn stage(h: &Harness, id: &str, sub: &str, score: i64, minute: i64) -> MemeRecord {
        let mut m = meme(id, sub, score);
        m.created_at = at_minute(minute);
        h.archive.insert(&m).unwrap();

        let guard = h.staging.lock().unwrap();
        let mut staged = guard.read().unwrap();
        staged.insert(m.url.clone(), m.clone());
        guard.write(&staged).unwrap();
        m
    }

    fn released_ids(rx: &mut OutboxReceiver) -> Vec<String> {
        rx.drain()
            .into_iter()
            .filter_map(|m| {
                m.text
                    .lines()
                    .nth(1)
                    .and_then(|url| url.strip_prefix("https://i.redd.it/"))
                    .and_then(|file| file.strip_suffix(".png"))
                    .map(str::to_string)
            })
            .collect()
    }

    #[test]
    fn test_thousands() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1000), "1,000");
        assert_eq!(thousands(12345), "12,345");
        assert_eq!(thousands(1234567), "1,234,567");
        assert_eq!(thousands(-4321), "-4,321");
    }

    #[test]
    fn test_format_meme_message() {
        let mut m = meme("a1", "_me_irl_", 12345);
        m.title = "**bold title**".to_string();
        assert_eq!(
            format_meme_message(&m),
            "*bold title* _(from /r/me_irl)_ `12,345`\nhttps://i.redd.it/a1.png"
        );
    }

    #[test]
    fn test_default_budget() {
        let mut counts = MemeCounts::default();
        assert_eq!(counts.default_budget(), 10);
        counts.postable.insert("a".into(), 49);
        assert_eq!(counts.default_budget(), 10);
        counts.postable.insert("b".into(), 51);
        assert_eq!(counts.default_budget(), 20);
    }

    #[test]
    fn test_round_robin_fairness() {
        let mut h = harness(10);
        stage(&h, "a1", "A", 100, 0);
        stage(&h, "a2", "A", 100, 1);
        stage(&h, "a3", "A", 100, 2);
        stage(&h, "b1", "B", 100, 3);

        let report = h.engine.release(Some(2), false).unwrap();

        assert_eq!(report.released, vec!["a1", "b1"]);
        assert_eq!(released_ids(&mut h.rx), vec!["a1", "b1"]);
        let remaining: Vec<_> = h.staging.snapshot().unwrap().into_values().map(|m| m.id).collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&"a2".to_string()) && remaining.contains(&"a3".to_string()));
        assert!(h.archive.get("a1").unwrap().unwrap().published);
        assert!(!h.archive.get("a2").unwrap().unwrap().published);
    }

    #[test]
    fn test_rejected_memes_are_removed_and_budget_is_min() {
        let mut h = harness(50);
        stage(&h, "a1", "A", 10, 0); // rejected
        stage(&h, "a2", "A", 60, 1);
        stage(&h, "b1", "B", 50, 2); // equal is not enough
        stage(&h, "b2", "B", 70, 3);
        stage(&h, "c1", "C", 5, 4); // rejected, C runs dry

        let report = h.engine.release(Some(10), false).unwrap();

        assert_eq!(report.released, vec!["a2", "b2"]);
        assert_eq!(report.discarded, 3);
        assert_eq!(released_ids(&mut h.rx), vec!["a2", "b2"]);
        assert!(h.staging.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_per_source_threshold_override() {
        let mut h = harness(1000);
        h.settings
            .update(|s| {
                s.thresholds.per_source.insert("a".into(), 5);
            })
            .unwrap();
        stage(&h, "a1", "A", 6, 0);
        stage(&h, "b1", "B", 6, 1);

        let report = h.engine.release(Some(5), false).unwrap();
        assert_eq!(report.released, vec!["a1"]);
        assert_eq!(released_ids(&mut h.rx), vec!["a1"]);
    }

    #[test]
    fn test_adult_entries_never_released() {
        let mut h = harness(1);
        let mut m = stage(&h, "a1", "A", 100, 0);
        m.is_adult = true;
        let mut staged = StagedMemes::new();
        staged.insert(m.url.clone(), m);
        h.staging.lock().unwrap().write(&staged).unwrap();

        let counts = h.engine.count_memes().unwrap();
        assert_eq!(counts.total_count(), 0);

        let report = h.engine.release(Some(1), false).unwrap();
        assert!(report.released.is_empty());
        assert!(h.rx.drain().is_empty());
        assert!(h.staging.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_ran_out_notice_only_when_user_initiated() {
        let mut h = harness(10);
        stage(&h, "a1", "A", 100, 0);
        h.engine.release(Some(3), false).unwrap();
        let texts: Vec<_> = h.rx.drain().into_iter().map(|m| m.text).collect();
        assert_eq!(texts.len(), 1);

        stage(&h, "a2", "A", 100, 1);
        h.engine.release(Some(3), true).unwrap();
        let messages = h.rx.drain();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, RAN_OUT_NOTICE);
        assert_eq!(messages[1].channel, "C_MEMES");
    }

    #[test]
    fn test_default_budget_releases_at_most_ten() {
        let mut h = harness(10);
        for i in 0..12 {
            stage(&h, &format!("m{i:02}"), "A", 100, i);
        }

        let report = h.engine.release(None, false).unwrap();
        assert_eq!(report.budget, 10);
        assert_eq!(report.released.len(), 10);
        assert_eq!(h.rx.drain().len(), 10);
        assert_eq!(h.staging.snapshot().unwrap().len(), 2);
    }

    #[test]
    fn test_count_memes() {
        let h = harness(100);
        stage(&h, "a1", "Funny", 100, 0);
        stage(&h, "a2", "funny", 99, 1);
        stage(&h, "b1", "Memes", 500, 2);

        let counts = h.engine.count_memes().unwrap();
        assert_eq!(counts.total["funny"], 2);
        assert_eq!(counts.postable["funny"], 1);
        assert_eq!(counts.postable["memes"], 1);
        assert_eq!(counts.total_count(), 3);
        assert_eq!(counts.postable_count(), 2);
    }

    #[test]
    fn test_publish_failure_keeps_meme_staged() {
        let mut h = harness(10);
        // Staged but never archived, so publishing it fails
        let m = meme("ghost", "A", 100);
        let mut staged = StagedMemes::new();
        staged.insert(m.url.clone(), m.clone());
        h.staging.lock().unwrap().write(&staged).unwrap();

        let err = h.engine.release(Some(1), false).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(h.staging.snapshot().unwrap().contains_key(&m.url));
        assert!(h.rx.drain().is_empty());

        assert!(h.engine.release_or_notify(Some(1), false).is_none());
        let notice = h.rx.try_recv().unwrap();
        assert!(notice.text.starts_with("There was an error :sadparrot:\n>`"));
    }
}
