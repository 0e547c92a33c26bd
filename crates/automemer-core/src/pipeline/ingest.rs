//! Ingestion: fetch hot posts for every watched sub and merge them into the
//! archive and the staging set.
//!
//! Network calls happen with no store lock held. The staging lock is taken
//! once, for the merge, and the staging file is rewritten before it is
//! released.

use crate::archive::MemeArchive;
use crate::error::Result;
use crate::settings::SettingsStore;
use crate::source::ContentSource;
use crate::staging::{StagedMemes, StagingStore};
use crate::types::{MemeRecord, SourcePost};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Progress notifications emitted during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestProgress<'a> {
    /// The pass will fetch this many subs.
    Started { sources: usize },
    /// One sub has been fetched (or skipped after an error).
    Fetched { sub: &'a str, posts: usize },
    /// All fetches are done; merging into the stores.
    Merging,
}

pub type ProgressFn = Arc<dyn Fn(IngestProgress<'_>) + Send + Sync>;

/// Summary of one ingestion pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Subs that were fetched
    pub sources: Vec<String>,
    /// Subs excluded because they are adult-only or could not be checked
    pub skipped_sources: Vec<String>,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Records written to the staging set
    pub staged: usize,
    /// Records whose merge failed
    pub failed: usize,
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} subs ({} skipped), {} posts: {} new, {} updated, {} staged, {} failed",
            self.sources.len(),
            self.skipped_sources.len(),
            self.fetched,
            self.inserted,
            self.updated,
            self.staged,
            self.failed
        )
    }
}

enum Merge {
    Inserted { staged: bool },
    Updated { staged: bool },
}

/// Runs ingestion passes and archive refreshes.
#[derive(Clone)]
pub struct Ingestor {
    source: Arc<dyn ContentSource>,
    archive: Arc<dyn MemeArchive>,
    settings: Arc<SettingsStore>,
    staging: Arc<StagingStore>,
    progress: Option<ProgressFn>,
}

impl Ingestor {
    pub fn new(
        source: Arc<dyn ContentSource>,
        archive: Arc<dyn MemeArchive>,
        settings: Arc<SettingsStore>,
        staging: Arc<StagingStore>,
    ) -> Self {
        Self {
            source,
            archive,
            settings,
            staging,
            progress: None,
        }
    }

    /// Report progress through `progress` during [`Ingestor::run`].
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    fn notify(&self, event: IngestProgress<'_>) {
        if let Some(progress) = &self.progress {
            progress(event);
        }
    }

    /// One full ingestion pass.
    pub async fn run(&self) -> Result<IngestReport> {
        let settings = self.settings.load_or_default();
        let mut report = IngestReport::default();

        // Subs come out of the settings set already sorted
        let mut sources = Vec::new();
        for sub in &settings.watched_sources {
            match self.source.is_adult(sub).await {
                Ok(false) => sources.push(sub.clone()),
                Ok(true) => {
                    info!(%sub, "Skipping adult-only sub");
                    report.skipped_sources.push(sub.clone());
                }
                Err(e) => {
                    warn!(%sub, "Skipping sub, visibility lookup failed: {}", e);
                    report.skipped_sources.push(sub.clone());
                }
            }
        }

        self.notify(IngestProgress::Started { sources: sources.len() });

        let mut posts = Vec::new();
        for sub in &sources {
            match self.source.fetch_hot(sub, settings.fetch_count).await {
                Ok(batch) => {
                    debug!(%sub, count = batch.len(), "Fetched hot posts");
                    self.notify(IngestProgress::Fetched { sub, posts: batch.len() });
                    posts.extend(batch);
                }
                Err(e) => {
                    error!(%sub, "Failed to fetch hot posts: {}", e);
                    self.notify(IngestProgress::Fetched { sub, posts: 0 });
                }
            }
        }
        report.sources = sources;
        report.fetched = posts.len();

        self.notify(IngestProgress::Merging);
        self.merge(posts, Utc::now(), &mut report)?;

        info!(%report, "Ingestion pass complete");
        Ok(report)
    }

    /// Merge a batch of fetched posts under the staging lock.
    fn merge(&self, posts: Vec<SourcePost>, now: DateTime<Utc>, report: &mut IngestReport) -> Result<()> {
        let guard = self.staging.lock()?;
        let mut staged = guard.read_or_empty();

        for post in posts {
            let id = post.id.clone();
            match self.merge_post(&mut staged, post, now) {
                Ok(Merge::Inserted { staged: was_staged }) => {
                    report.inserted += 1;
                    report.staged += usize::from(was_staged);
                }
                Ok(Merge::Updated { staged: was_staged }) => {
                    report.updated += 1;
                    report.staged += usize::from(was_staged);
                }
                Err(e) => {
                    error!(%id, "Failed to merge post: {}", e);
                    report.failed += 1;
                }
            }
        }

        guard.write(&staged)
    }

    /// Merge one post into the archive and, if eligible, the staging set.
    ///
    /// A URL collision in staging is resolved in favour of the record merged
    /// last.
    fn merge_post(&self, staged: &mut StagedMemes, post: SourcePost, now: DateTime<Utc>) -> Result<Merge> {
        match self.archive.get(&post.id)? {
            None => {
                let record = MemeRecord::from_post(post, now);
                self.archive.insert(&record)?;
                if record.is_adult {
                    return Ok(Merge::Inserted { staged: false });
                }
                staged.insert(record.url.clone(), record);
                Ok(Merge::Inserted { staged: true })
            }
            Some(mut record) => {
                let is_adult = record.is_adult || post.over_18;
                record.observe(post.ups, post.upvote_ratio, now);
                let record = self.archive.update(&record)?;

                if is_adult || self.archive.url_published(&record.url)? {
                    return Ok(Merge::Updated { staged: false });
                }
                staged.insert(record.url.clone(), record);
                Ok(Merge::Updated { staged: true })
            }
        }
    }

    /// Re-fetch every archived record sharing `url` and persist the fresh
    /// scores.
    ///
    /// Records whose refresh fails are returned as stored. An empty result
    /// means the URL was never archived.
    pub async fn refresh_by_url(&self, url: &str) -> Result<Vec<MemeRecord>> {
        let mut records = self.archive.find_by_url(url)?;

        for record in records.iter_mut() {
            match self.source.fetch_by_id(&record.id).await {
                Ok(post) => {
                    record.observe(post.ups, post.upvote_ratio, Utc::now());
                    match self.archive.update(record) {
                        Ok(stored) => *record = stored,
                        Err(e) => warn!(id = %record.id, "Failed to persist refreshed meme: {}", e),
                    }
                }
                Err(e) => {
                    warn!(id = %record.id, "Failed to refresh meme, using archived data: {}", e);
                }
            }
        }

        Ok(records)
    }
}
