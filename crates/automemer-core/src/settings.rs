//! Runtime settings: watched subs, admission thresholds and publish interval.
//!
//! Persisted as `settings.json`:
//!
//! ```json
//! {
//!   "subs": ["dankmemes", "me_irl"],
//!   "threshold_upvotes": { "global": 1000, "me_irl": 2500 },
//!   "scrape_interval": 60,
//!   "num_memes": 50
//! }
//! ```
//!
//! `scrape_interval` is the publish interval in minutes; the key name is
//! kept for compatibility with existing files.

use crate::error::{Error, Result};
use crate::persist::{read_json, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, trace};

/// Sub scraped when no settings can be read.
pub const DEFAULT_SUB: &str = "me_irl";
/// Posts fetched per sub when no settings can be read.
pub const DEFAULT_FETCH_COUNT: u32 = 50;
/// Publish interval used when no settings can be read.
pub const DEFAULT_PUBLISH_INTERVAL: u32 = 60;
pub const DEFAULT_GLOBAL_THRESHOLD: i64 = 1000;
/// Publish intervals must stay below one day.
pub const MINUTES_PER_DAY: u32 = 1440;

/// Admission thresholds: a global value plus per-sub overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub global: i64,
    #[serde(flatten)]
    pub per_source: BTreeMap<String, i64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            global: DEFAULT_GLOBAL_THRESHOLD,
            per_source: BTreeMap::new(),
        }
    }
}

impl Thresholds {
    /// Threshold for a lower-cased source name.
    pub fn for_source(&self, source_key: &str) -> i64 {
        self.per_source.get(source_key).copied().unwrap_or(self.global)
    }
}

/// The process-wide settings record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(rename = "subs", default = "default_subs")]
    pub watched_sources: BTreeSet<String>,

    #[serde(rename = "threshold_upvotes", default)]
    pub thresholds: Thresholds,

    #[serde(rename = "scrape_interval", default = "default_publish_interval")]
    pub publish_interval_minutes: u32,

    #[serde(rename = "num_memes", default = "default_fetch_count")]
    pub fetch_count: u32,
}

fn default_subs() -> BTreeSet<String> {
    BTreeSet::from([DEFAULT_SUB.to_string()])
}

fn default_publish_interval() -> u32 {
    DEFAULT_PUBLISH_INTERVAL
}

fn default_fetch_count() -> u32 {
    DEFAULT_FETCH_COUNT
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            watched_sources: default_subs(),
            thresholds: Thresholds::default(),
            publish_interval_minutes: default_publish_interval(),
            fetch_count: default_fetch_count(),
        }
    }
}

impl Settings {
    /// Threshold that applies to a (display- or lower-cased) source name.
    pub fn threshold_for(&self, source: &str) -> i64 {
        self.thresholds.for_source(&source.to_lowercase())
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.thresholds.global < 1 {
            return Err(Error::InvalidSettings(format!(
                "global threshold must be at least 1, got {}",
                self.thresholds.global
            )));
        }
        if let Some((sub, value)) = self.thresholds.per_source.iter().find(|(_, v)| **v < 1) {
            return Err(Error::InvalidSettings(format!(
                "threshold for {sub} must be at least 1, got {value}"
            )));
        }
        if self.publish_interval_minutes == 0 || self.publish_interval_minutes >= MINUTES_PER_DAY {
            return Err(Error::InvalidSettings(format!(
                "scrape_interval must be between 1 and {}, got {}",
                MINUTES_PER_DAY - 1,
                self.publish_interval_minutes
            )));
        }
        Ok(())
    }
}

/// File-backed settings record guarded by its own lock.
pub struct SettingsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

/// Exclusive access to the settings file; released on drop.
pub struct SettingsGuard<'a> {
    path: &'a Path,
    _guard: MutexGuard<'a, ()>,
}

impl SettingsGuard<'_> {
    pub fn read(&self) -> Result<Settings> {
        let settings: Settings = read_json(self.path)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn write(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;
        write_json_atomic(self.path, settings)
    }
}

impl Drop for SettingsGuard<'_> {
    fn drop(&mut self) {
        trace!("settings lock released");
    }
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the settings lock.
    pub fn lock(&self) -> Result<SettingsGuard<'_>> {
        let guard = self.lock.lock().map_err(|_| Error::LockPoisoned)?;
        trace!("settings lock acquired");
        Ok(SettingsGuard {
            path: &self.path,
            _guard: guard,
        })
    }

    /// Write the default record if no settings file exists yet.
    pub fn ensure_exists(&self) -> Result<()> {
        let guard = self.lock()?;
        if !self.path.exists() {
            guard.write(&Settings::default())?;
        }
        Ok(())
    }

    /// Read the current settings.
    pub fn load(&self) -> Result<Settings> {
        self.lock()?.read()
    }

    /// Read the current settings, falling back to defaults on any failure.
    pub fn load_or_default(&self) -> Settings {
        match self.load() {
            Ok(settings) => settings,
            Err(e) => {
                error!(path = %self.path.display(), "Failed to read settings, using defaults: {}", e);
                Settings::default()
            }
        }
    }

    /// Read-modify-write the whole record under the lock.
    ///
    /// The file is only rewritten when `f` actually changed something.
    pub fn update<T>(&self, f: impl FnOnce(&mut Settings) -> T) -> Result<T> {
        let guard = self.lock()?;
        let before = guard.read()?;
        let mut after = before.clone();
        let out = f(&mut after);
        if after != before {
            guard.write(&after)?;
        }
        Ok(out)
    }
}
