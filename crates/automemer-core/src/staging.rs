//! Staged memes: collected but not yet evaluated for release.
//!
//! Persisted as `scraped.json`, a map from content URL to the latest
//! `MemeRecord` snapshot for that URL.

use crate::error::{Error, Result};
use crate::persist::{read_json, write_json_atomic};
use crate::types::MemeRecord;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{error, trace};

/// Content URL -> staged snapshot.
pub type StagedMemes = BTreeMap<String, MemeRecord>;

/// File-backed staging set guarded by its own lock.
pub struct StagingStore {
    path: PathBuf,
    lock: Mutex<()>,
}

/// Exclusive access to the staging file; released on drop.
pub struct StagingGuard<'a> {
    path: &'a Path,
    _guard: MutexGuard<'a, ()>,
}

impl StagingGuard<'_> {
    pub fn read(&self) -> Result<StagedMemes> {
        read_json(self.path)
    }

    /// Read the staged set, starting from empty if it cannot be read.
    ///
    /// Anything that was staged in an unreadable file is lost once the
    /// caller writes back.
    pub fn read_or_empty(&self) -> StagedMemes {
        match self.read() {
            Ok(memes) => memes,
            Err(e) => {
                error!(path = %self.path.display(), "Failed to read staged memes, starting empty: {}", e);
                StagedMemes::new()
            }
        }
    }

    pub fn write(&self, memes: &StagedMemes) -> Result<()> {
        write_json_atomic(self.path, memes)
    }
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        trace!("staging lock released");
    }
}

impl StagingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the staging lock.
    pub fn lock(&self) -> Result<StagingGuard<'_>> {
        let guard = self.lock.lock().map_err(|_| Error::LockPoisoned)?;
        trace!("staging lock acquired");
        Ok(StagingGuard {
            path: &self.path,
            _guard: guard,
        })
    }

    /// Write an empty staging file if none exists yet.
    pub fn ensure_exists(&self) -> Result<()> {
        let guard = self.lock()?;
        if !self.path.exists() {
            guard.write(&StagedMemes::new())?;
        }
        Ok(())
    }

    /// Read the current staged set.
    pub fn snapshot(&self) -> Result<StagedMemes> {
        self.lock()?.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::meme;

    #[test]
    fn test_ensure_exists_creates_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(dir.path().join("scraped.json"));

        store.ensure_exists().unwrap();
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_write_and_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(dir.path().join("scraped.json"));

        let m = meme("a1", "funny", 10);
        let mut staged = StagedMemes::new();
        staged.insert(m.url.clone(), m.clone());
        store.lock().unwrap().write(&staged).unwrap();

        let loaded = store.snapshot().unwrap();
        assert_eq!(loaded.get(&m.url), Some(&m));
    }

    #[test]
    fn test_read_or_empty_on_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(dir.path().join("scraped.json"));
        std::fs::write(store.path(), "[1, 2").unwrap();

        let guard = store.lock().unwrap();
        assert!(guard.read().is_err());
        assert!(guard.read_or_empty().is_empty());
    }

    #[test]
    fn test_file_uses_over_18_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = StagingStore::new(dir.path().join("scraped.json"));

        let m = meme("a1", "funny", 10);
        let mut staged = StagedMemes::new();
        staged.insert(m.url.clone(), m);
        store.lock().unwrap().write(&staged).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"over_18\": false"));
    }
}
