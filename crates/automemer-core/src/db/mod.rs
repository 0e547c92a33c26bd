//! SQLite-backed meme archive.
//!
//! One `posts` table keyed by the source id, with an index on the content
//! URL for cross-post lookups.

use crate::archive::MemeArchive;
use crate::error::{Error, Result};
use crate::types::MemeRecord;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS posts (
    id              TEXT PRIMARY KEY,
    over_18         INTEGER NOT NULL,
    ups             INTEGER NOT NULL,
    highest_ups     INTEGER NOT NULL,
    title           TEXT NOT NULL,
    url             TEXT NOT NULL,
    link            TEXT NOT NULL,
    author          TEXT NOT NULL,
    sub             TEXT NOT NULL,
    upvote_ratio    REAL NOT NULL,
    created_utc     TEXT NOT NULL,
    last_updated    TEXT NOT NULL,
    recorded        TEXT NOT NULL,
    posted_to_slack INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_posts_url ON posts(url);
";

const SELECT_COLUMNS: &str = "SELECT id, sub, title, url, link, over_18, ups, highest_ups,
        upvote_ratio, author, created_utc, recorded, last_updated, posted_to_slack
 FROM posts";

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (and if needed create) the archive at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(Error::Database)?;
        Self::init(conn)
    }

    /// Open a throwaway in-memory archive
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::Database)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute_batch("SELECT 1").map_err(Error::Database)
    }

    /// Number of archived memes
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn map_meme(row: &rusqlite::Row) -> rusqlite::Result<MemeRecord> {
        Ok(MemeRecord {
            id: row.get(0)?,
            source: row.get(1)?,
            title: row.get(2)?,
            url: row.get(3)?,
            permalink: row.get(4)?,
            is_adult: row.get(5)?,
            score: row.get(6)?,
            highest_score: row.get(7)?,
            score_ratio: row.get(8)?,
            author: row.get(9)?,
            created_at: row.get(10)?,
            first_seen_at: row.get(11)?,
            last_updated_at: row.get(12)?,
            published: row.get(13)?,
        })
    }
}

impl MemeArchive for Database {
    fn get(&self, id: &str) -> Result<Option<MemeRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;

        Ok(stmt.query_row(params![id], Self::map_meme).optional()?)
    }

    fn find_by_url(&self, url: &str) -> Result<Vec<MemeRecord>> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let mut stmt = conn.prepare(&format!(
            "{SELECT_COLUMNS} WHERE url = ?1 ORDER BY recorded, id"
        ))?;

        let memes = stmt
            .query_map(params![url], Self::map_meme)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(memes)
    }

    fn insert(&self, meme: &MemeRecord) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        conn.execute(
            "INSERT INTO posts
             (id, over_18, ups, highest_ups, title, url, link, author, sub,
              upvote_ratio, created_utc, last_updated, recorded, posted_to_slack)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                meme.id,
                meme.is_adult,
                meme.score,
                meme.highest_score,
                meme.title,
                meme.url,
                meme.permalink,
                meme.author,
                meme.source,
                meme.score_ratio,
                meme.created_at,
                meme.last_updated_at,
                meme.first_seen_at,
                meme.published,
            ],
        )?;
        debug!(id = %meme.id, "archived new meme");
        Ok(())
    }

    fn update(&self, meme: &MemeRecord) -> Result<MemeRecord> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let changed = conn.execute(
            "UPDATE posts
             SET ups = ?1, highest_ups = MAX(highest_ups, ?1, ?2), last_updated = ?3,
                 posted_to_slack = MAX(posted_to_slack, ?4), upvote_ratio = ?5
             WHERE id = ?6",
            params![
                meme.score,
                meme.highest_score,
                meme.last_updated_at,
                meme.published,
                meme.score_ratio,
                meme.id,
            ],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("archived meme {}", meme.id)));
        }

        let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
        Ok(stmt.query_row(params![meme.id], Self::map_meme)?)
    }

    fn mark_published(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let changed = conn.execute(
            "UPDATE posts SET posted_to_slack = 1, last_updated = ?1 WHERE id = ?2",
            params![at, id],
        )?;
        if changed == 0 {
            return Err(Error::NotFound(format!("archived meme {id}")));
        }
        Ok(())
    }

    fn url_published(&self, url: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| Error::LockPoisoned)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE url = ?1 AND posted_to_slack = 1",
            params![url],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
