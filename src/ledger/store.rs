//! Durable keyed storage for ledger records.
//!
//! The ledger only needs a keyed table (`get`/`put` by reply ID), expressed
//! as the [`RecordStore`] trait so any durable row store can back it. The
//! shipped implementation, [`JsonStore`], keeps one JSON file per reply in a
//! directory and writes with the temp-then-rename pattern:
//!
//! 1. Write to `<reply-id>.json.tmp`
//! 2. fsync the temp file
//! 3. Rename to `<reply-id>.json`
//! 4. fsync the directory
//!
//! Without the directory fsync, a rename may not survive a power loss even
//! when the file contents were synced.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::types::{ProcessedRecord, ReplyId};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reply ID unusable as a storage key (path separators etc.).
    #[error("invalid reply ID for storage: {0}")]
    InvalidKey(ReplyId),
}

/// A keyed table of ledger records.
///
/// Implementations must make `put` durable before returning; the ledger's
/// idempotency guarantee is only as strong as the store's durability.
pub trait RecordStore: Send + Sync {
    /// Fetches the record for a reply, or `None` if never seen.
    fn get(&self, reply_id: &ReplyId) -> Result<Option<ProcessedRecord>, StoreError>;

    /// Inserts or replaces the record for `record.reply_id`.
    fn put(&self, record: &ProcessedRecord) -> Result<(), StoreError>;
}

/// Validates that a reply ID is safe to use in filenames.
///
/// Rejects empty IDs, path separators, null bytes, and dot-prefixed names
/// (hidden files, `.` / `..` traversal).
fn validate_key(reply_id: &ReplyId) -> Result<(), StoreError> {
    let id = reply_id.as_str();

    if id.is_empty()
        || id.contains('/')
        || id.contains('\\')
        || id.contains('\0')
        || id.starts_with('.')
    {
        return Err(StoreError::InvalidKey(reply_id.clone()));
    }

    Ok(())
}

fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Directory-of-JSON-files record store.
///
/// One file per reply: `<dir>/<reply-id>.json`. Records are never deleted by
/// the pipeline; the directory is the append-only audit trail.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    /// Opens (and creates if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(JsonStore { dir })
    }

    fn record_path(&self, reply_id: &ReplyId) -> PathBuf {
        self.dir.join(format!("{}.json", reply_id.as_str()))
    }

    fn temp_path(&self, reply_id: &ReplyId) -> PathBuf {
        self.dir.join(format!("{}.json.tmp", reply_id.as_str()))
    }
}

impl RecordStore for JsonStore {
    fn get(&self, reply_id: &ReplyId) -> Result<Option<ProcessedRecord>, StoreError> {
        validate_key(reply_id)?;

        let bytes = match std::fs::read(self.record_path(reply_id)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn put(&self, record: &ProcessedRecord) -> Result<(), StoreError> {
        validate_key(&record.reply_id)?;

        let bytes = serde_json::to_vec_pretty(record)?;
        let temp_path = self.temp_path(&record.reply_id);
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(&bytes)?;
            fsync_file(&file)?;
        }

        std::fs::rename(&temp_path, self.record_path(&record.reply_id))?;
        fsync_dir(&self.dir)?;

        Ok(())
    }
}
