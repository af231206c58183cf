//! The dedupe ledger: durable per-reply state with per-key serialization.
//!
//! The platform delivers webhooks at-least-once; the ledger is what turns
//! that into at-most-once action. Every reply gets exactly one record,
//! created atomically on first sighting. A record in any state suppresses
//! re-ingestion of the same reply.
//!
//! # Per-key serialization
//!
//! The check-then-create in [`DedupeLedger::observe`] must be atomic per
//! reply ID so two concurrent deliveries of the same reply cannot both be
//! classified as "new". A global lock would serialize unrelated replies, so
//! access is serialized through a fixed pool of shard locks indexed by a
//! hash of the reply ID. Two distinct replies contend only on a hash
//! collision, and the same reply always maps to the same lock.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::types::{ProcessedRecord, ReplyId, ReplyStatus};

pub mod store;

pub use store::{JsonStore, RecordStore, StoreError};

/// Number of shard locks. Power of two, sized well above the expected number
/// of concurrently in-flight replies.
const LOCK_SHARDS: usize = 64;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The backing store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Attempted to mutate a record that already reached a terminal status.
    #[error("record for {reply_id} already finalized as {status:?}")]
    AlreadyFinal {
        reply_id: ReplyId,
        status: ReplyStatus,
    },

    /// Attempted to mutate a record that was never created.
    #[error("no record for {0}")]
    NotFound(ReplyId),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Outcome of sighting a reply.
#[derive(Debug, Clone)]
pub struct Sighting {
    /// The record for the reply (fresh or pre-existing).
    pub record: ProcessedRecord,

    /// True if this sighting created the record, i.e. the reply was new.
    pub created: bool,
}

/// Durable per-reply dedupe state over a [`RecordStore`].
pub struct DedupeLedger {
    store: Arc<dyn RecordStore>,
    locks: Vec<Mutex<()>>,
}

impl DedupeLedger {
    /// Creates a ledger over the given store.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        DedupeLedger {
            store,
            locks: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    fn shard(&self, reply_id: &ReplyId) -> &Mutex<()> {
        let mut hasher = std::hash::DefaultHasher::new();
        reply_id.hash(&mut hasher);
        &self.locks[(hasher.finish() as usize) % LOCK_SHARDS]
    }

    /// Records the sighting of a reply, atomically per key.
    ///
    /// Creates a `Pending` record if the reply was never seen; otherwise
    /// returns the existing record untouched. `created == false` means the
    /// reply is a duplicate delivery and must not be re-ingested.
    pub async fn observe(&self, reply_id: &ReplyId, seen_at: DateTime<Utc>) -> Result<Sighting> {
        let _guard = self.shard(reply_id).lock().await;

        if let Some(record) = self.store.get(reply_id)? {
            debug!(reply_id = %reply_id, status = ?record.status, "Duplicate sighting");
            return Ok(Sighting {
                record,
                created: false,
            });
        }

        let record = ProcessedRecord::pending(reply_id.clone(), seen_at);
        self.store.put(&record)?;
        Ok(Sighting {
            record,
            created: true,
        })
    }

    /// Returns true if any record exists for the reply.
    pub async fn has_record(&self, reply_id: &ReplyId) -> Result<bool> {
        let _guard = self.shard(reply_id).lock().await;
        Ok(self.store.get(reply_id)?.is_some())
    }

    /// Fetches the record for a reply, if any.
    pub async fn get(&self, reply_id: &ReplyId) -> Result<Option<ProcessedRecord>> {
        let _guard = self.shard(reply_id).lock().await;
        Ok(self.store.get(reply_id)?)
    }

    /// Bumps the attempt counter for a pending reply.
    ///
    /// Called once per outbound post attempt. Returns the new count.
    pub async fn note_attempt(&self, reply_id: &ReplyId) -> Result<u32> {
        let _guard = self.shard(reply_id).lock().await;

        let mut record = self
            .store
            .get(reply_id)?
            .ok_or_else(|| LedgerError::NotFound(reply_id.clone()))?;

        if record.status.is_terminal() {
            return Err(LedgerError::AlreadyFinal {
                reply_id: reply_id.clone(),
                status: record.status,
            });
        }

        record.attempt_count += 1;
        self.store.put(&record)?;
        Ok(record.attempt_count)
    }

    /// Transitions a pending record to a terminal status.
    ///
    /// Terminal records are immutable: finalizing twice is an error, which
    /// keeps the single transition per reply an enforced contract rather
    /// than an accident of call order. `responded_at` is stamped when the
    /// status is `Processed`.
    pub async fn finalize(
        &self,
        reply_id: &ReplyId,
        status: ReplyStatus,
        detail: Option<String>,
    ) -> Result<ProcessedRecord> {
        debug_assert!(status.is_terminal());

        let _guard = self.shard(reply_id).lock().await;

        let mut record = self
            .store
            .get(reply_id)?
            .ok_or_else(|| LedgerError::NotFound(reply_id.clone()))?;

        if record.status.is_terminal() {
            return Err(LedgerError::AlreadyFinal {
                reply_id: reply_id.clone(),
                status: record.status,
            });
        }

        record.status = status;
        record.detail = detail;
        if status == ReplyStatus::Processed {
            record.responded_at = Some(Utc::now());
        }
        self.store.put(&record)?;
        Ok(record)
    }
}
