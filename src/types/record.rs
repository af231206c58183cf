//! Ledger records for processed replies.
//!
//! A [`ProcessedRecord`] is the durable, append-only audit row for one reply.
//! Records are created on first sighting and finalized exactly once; a
//! terminal record is immutable and is never deleted by the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ReplyId;

/// Lifecycle state of a reply in the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// Seen and claimed by the pipeline, outcome not yet decided.
    ///
    /// A `Pending` record is what makes the enqueue transition at-most-once:
    /// a concurrent duplicate delivery finds the record and is ignored.
    Pending,

    /// An automated response was posted successfully.
    Processed,

    /// No rule matched (or rendering failed); no response was posted.
    Skipped,

    /// Posting failed terminally, or the retry budget was exhausted,
    /// or the dispatch queue was saturated.
    Failed,
}

impl ReplyStatus {
    /// Returns true for statuses that end the record's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReplyStatus::Pending)
    }
}

/// The ledger entry for one reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    /// The reply this record tracks. Unique key.
    pub reply_id: ReplyId,

    /// Current lifecycle state.
    pub status: ReplyStatus,

    /// Number of dispatch attempts made so far.
    ///
    /// Zero until the first outbound post is attempted; bounded by the
    /// dispatcher's retry budget.
    pub attempt_count: u32,

    /// When the reply was first seen.
    pub first_seen_at: DateTime<Utc>,

    /// When the automated response was posted. Only set on `Processed`.
    pub responded_at: Option<DateTime<Utc>>,

    /// Free-form outcome detail (skip reason, last error message).
    pub detail: Option<String>,
}

impl ProcessedRecord {
    /// Creates a fresh `Pending` record for a first-sighted reply.
    pub fn pending(reply_id: ReplyId, first_seen_at: DateTime<Utc>) -> Self {
        ProcessedRecord {
            reply_id,
            status: ReplyStatus::Pending,
            attempt_count: 0,
            first_seen_at,
            responded_at: None,
            detail: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_is_not_terminal() {
        assert!(!ReplyStatus::Pending.is_terminal());
    }

    #[test]
    fn outcome_statuses_are_terminal() {
        assert!(ReplyStatus::Processed.is_terminal());
        assert!(ReplyStatus::Skipped.is_terminal());
        assert!(ReplyStatus::Failed.is_terminal());
    }

    #[test]
    fn fresh_record_has_no_attempts() {
        let record = ProcessedRecord::pending(ReplyId::new("r1"), Utc::now());
        assert_eq!(record.status, ReplyStatus::Pending);
        assert_eq!(record.attempt_count, 0);
        assert!(record.responded_at.is_none());
        assert!(record.detail.is_none());
    }

    #[test]
    fn serde_roundtrip() {
        let record = ProcessedRecord {
            reply_id: ReplyId::new("r-42"),
            status: ReplyStatus::Processed,
            attempt_count: 3,
            first_seen_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            responded_at: Some(DateTime::from_timestamp(1_700_000_060, 0).unwrap()),
            detail: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: ProcessedRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, parsed);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ReplyStatus::Processed).unwrap();
        assert_eq!(json, "\"processed\"");
        let json = serde_json::to_string(&ReplyStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
    }
}
