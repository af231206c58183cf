//! Webhook payload parser.
//!
//! Parses a raw webhook body into typed [`ReplyEvent`]s. One delivery may
//! batch several reply notifications in a single envelope.
//!
//! # Parsing Strategy
//!
//! Raw payload structures mirror the platform's JSON with `Option<T>` for
//! fields we validate explicitly, so a missing field produces a precise
//! error instead of a generic serde message.
//!
//! The envelope's per-delivery `event_id` is logged for traceability and then
//! dropped: redeliveries of the same reply carry fresh event IDs, so the
//! reply ID is the only identity the rest of the pipeline sees.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::types::{AuthorId, EventId, PostId, ReplyEvent, ReplyId};

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes type mismatches).
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field was missing or empty.
    #[error("missing or empty field: {field} (event {index})")]
    MissingField { field: &'static str, index: usize },

    /// The envelope contained no events.
    #[error("empty event batch")]
    EmptyBatch,
}

/// The delivery envelope. All reply notifications arrive inside `events`.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    events: Vec<RawReplyNotification>,
}

#[derive(Debug, Deserialize)]
struct RawReplyNotification {
    event_id: Option<EventId>,
    post_id: Option<String>,
    reply_id: Option<String>,
    author: Option<RawAuthor>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    id: Option<String>,
    handle: Option<String>,
}

/// Parses a webhook payload into typed reply events.
///
/// # Arguments
///
/// * `payload` - The raw (signature-verified) JSON body
/// * `received_at` - Timestamp to stamp onto every event in the batch
///
/// # Errors
///
/// Returns `ParseError` on malformed JSON, a missing required field, or an
/// empty batch. The caller responds 400; the platform's own redelivery is
/// the retry mechanism.
pub fn parse_events(
    payload: &[u8],
    received_at: DateTime<Utc>,
) -> Result<Vec<ReplyEvent>, ParseError> {
    let envelope: RawEnvelope = serde_json::from_slice(payload)?;

    if envelope.events.is_empty() {
        return Err(ParseError::EmptyBatch);
    }

    envelope
        .events
        .into_iter()
        .enumerate()
        .map(|(index, raw)| validate_notification(raw, index, received_at))
        .collect()
}

fn validate_notification(
    raw: RawReplyNotification,
    index: usize,
    received_at: DateTime<Utc>,
) -> Result<ReplyEvent, ParseError> {
    let require = |value: Option<String>, field: &'static str| {
        value
            .filter(|s| !s.is_empty())
            .ok_or(ParseError::MissingField { field, index })
    };

    let post_id = require(raw.post_id, "post_id")?;
    let reply_id = require(raw.reply_id, "reply_id")?;
    let author = raw.author.ok_or(ParseError::MissingField {
        field: "author",
        index,
    })?;
    let author_id = require(author.id, "author.id")?;
    let author_handle = require(author.handle, "author.handle")?;
    let text = raw.text.ok_or(ParseError::MissingField {
        field: "text",
        index,
    })?;

    if let Some(event_id) = &raw.event_id {
        debug!(event_id = %event_id, reply_id = %reply_id, "Parsed reply notification");
    }

    Ok(ReplyEvent {
        post_id: PostId::new(post_id),
        reply_id: ReplyId::new(reply_id),
        author_id: AuthorId::new(author_id),
        author_handle,
        text,
        received_at,
    })
}
