//! Webhook endpoint handler.
//!
//! Per inbound call the handler walks a fixed pipeline: verify the
//! signature, parse the payload, dedupe each reply against the ledger,
//! classify, and either queue a response task or record why not. The call
//! is acknowledged as soon as tasks are queued; posting happens later in
//! the dispatcher. The platform enforces a response deadline on webhook
//! calls and treats slow acknowledgment as failed delivery, so nothing on
//! this path waits on the platform API.
//!
//! # Response codes
//!
//! - 202 Accepted: every outcome after authentication and parsing, including
//!   duplicates, ignored replies, and saturated-queue failures. Returning
//!   success is what stops the platform from redelivering.
//! - 400 Bad Request: malformed payload. The platform's redelivery is the
//!   retry path, and the dedupe ledger absorbs the duplicates it causes.
//! - 401 Unauthorized: missing or invalid signature.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::classifier::{ActionDecision, classify};
use crate::dispatch::ReplyPoster;
use crate::ledger::LedgerError;
use crate::types::{ReplyEvent, ReplyStatus};
use crate::webhooks::{ParseError, parse_events, verify_signature};

/// Header carrying the HMAC-SHA256 payload signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Errors that reject a webhook call.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature header absent.
    #[error("missing signature header")]
    MissingSignature,

    /// Signature did not match the payload.
    #[error("invalid signature")]
    InvalidSignature,

    /// Payload failed to parse.
    #[error("malformed payload: {0}")]
    MalformedPayload(#[from] ParseError),

    /// Ledger unavailable.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingSignature | WebhookError::InvalidSignature => {
                StatusCode::UNAUTHORIZED
            }
            WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Per-event outcome, for the acknowledgment log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestOutcome {
    /// Queued for dispatch.
    Enqueued,

    /// Duplicate delivery of an already-sighted reply.
    Duplicate,

    /// No response warranted; ledger finalized `Skipped`.
    Skipped,

    /// Queue saturated; ledger finalized `Failed` without blocking the call.
    FailedFast,
}

/// Webhook handler.
///
/// Accepts signed reply-notification batches and acknowledges them with
/// 202 once every event is deduped and, where warranted, queued.
pub async fn webhook_handler<P: ReplyPoster>(
    State(state): State<AppState<P>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let signature = headers
        .get(HEADER_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    // Verify before parsing: unauthenticated bytes get no further work.
    if !verify_signature(&body, signature, state.webhook_secret()) {
        warn!("Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    let events = parse_events(&body, Utc::now())?;
    debug!(count = events.len(), "Webhook batch verified");

    for event in &events {
        let outcome = ingest_event(&state, event).await?;
        info!(
            reply_id = %event.reply_id,
            post_id = %event.post_id,
            outcome = ?outcome,
            "Reply ingested"
        );
    }

    Ok((StatusCode::ACCEPTED, "Accepted"))
}

/// Runs one event through dedupe, classification, and enqueue.
async fn ingest_event<P: ReplyPoster>(
    state: &AppState<P>,
    event: &ReplyEvent,
) -> Result<IngestOutcome, WebhookError> {
    let sighting = state
        .ledger()
        .observe(&event.reply_id, event.received_at)
        .await?;

    if !sighting.created {
        // At-least-once delivery collapsing to at-most-once action: the
        // record exists, so some delivery of this reply already ran the
        // pipeline. Acknowledge and do nothing.
        return Ok(IngestOutcome::Duplicate);
    }

    match classify(event, state.rules()) {
        ActionDecision::Respond { rendered, .. } => {
            match state
                .dispatcher()
                .submit(event.reply_id.clone(), rendered)
                .await
            {
                Ok(()) => Ok(IngestOutcome::Enqueued),
                Err(saturated) => {
                    // Fail fast rather than holding the webhook open while
                    // the queue drains.
                    warn!(reply_id = %event.reply_id, error = %saturated, "Dispatch queue full");
                    state
                        .ledger()
                        .finalize(
                            &event.reply_id,
                            ReplyStatus::Failed,
                            Some(saturated.to_string()),
                        )
                        .await?;
                    Ok(IngestOutcome::FailedFast)
                }
            }
        }
        ActionDecision::Ignore { reason } => {
            state
                .ledger()
                .finalize(&event.reply_id, ReplyStatus::Skipped, Some(reason))
                .await?;
            Ok(IngestOutcome::Skipped)
        }
    }
}
