//! Outbound posting to the platform API.
//!
//! The poster is the only component doing network I/O after ingestion. Its
//! job beyond the HTTP call is error *classification*, which drives the
//! retry decision:
//!
//! - **Retryable**: rate limits (429), server errors (5xx), timeouts and
//!   connection failures. The task goes back on the queue with backoff.
//! - **Terminal**: everything else (401/403 auth, 400/422 malformed). The
//!   ledger record fails immediately; retrying would only repeat the error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use super::queue::DispatchTask;

/// How a posting failure should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PosterErrorKind {
    /// Transient; re-enqueue with backoff.
    Retryable,

    /// Permanent; fail the task without retrying.
    Terminal,
}

/// A classified posting failure.
#[derive(Debug, Error)]
pub struct PosterError {
    /// Drives the dispatcher's retry decision.
    pub kind: PosterErrorKind,

    /// HTTP status, when the platform answered at all.
    pub status_code: Option<u16>,

    /// Human-readable description for logs and ledger detail.
    pub message: String,
}

impl fmt::Display for PosterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "platform API error (HTTP {}): {}", code, self.message),
            None => write!(f, "platform API error: {}", self.message),
        }
    }
}

impl PosterError {
    /// Creates a retryable error with no status code (network-level failure).
    pub fn retryable(message: impl Into<String>) -> Self {
        PosterError {
            kind: PosterErrorKind::Retryable,
            status_code: None,
            message: message.into(),
        }
    }

    /// Creates a terminal error with no status code.
    pub fn terminal(message: impl Into<String>) -> Self {
        PosterError {
            kind: PosterErrorKind::Terminal,
            status_code: None,
            message: message.into(),
        }
    }

    /// Classifies an HTTP status from the platform.
    ///
    /// 429 and 5xx are retryable; any other non-success status is terminal.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            429 => PosterErrorKind::Retryable,
            500..=599 => PosterErrorKind::Retryable,
            _ => PosterErrorKind::Terminal,
        };
        PosterError {
            kind,
            status_code: Some(status),
            message: message.into(),
        }
    }

    /// Classifies a transport-level error from the HTTP client.
    ///
    /// Timeouts and connection failures are retryable; anything else (e.g.,
    /// request construction errors) is terminal.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            PosterError {
                kind: PosterErrorKind::Retryable,
                status_code: None,
                message: err.to_string(),
            }
        } else {
            PosterError {
                kind: PosterErrorKind::Terminal,
                status_code: None,
                message: err.to_string(),
            }
        }
    }
}

/// Confirmation of a successful post.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostReceipt {
    /// Platform-assigned identifier of the reply we created.
    pub id: String,
}

/// The seam between the dispatcher and the platform API.
///
/// The production implementation is [`HttpPoster`]; tests substitute a
/// scripted poster to exercise the retry machinery without a network.
pub trait ReplyPoster: Send + Sync {
    /// Posts the rendered response, parented to the task's reply.
    fn post(
        &self,
        task: &DispatchTask,
    ) -> impl Future<Output = Result<PostReceipt, PosterError>> + Send;
}

/// Request body for the platform's reply-creation endpoint.
#[derive(Debug, Serialize)]
struct CreateReplyRequest<'a> {
    parent_reply_id: &'a str,
    text: &'a str,
}

/// HTTP client for the platform's posting endpoint.
#[derive(Debug, Clone)]
pub struct HttpPoster {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpPoster {
    /// Creates a poster for the given API base URL and bearer token.
    ///
    /// Every request carries `timeout`; a timed-out post is classified
    /// retryable (the backoff schedule decides when to try again).
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpPoster {
            client,
            base_url: base_url.into(),
            token: token.into(),
        })
    }
}

impl ReplyPoster for HttpPoster {
    async fn post(&self, task: &DispatchTask) -> Result<PostReceipt, PosterError> {
        let url = format!("{}/replies", self.base_url.trim_end_matches('/'));
        let body = CreateReplyRequest {
            parent_reply_id: task.reply_id.as_str(),
            text: &task.rendered_response,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(PosterError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(PosterError::from_status(status.as_u16(), message));
        }

        response
            .json::<PostReceipt>()
            .await
            .map_err(|e| PosterError::terminal(format!("malformed receipt: {}", e)))
    }
}
