//! HTTP server for the reply relay.
//!
//! # Endpoints
//!
//! - `POST /webhook` - Accepts signed reply-notification deliveries
//!   (returns 202 Accepted on every deduped outcome)
//! - `GET /health` - Returns 200 if the server is running

use std::sync::Arc;

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::{WebhookError, webhook_handler};

use crate::classifier::RuleSet;
use crate::dispatch::{Dispatcher, ReplyPoster};
use crate::ledger::DedupeLedger;

/// Shared application state, passed to handlers via axum's `State`
/// extractor.
pub struct AppState<P> {
    inner: Arc<AppStateInner<P>>,
}

impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        AppState {
            inner: self.inner.clone(),
        }
    }
}

struct AppStateInner<P> {
    /// Secret for HMAC-SHA256 signature verification.
    webhook_secret: Vec<u8>,

    /// Immutable matching rules, loaded once at startup.
    rules: RuleSet,

    /// Durable per-reply dedupe state.
    ledger: Arc<DedupeLedger>,

    /// Queue owner; ingestion only ever calls `submit`.
    dispatcher: Arc<Dispatcher<P>>,
}

impl<P> AppState<P> {
    /// Creates the shared state.
    pub fn new(
        webhook_secret: impl Into<Vec<u8>>,
        rules: RuleSet,
        ledger: Arc<DedupeLedger>,
        dispatcher: Arc<Dispatcher<P>>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                webhook_secret: webhook_secret.into(),
                rules,
                ledger,
                dispatcher,
            }),
        }
    }

    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }

    pub fn rules(&self) -> &RuleSet {
        &self.inner.rules
    }

    pub fn ledger(&self) -> &DedupeLedger {
        &self.inner.ledger
    }

    pub fn dispatcher(&self) -> &Dispatcher<P> {
        &self.inner.dispatcher
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<P: ReplyPoster + 'static>(app_state: AppState<P>) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler::<P>))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
