//! Reply Relay - automated reply handling for a social-posting platform.
//!
//! Receives signed webhook deliveries announcing new replies, collapses
//! at-least-once delivery into at-most-once action through a durable dedupe
//! ledger, matches replies against prioritized rules, and posts automated
//! responses under a rate budget with bounded, jittered backoff.

pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod ledger;
pub mod server;
pub mod types;
pub mod webhooks;
