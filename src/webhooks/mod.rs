//! Webhook authentication and parsing.
//!
//! Inbound deliveries are verified against the shared secret first
//! ([`verify_signature`]), then parsed into typed events
//! ([`parse_events`]). Nothing downstream ever sees an unverified payload.

pub mod parser;
pub mod signature;

pub use parser::{ParseError, parse_events};
pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify_signature,
};
