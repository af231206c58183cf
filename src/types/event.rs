//! Typed reply events.
//!
//! A [`ReplyEvent`] is one inbound notification after signature verification
//! and parsing. Note what is *not* here: the delivery envelope's event ID.
//! The platform assigns a fresh event ID to every delivery attempt, including
//! redeliveries of the same reply, so it is useless for deduplication and is
//! dropped during parsing. The reply ID is the identity of the event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AuthorId, PostId, ReplyId};

/// One reply to a post, as announced by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyEvent {
    /// The post that was replied to.
    pub post_id: PostId,

    /// The reply itself. Deduplication key.
    pub reply_id: ReplyId,

    /// Author of the reply.
    pub author_id: AuthorId,

    /// Author's display handle, used for template rendering.
    pub author_handle: String,

    /// The reply text.
    pub text: String,

    /// When this delivery was received by us (not the platform's timestamp).
    pub received_at: DateTime<Utc>,
}

impl ReplyEvent {
    /// Returns a short excerpt of the reply text for template substitution
    /// and log lines.
    ///
    /// Truncates on a character boundary at most 80 characters in.
    pub fn excerpt(&self) -> &str {
        match self.text.char_indices().nth(80) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn event_with_text(text: &str) -> ReplyEvent {
        ReplyEvent {
            post_id: PostId::new("p1"),
            reply_id: ReplyId::new("r1"),
            author_id: AuthorId::new("a1"),
            author_handle: "someone".to_string(),
            text: text.to_string(),
            received_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn excerpt_of_short_text_is_whole_text() {
        let event = event_with_text("short reply");
        assert_eq!(event.excerpt(), "short reply");
    }

    #[test]
    fn excerpt_truncates_long_text() {
        let event = event_with_text(&"x".repeat(200));
        assert_eq!(event.excerpt().len(), 80);
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        // Multi-byte characters must not be split mid-codepoint
        let event = event_with_text(&"é".repeat(100));
        assert_eq!(event.excerpt().chars().count(), 80);
    }

    proptest! {
        #[test]
        fn excerpt_never_panics(text in ".{0,300}") {
            let event = event_with_text(&text);
            let excerpt = event.excerpt();
            prop_assert!(excerpt.chars().count() <= 80);
            prop_assert!(text.starts_with(excerpt));
        }

        #[test]
        fn serde_roundtrip(
            text in ".{0,100}",
            handle in "[a-z0-9_]{1,20}",
        ) {
            let mut event = event_with_text(&text);
            event.author_handle = handle;
            let json = serde_json::to_string(&event).unwrap();
            let parsed: ReplyEvent = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(event, parsed);
        }
    }
}
