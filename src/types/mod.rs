//! Core domain types for the reply pipeline.

mod event;
mod ids;
mod record;

pub use event::ReplyEvent;
pub use ids::{AuthorId, EventId, PostId, ReplyId};
pub use record::{ProcessedRecord, ReplyStatus};
