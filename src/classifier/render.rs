//! Response template rendering.
//!
//! Templates substitute reply-event fields with `{placeholder}` syntax:
//!
//! - `{author}` - the reply author's handle
//! - `{excerpt}` - a short excerpt of the reply text
//! - `{post_id}` - the post that was replied to
//! - `{reply_id}` - the reply itself
//!
//! `{{` and `}}` escape literal braces. An unknown placeholder is a
//! [`RenderError`]; the classifier degrades that to an ignore decision so a
//! bad rule never takes down ingestion for unrelated replies.

use thiserror::Error;

use crate::types::ReplyEvent;

/// Errors that can occur while rendering a template.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    /// Template referenced a placeholder that has no event field.
    #[error("unknown placeholder: {{{0}}}")]
    UnknownPlaceholder(String),

    /// A `{` was never closed.
    #[error("unclosed placeholder starting at byte {0}")]
    UnclosedPlaceholder(usize),
}

/// Renders a response template against a reply event.
pub fn render_template(template: &str, event: &ReplyEvent) -> Result<String, RenderError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        match c {
            '{' => {
                if chars.peek().is_some_and(|&(_, next)| next == '{') {
                    chars.next();
                    out.push('{');
                    continue;
                }

                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(RenderError::UnclosedPlaceholder(idx));
                }

                match name.as_str() {
                    "author" => out.push_str(&event.author_handle),
                    "excerpt" => out.push_str(event.excerpt()),
                    "post_id" => out.push_str(event.post_id.as_str()),
                    "reply_id" => out.push_str(event.reply_id.as_str()),
                    _ => return Err(RenderError::UnknownPlaceholder(name)),
                }
            }
            '}' => {
                if chars.peek().is_some_and(|&(_, next)| next == '}') {
                    chars.next();
                }
                out.push('}');
            }
            c => out.push(c),
        }
    }

    Ok(out)
}
