//! Extraction of a JSON document from free-form model output.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

lazy_static! {
    /// Interior of a fenced block, with or without a language tag.
    static ref FENCED: Regex = Regex::new(r"(?s)```(?:[A-Za-z0-9_-]+)?[ \t]*\r?\n?(.*?)```").unwrap();
    /// Opening fence with no closing partner.
    static ref LEADING_FENCE: Regex = Regex::new(r"^```(?:[A-Za-z0-9_-]+)?[ \t]*\r?\n?").unwrap();
}

/// Errors from turning reply text into JSON.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    #[error("reply is empty")]
    Empty,

    #[error("reply is not valid JSON: {message}")]
    InvalidJson { message: String, excerpt: String },
}

/// Longest excerpt of the reply kept in error messages.
const EXCERPT_CHARS: usize = 200;

fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

/// Strip markdown fences around a JSON reply.
///
/// Returns the interior of the first fenced block, or the trimmed text when
/// there is none. An unterminated opening fence is dropped.
pub fn extract_json_text(reply: &str) -> &str {
    let trimmed = reply.trim();

    if let Some(captures) = FENCED.captures(trimmed) {
        if let Some(inner) = captures.get(1) {
            return inner.as_str().trim();
        }
    }

    if let Some(m) = LEADING_FENCE.find(trimmed) {
        return trimmed[m.end()..].trim();
    }

    trimmed
}

/// Decode a judge reply into a JSON value.
///
/// Tries the fence-stripped text first; when surrounding prose makes that
/// fail, falls back to the outermost `{ ... }` span.
pub fn parse_json_reply(reply: &str) -> Result<Value, ReplyError> {
    if reply.trim().is_empty() {
        return Err(ReplyError::Empty);
    }

    let text = extract_json_text(reply);
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
                if start < end {
                    if let Ok(value) = serde_json::from_str::<Value>(&text[start..=end]) {
                        tracing::debug!("Recovered JSON object from surrounding prose");
                        return Ok(value);
                    }
                }
            }
            Err(ReplyError::InvalidJson {
                message: first_err.to_string(),
                excerpt: excerpt(text),
            })
        }
    }
}
