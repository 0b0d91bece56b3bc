//! Judge reply handling: JSON extraction, schema checks and typed parsing.
//!
//! A reply goes through three steps:
//! 1. [`parse_json_reply`] strips code fences and decodes the JSON text
//! 2. [`schema::validate_reply`] checks the structural shape per judge
//! 3. [`parse::parse_reply`] coerces fields into a typed [`JudgeOutput`]
//!
//! [`JudgeOutput`]: crate::report::JudgeOutput

pub mod extract;
pub mod parse;
pub mod schema;

pub use extract::{extract_json_text, parse_json_reply, ReplyError};
pub use parse::{parse_reply, JudgeParseError};
pub use schema::validate_reply;
