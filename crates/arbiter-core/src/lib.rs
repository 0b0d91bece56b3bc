//! # arbiter-core
//!
//! Deterministic half of the arbiter judge engine.
//!
//! This crate owns everything about a judge evaluation that does not talk to
//! a model:
//! - the conversation and verdict data model
//! - extraction and strict parsing of judge replies
//! - the Consistency Validator for hallucination verdicts
//! - the escalation policy and the Stage-2 merge rule
//! - the per-conversation aggregation record
//!
//! ## Key Guarantees
//!
//! 1. **Consistent**: every [`HallucinationReport`] satisfies
//!    `detected == (hallucinated claims > 0)` and `!detected => severity == none`
//! 2. **No I/O**: no network, no clock except the aggregation timestamp
//! 3. **Lenient values, strict shapes**: unknown labels become sentinels,
//!    malformed structure is an error
//!
//! ## Example
//!
//! ```rust,ignore
//! use arbiter_core::{parse_judge_reply, JudgeRole, JudgeOutput};
//!
//! let reply = "```json\n{\"hallucination_detected\": false, \"evidence\": []}\n```";
//! match parse_judge_reply(JudgeRole::Hallucination, reply)? {
//!     JudgeOutput::Hallucination(report) => assert!(!report.detected()),
//!     _ => unreachable!(),
//! }
//! ```

pub mod aggregate;
pub mod consistency;
pub mod evidence;
pub mod policy;
pub mod reply;
pub mod report;
pub mod types;

pub use aggregate::{merge_verification, AggregatedEvaluation};
pub use consistency::{
    needs_verification, Adjustment, ConsistencyValidator, HallucinationVerdict, Reconciled,
};
pub use evidence::{ClaimCounts, ClaimStatus, EvidenceItem};
pub use policy::{EscalationPolicy, EscalationTrigger, VerificationTrigger};
pub use reply::{parse_json_reply, parse_reply, JudgeParseError, ReplyError};
pub use report::{
    CompletenessReport, EscalationReport, HallucinationReport, JudgeOutput, JudgeResult,
    RelevanceReport, VerificationReport,
};
pub use types::{
    ConversationInput, EvaluationStage, HallucinationType, InputError, JudgeRole, LlmUsage,
    Recommendation, Severity, SeverityAdjustment, TokenUsage,
};

use thiserror::Error;

/// Errors from turning raw reply text into a typed judge output.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)]
    Reply(#[from] ReplyError),

    #[error(transparent)]
    Parse(#[from] JudgeParseError),
}

/// Extract, validate and parse a raw reply in one step.
pub fn parse_judge_reply(role: JudgeRole, reply: &str) -> Result<JudgeOutput, CoreError> {
    let value = parse_json_reply(reply)?;
    Ok(parse_reply(role, &value)?)
}
