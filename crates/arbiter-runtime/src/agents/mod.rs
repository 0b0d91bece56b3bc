//! Judge agents.
//!
//! Each judge renders its prompt, calls the provider of its assigned tier
//! and parses the reply into a typed [`arbiter_core::JudgeOutput`]. The
//! orchestrator only sees the [`Judge`] trait.

mod completeness;
mod escalation;
mod hallucination;
mod relevance;
mod traits;
mod verification;

pub use completeness::CompletenessJudge;
pub use escalation::EscalationJudge;
pub use hallucination::HallucinationJudge;
pub use relevance::RelevanceJudge;
pub use traits::{AgentError, Judge, JudgeRequest};
pub use verification::VerificationJudge;
