//! Core types for judge evaluation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised when a conversation record cannot be evaluated at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("session_id must not be empty")]
    EmptySessionId,
}

/// One conversation turn to be judged.
///
/// Owned by the caller and read-only to the evaluation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationInput {
    /// Correlation key carried through to the evaluation record
    pub session_id: String,

    /// The user's question
    pub user_question: String,

    /// The candidate answer produced by the assistant under evaluation
    pub ai_response: String,

    /// Retrieved source documents, concatenated
    pub documents: String,

    /// Previous user question, for context-dependent questions
    #[serde(default)]
    pub prev_user_question: Option<String>,

    /// Previous assistant answer, for context-dependent questions
    #[serde(default)]
    pub prev_ai_response: Option<String>,

    /// Whether the assistant handed the conversation to a human
    #[serde(default)]
    pub escalated: bool,

    /// Stated reason for the hand-off, if any
    #[serde(default)]
    pub escalation_reason: Option<String>,
}

impl ConversationInput {
    /// Create a single-turn conversation record.
    pub fn new(
        session_id: impl Into<String>,
        user_question: impl Into<String>,
        ai_response: impl Into<String>,
        documents: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_question: user_question.into(),
            ai_response: ai_response.into(),
            documents: documents.into(),
            prev_user_question: None,
            prev_ai_response: None,
            escalated: false,
            escalation_reason: None,
        }
    }

    /// Attach the previous turn.
    pub fn with_previous_turn(
        mut self,
        user_question: impl Into<String>,
        ai_response: impl Into<String>,
    ) -> Self {
        self.prev_user_question = Some(user_question.into());
        self.prev_ai_response = Some(ai_response.into());
        self
    }

    /// Mark the conversation as escalated to a human.
    pub fn with_escalation(mut self, reason: Option<String>) -> Self {
        self.escalated = true;
        self.escalation_reason = reason;
        self
    }

    /// The previous turn, only when both halves are present and non-blank.
    pub fn previous_turn(&self) -> Option<(&str, &str)> {
        match (&self.prev_user_question, &self.prev_ai_response) {
            (Some(q), Some(a)) if !q.trim().is_empty() && !a.trim().is_empty() => {
                Some((q.as_str(), a.as_str()))
            }
            _ => None,
        }
    }

    /// Check the record can be evaluated.
    pub fn validate(&self) -> Result<(), InputError> {
        if self.session_id.trim().is_empty() {
            return Err(InputError::EmptySessionId);
        }
        Ok(())
    }
}

/// The judge roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeRole {
    Hallucination,
    DocumentRelevance,
    Completeness,
    Escalation,
    Verification,
}

impl JudgeRole {
    /// Judges that run independently in stage one.
    pub const STAGE_ONE: [JudgeRole; 4] = [
        JudgeRole::Hallucination,
        JudgeRole::DocumentRelevance,
        JudgeRole::Completeness,
        JudgeRole::Escalation,
    ];

    /// Every role, in a stable order.
    pub const ALL: [JudgeRole; 5] = [
        JudgeRole::Hallucination,
        JudgeRole::DocumentRelevance,
        JudgeRole::Completeness,
        JudgeRole::Escalation,
        JudgeRole::Verification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JudgeRole::Hallucination => "hallucination",
            JudgeRole::DocumentRelevance => "document_relevance",
            JudgeRole::Completeness => "completeness",
            JudgeRole::Escalation => "escalation",
            JudgeRole::Verification => "verification",
        }
    }

    /// Column prefix used by the flat export.
    pub fn column_prefix(&self) -> &'static str {
        match self {
            JudgeRole::Hallucination => "hall",
            JudgeRole::DocumentRelevance => "doc",
            JudgeRole::Completeness => "comp",
            JudgeRole::Escalation => "esc",
            JudgeRole::Verification => "ver",
        }
    }
}

impl fmt::Display for JudgeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a detected hallucination.
///
/// Declaration order is the ordering: `None < Minor < Major < Critical`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Minor,
    Major,
    Critical,
}

impl Severity {
    /// Numeric score used for aggregation (0..=3).
    pub fn score(&self) -> u8 {
        match self {
            Severity::None => 0,
            Severity::Minor => 1,
            Severity::Major => 2,
            Severity::Critical => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Severity::None),
            "minor" => Ok(Severity::Minor),
            "major" => Ok(Severity::Major),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity '{}'", other)),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of hallucination reported by the judge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HallucinationType {
    Fabrication,
    Distortion,
    Mixing,
    Contradiction,
    #[default]
    None,
    /// The judge used a label outside the known set
    Unknown,
}

impl HallucinationType {
    /// Lenient parse; unrecognized labels map to `Unknown`.
    pub fn parse_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "fabrication" => HallucinationType::Fabrication,
            "distortion" => HallucinationType::Distortion,
            "mixing" => HallucinationType::Mixing,
            "contradiction" => HallucinationType::Contradiction,
            "none" => HallucinationType::None,
            _ => HallucinationType::Unknown,
        }
    }
}

/// Direction of a verifier's severity change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeverityAdjustment {
    #[default]
    None,
    Increase,
    Decrease,
    Unknown,
}

impl SeverityAdjustment {
    pub fn parse_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => SeverityAdjustment::None,
            "increase" => SeverityAdjustment::Increase,
            "decrease" => SeverityAdjustment::Decrease,
            _ => SeverityAdjustment::Unknown,
        }
    }
}

/// Verifier's final recommendation for a flagged answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Approve,
    Reject,
    Review,
    #[default]
    Unknown,
}

impl Recommendation {
    pub fn parse_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" => Recommendation::Approve,
            "reject" => Recommendation::Reject,
            "review" => Recommendation::Review,
            _ => Recommendation::Unknown,
        }
    }
}

/// Per-conversation evaluation state.
///
/// `Pending -> StageOneRunning -> StageOneDone -> [StageTwoRunning] -> Done`,
/// or `Failed` from any non-terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStage {
    #[default]
    Pending,
    StageOneRunning,
    StageOneDone,
    StageTwoRunning,
    Done,
    Failed,
}

impl EvaluationStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EvaluationStage::Done | EvaluationStage::Failed)
    }
}

/// Token usage from a single completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Accumulated LLM usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    /// Number of completed provider calls
    pub llm_calls: u32,

    /// Number of judge invocations that ended in failure
    pub failed_calls: u32,

    /// Prompt/input tokens
    pub prompt_tokens: u32,

    /// Completion/output tokens
    pub completion_tokens: u32,

    /// Total tokens
    pub total_tokens: u32,
}

impl LlmUsage {
    /// Add usage from one provider response.
    pub fn add(&mut self, usage: &TokenUsage) {
        self.llm_calls += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
    }

    /// Fold another accumulator into this one.
    pub fn merge(&mut self, other: &LlmUsage) {
        self.llm_calls += other.llm_calls;
        self.failed_calls += other.failed_calls;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}
