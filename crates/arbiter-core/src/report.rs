//! Typed judge outputs and the uniform judge result.

use serde::{Deserialize, Serialize};

use crate::consistency::{
    needs_verification, Adjustment, ConsistencyValidator, HallucinationVerdict,
};
use crate::evidence::EvidenceItem;
use crate::types::{JudgeRole, LlmUsage, Recommendation, Severity, SeverityAdjustment};

/// Hallucination judge output, always reconciled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HallucinationReport {
    #[serde(flatten)]
    pub verdict: HallucinationVerdict,

    pub severity_score: u8,
    pub total_claims: usize,
    pub grounded_claims: usize,
    pub hallucinated_claims: usize,
    pub grounding_ratio: f64,

    #[serde(default)]
    pub overall_assessment: String,

    /// Whether the Consistency Validator overrode the raw verdict
    #[serde(default)]
    pub reconciled: bool,

    /// Overrides applied by the Consistency Validator
    #[serde(default)]
    pub adjustments: Vec<Adjustment>,

    /// Stage-one verdict, kept when verification replaced it
    #[serde(default)]
    pub superseded: Option<HallucinationVerdict>,

    /// Fields that were missing or coerced while parsing
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl HallucinationReport {
    /// Build a report from a raw verdict, running the Consistency Validator.
    pub fn from_raw(
        raw: HallucinationVerdict,
        overall_assessment: impl Into<String>,
        warnings: Vec<String>,
    ) -> Self {
        let reconciled = ConsistencyValidator::new().reconcile(raw);
        let overridden = reconciled.was_overridden();
        let counts = reconciled.counts;
        Self {
            severity_score: reconciled.verdict.severity.score(),
            total_claims: counts.total,
            grounded_claims: counts.grounded,
            hallucinated_claims: counts.hallucinated,
            grounding_ratio: counts.grounding_ratio(),
            verdict: reconciled.verdict,
            overall_assessment: overall_assessment.into(),
            reconciled: overridden,
            adjustments: reconciled.adjustments,
            superseded: None,
            warnings,
        }
    }

    pub fn detected(&self) -> bool {
        self.verdict.detected
    }

    pub fn severity(&self) -> Severity {
        self.verdict.severity
    }

    pub fn needs_verification(&self) -> bool {
        needs_verification(&self.verdict)
    }

    pub fn hallucinated_evidence(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.verdict.evidence.iter().filter(|e| e.is_hallucination())
    }

    pub fn grounded_evidence(&self) -> impl Iterator<Item = &EvidenceItem> {
        self.verdict.evidence.iter().filter(|e| e.is_grounded())
    }
}

/// Document relevance judge output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceReport {
    /// 1-5; `None` when missing or out of range
    pub relevance_score: Option<u8>,
    pub has_answer: Option<bool>,
    #[serde(default)]
    pub missing_information: Vec<String>,
    #[serde(default)]
    pub relevant_documents: Vec<String>,
    #[serde(default)]
    pub irrelevant_documents: Vec<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Completeness judge output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletenessReport {
    /// 1-5; `None` when missing or out of range
    pub completeness_score: Option<u8>,
    pub used_all_relevant_info: Option<bool>,
    pub unnecessary_clarification: Option<bool>,
    #[serde(default)]
    pub missing_information: Vec<String>,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Escalation validator output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationReport {
    pub escalation_appropriate: Option<bool>,
    pub should_have_escalated: Option<bool>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub alternative_action: String,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Verification judge output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Whether the original finding was confirmed
    pub verified: bool,
    pub severity_adjustment: SeverityAdjustment,
    /// `None` when the verifier reported no usable severity
    pub new_severity: Option<Severity>,
    #[serde(default)]
    pub explanation: String,
    pub final_recommendation: Recommendation,
    /// Re-derived evidence, when the verifier supplied one
    #[serde(default)]
    pub evidence: Option<Vec<EvidenceItem>>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Output of one judge, tagged by variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "judge", rename_all = "snake_case")]
pub enum JudgeOutput {
    Hallucination(HallucinationReport),
    DocumentRelevance(RelevanceReport),
    Completeness(CompletenessReport),
    Escalation(EscalationReport),
    Verification(VerificationReport),
}

impl JudgeOutput {
    pub fn role(&self) -> JudgeRole {
        match self {
            JudgeOutput::Hallucination(_) => JudgeRole::Hallucination,
            JudgeOutput::DocumentRelevance(_) => JudgeRole::DocumentRelevance,
            JudgeOutput::Completeness(_) => JudgeRole::Completeness,
            JudgeOutput::Escalation(_) => JudgeRole::Escalation,
            JudgeOutput::Verification(_) => JudgeRole::Verification,
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            JudgeOutput::Hallucination(r) => &r.warnings,
            JudgeOutput::DocumentRelevance(r) => &r.warnings,
            JudgeOutput::Completeness(r) => &r.warnings,
            JudgeOutput::Escalation(r) => &r.warnings,
            JudgeOutput::Verification(r) => &r.warnings,
        }
    }
}

/// Result of one judge invocation. Every invocation yields exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeResult {
    pub judge: JudgeRole,
    pub success: bool,
    pub output: Option<JudgeOutput>,
    pub error: Option<String>,

    /// Raw reply text, when one was received
    #[serde(default)]
    pub raw_response: Option<String>,

    #[serde(default)]
    pub elapsed_ms: u64,

    #[serde(default)]
    pub usage: LlmUsage,
}

impl JudgeResult {
    pub fn succeeded(output: JudgeOutput, raw_response: Option<String>) -> Self {
        Self {
            judge: output.role(),
            success: true,
            output: Some(output),
            error: None,
            raw_response,
            elapsed_ms: 0,
            usage: LlmUsage::default(),
        }
    }

    pub fn failed(judge: JudgeRole, error: impl Into<String>) -> Self {
        Self {
            judge,
            success: false,
            output: None,
            error: Some(error.into()),
            raw_response: None,
            elapsed_ms: 0,
            usage: LlmUsage::default(),
        }
    }

    pub fn with_raw_response(mut self, raw: Option<String>) -> Self {
        self.raw_response = raw;
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = elapsed_ms;
        self
    }

    pub fn with_usage(mut self, usage: LlmUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn hallucination(&self) -> Option<&HallucinationReport> {
        match &self.output {
            Some(JudgeOutput::Hallucination(r)) => Some(r),
            _ => None,
        }
    }

    pub fn verification(&self) -> Option<&VerificationReport> {
        match &self.output {
            Some(JudgeOutput::Verification(r)) => Some(r),
            _ => None,
        }
    }
}
