//! Per-conversation aggregation of judge results.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consistency::HallucinationVerdict;
use crate::evidence::EvidenceItem;
use crate::policy::EscalationTrigger;
use crate::report::{
    CompletenessReport, EscalationReport, HallucinationReport, JudgeOutput, JudgeResult,
    RelevanceReport, VerificationReport,
};
use crate::types::{EvaluationStage, JudgeRole, LlmUsage, Severity};

/// Evaluation record for one conversation.
///
/// Owned by the single in-flight evaluation that builds it; frozen once
/// returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEvaluation {
    pub session_id: String,

    /// False only when the evaluation failed outside judge isolation
    pub success: bool,

    pub stage: EvaluationStage,

    pub hallucination: Option<JudgeResult>,
    pub document_relevance: Option<JudgeResult>,
    pub completeness: Option<JudgeResult>,
    pub escalation: Option<JudgeResult>,
    pub verification: Option<JudgeResult>,

    /// Set when Stage 2 ran and failed; Stage-1 findings stand
    #[serde(default)]
    pub verification_error: Option<String>,

    #[serde(default)]
    pub escalation_trigger: Option<EscalationTrigger>,

    /// Axes with no usable result, and why
    #[serde(default)]
    pub unavailable: BTreeMap<JudgeRole, String>,

    /// Top-level error for a failed evaluation
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub usage: LlmUsage,

    pub evaluated_at: DateTime<Utc>,
}

impl AggregatedEvaluation {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            success: true,
            stage: EvaluationStage::Pending,
            hallucination: None,
            document_relevance: None,
            completeness: None,
            escalation: None,
            verification: None,
            verification_error: None,
            escalation_trigger: None,
            unavailable: BTreeMap::new(),
            error: None,
            usage: LlmUsage::default(),
            evaluated_at: Utc::now(),
        }
    }

    /// A fully failed evaluation: one top-level error, no per-axis data.
    pub fn failed(session_id: impl Into<String>, error: impl Into<String>) -> Self {
        let mut eval = Self::new(session_id);
        eval.success = false;
        eval.stage = EvaluationStage::Failed;
        eval.error = Some(error.into());
        eval
    }

    fn slot_mut(&mut self, role: JudgeRole) -> &mut Option<JudgeResult> {
        match role {
            JudgeRole::Hallucination => &mut self.hallucination,
            JudgeRole::DocumentRelevance => &mut self.document_relevance,
            JudgeRole::Completeness => &mut self.completeness,
            JudgeRole::Escalation => &mut self.escalation,
            JudgeRole::Verification => &mut self.verification,
        }
    }

    pub fn result(&self, role: JudgeRole) -> Option<&JudgeResult> {
        match role {
            JudgeRole::Hallucination => self.hallucination.as_ref(),
            JudgeRole::DocumentRelevance => self.document_relevance.as_ref(),
            JudgeRole::Completeness => self.completeness.as_ref(),
            JudgeRole::Escalation => self.escalation.as_ref(),
            JudgeRole::Verification => self.verification.as_ref(),
        }
    }

    /// Record a Stage-1 judge result.
    pub fn record(&mut self, result: JudgeResult) {
        let role = result.judge;
        self.usage.merge(&result.usage);
        if !result.success {
            let reason = result
                .error
                .clone()
                .unwrap_or_else(|| "judge failed".to_string());
            self.unavailable.insert(role, reason);
        }
        *self.slot_mut(role) = Some(result);
    }

    /// Mark an axis as having produced no result at all.
    pub fn mark_unavailable(&mut self, role: JudgeRole, reason: impl Into<String>) {
        let reason = reason.into();
        self.usage.failed_calls += 1;
        *self.slot_mut(role) = Some(JudgeResult::failed(role, reason.clone()));
        self.unavailable.insert(role, reason);
    }

    /// Apply the Stage-2 result.
    ///
    /// A successful verification replaces the hallucination verdict; a failed
    /// one is recorded and leaves Stage-1 findings untouched.
    pub fn apply_verification(&mut self, result: JudgeResult) {
        self.usage.merge(&result.usage);

        let merged = match (self.hallucination_report(), result.verification()) {
            (Some(stage1), Some(verification)) if result.success => {
                Some(merge_verification(stage1, verification))
            }
            _ => None,
        };

        match merged {
            Some(report) => {
                if let Some(stage1) = self.hallucination.as_mut() {
                    stage1.output = Some(JudgeOutput::Hallucination(report));
                }
            }
            None => {
                let reason = result
                    .error
                    .clone()
                    .unwrap_or_else(|| "verification produced no usable result".to_string());
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %reason,
                    "Verification failed; keeping stage-one hallucination finding"
                );
                self.unavailable.insert(JudgeRole::Verification, reason.clone());
                self.verification_error = Some(reason);
            }
        }
        self.verification = Some(result);
    }

    pub fn hallucination_report(&self) -> Option<&HallucinationReport> {
        self.hallucination.as_ref().and_then(JudgeResult::hallucination)
    }

    pub fn relevance_report(&self) -> Option<&RelevanceReport> {
        match self.document_relevance.as_ref()?.output.as_ref()? {
            JudgeOutput::DocumentRelevance(r) => Some(r),
            _ => None,
        }
    }

    pub fn completeness_report(&self) -> Option<&CompletenessReport> {
        match self.completeness.as_ref()?.output.as_ref()? {
            JudgeOutput::Completeness(r) => Some(r),
            _ => None,
        }
    }

    pub fn escalation_report(&self) -> Option<&EscalationReport> {
        match self.escalation.as_ref()?.output.as_ref()? {
            JudgeOutput::Escalation(r) => Some(r),
            _ => None,
        }
    }

    pub fn verification_report(&self) -> Option<&VerificationReport> {
        self.verification.as_ref().and_then(JudgeResult::verification)
    }

    /// Number of Stage-1 axes with a usable result.
    pub fn available_axes(&self) -> usize {
        JudgeRole::STAGE_ONE
            .iter()
            .filter(|role| self.result(**role).is_some_and(|r| r.success))
            .count()
    }

    /// Flatten into prefixed columns for tabular export.
    ///
    /// Judge fields are prefixed `hall_`, `doc_`, `comp_`, `esc_`, `ver_`.
    /// Axes without a result contribute only `<prefix>_success = false`.
    pub fn to_flat_record(&self) -> BTreeMap<String, Value> {
        let mut row = BTreeMap::new();
        row.insert("session_id".to_string(), Value::from(self.session_id.clone()));
        row.insert("success".to_string(), Value::from(self.success));
        row.insert("stage".to_string(), to_value(&self.stage));
        row.insert(
            "evaluated_at".to_string(),
            Value::from(self.evaluated_at.to_rfc3339()),
        );
        row.insert("error".to_string(), to_value(&self.error));
        row.insert(
            "verification_error".to_string(),
            to_value(&self.verification_error),
        );
        row.insert(
            "escalation_trigger".to_string(),
            to_value(&self.escalation_trigger),
        );
        row.insert("llm_calls".to_string(), Value::from(self.usage.llm_calls));
        row.insert("total_tokens".to_string(), Value::from(self.usage.total_tokens));

        for role in JudgeRole::ALL {
            let prefix = role.column_prefix();
            let Some(result) = self.result(role) else {
                row.insert(format!("{}_success", prefix), Value::from(false));
                continue;
            };
            row.insert(format!("{}_success", prefix), Value::from(result.success));
            row.insert(format!("{}_error", prefix), to_value(&result.error));
            row.insert(format!("{}_elapsed_ms", prefix), Value::from(result.elapsed_ms));

            if let Some(Value::Object(fields)) = result.output.as_ref().map(to_value) {
                for (key, value) in fields {
                    if key == "judge" || key == "warnings" {
                        continue;
                    }
                    row.insert(format!("{}_{}", prefix, key), value);
                }
            }
        }
        row
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Rebuild the hallucination verdict from a successful verification.
///
/// `detected` follows `verified`; severity is the verifier's, or the
/// Stage-1 severity when the verifier gave none usable. Evidence is the
/// verifier's when supplied, otherwise the Stage-1 evidence, minus its
/// hallucinated claims when the finding was not confirmed. The result goes
/// back through the Consistency Validator.
pub fn merge_verification(
    stage1: &HallucinationReport,
    verification: &VerificationReport,
) -> HallucinationReport {
    let verified = verification.verified;

    let severity = match verification.new_severity {
        Some(Severity::None) if verified => stage1.severity(),
        Some(severity) => severity,
        None => stage1.severity(),
    };

    let evidence: Vec<EvidenceItem> = match &verification.evidence {
        Some(evidence) => evidence.clone(),
        None if verified => stage1.verdict.evidence.clone(),
        None => stage1
            .verdict
            .evidence
            .iter()
            .filter(|e| !e.is_hallucination())
            .cloned()
            .collect(),
    };

    let raw = HallucinationVerdict {
        detected: verified,
        severity,
        hallucination_type: stage1.verdict.hallucination_type,
        evidence,
        confidence: stage1.verdict.confidence,
    };

    let assessment = if verification.explanation.trim().is_empty() {
        stage1.overall_assessment.clone()
    } else {
        verification.explanation.clone()
    };

    let mut warnings = stage1.warnings.clone();
    warnings.extend(verification.warnings.iter().cloned());

    let mut merged = HallucinationReport::from_raw(raw, assessment, warnings);
    merged.superseded = Some(stage1.verdict.clone());
    merged
}
