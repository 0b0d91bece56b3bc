//! Escalation policy: when a conversation goes to second-stage verification.

use serde::{Deserialize, Serialize};

use crate::report::{CompletenessReport, HallucinationReport, RelevanceReport};
use crate::types::{JudgeRole, Severity};

/// Which hallucination findings are re-verified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationTrigger {
    /// Verify every detection, minor included
    #[default]
    AnyDetection,
    /// Verify detections at or above this severity
    MinSeverity(Severity),
}

impl VerificationTrigger {
    pub fn fires(&self, report: &HallucinationReport) -> bool {
        if !report.needs_verification() {
            return false;
        }
        match self {
            VerificationTrigger::AnyDetection => true,
            VerificationTrigger::MinSeverity(min) => report.severity() >= *min,
        }
    }
}

/// Why Stage 2 was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum EscalationTrigger {
    HallucinationDetected { severity: Severity },
    QualityBelowThreshold { judge: JudgeRole, score: u8 },
}

/// Escalation decision made after Stage 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    #[serde(default)]
    pub verification_trigger: VerificationTrigger,

    /// Escalate when a 1-5 quality score is at or below this value
    #[serde(default)]
    pub quality_threshold: Option<u8>,
}

impl EscalationPolicy {
    /// Decide whether Stage 2 runs.
    ///
    /// Without a hallucination finding there is nothing to verify, so the
    /// quality threshold only applies when one exists.
    pub fn evaluate(
        &self,
        hallucination: Option<&HallucinationReport>,
        relevance: Option<&RelevanceReport>,
        completeness: Option<&CompletenessReport>,
    ) -> Option<EscalationTrigger> {
        let report = hallucination?;

        if self.verification_trigger.fires(report) {
            return Some(EscalationTrigger::HallucinationDetected {
                severity: report.severity(),
            });
        }

        let threshold = self.quality_threshold?;
        let scores = [
            (
                JudgeRole::DocumentRelevance,
                relevance.and_then(|r| r.relevance_score),
            ),
            (
                JudgeRole::Completeness,
                completeness.and_then(|r| r.completeness_score),
            ),
        ];
        scores.into_iter().find_map(|(judge, score)| match score {
            Some(score) if score <= threshold => {
                Some(EscalationTrigger::QualityBelowThreshold { judge, score })
            }
            _ => None,
        })
    }
}
