//! Consistency Validator for hallucination verdicts.
//!
//! Judge replies are produced by a non-deterministic model and are often
//! internally inconsistent: "hallucination detected" with an empty evidence
//! list, or hallucinated claims with `detected = false`. The validator makes
//! the itemized evidence authoritative.
//!
//! # Invariant
//! After [`ConsistencyValidator::reconcile`]:
//! - `detected == (hallucinated claims > 0)`
//! - `!detected => severity == None`
//!
//! Reconciliation is idempotent.

use serde::{Deserialize, Serialize};

use crate::evidence::{ClaimCounts, EvidenceItem};
use crate::types::{HallucinationType, Severity};

/// Top-level hallucination verdict plus its evidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HallucinationVerdict {
    pub detected: bool,

    pub severity: Severity,

    #[serde(rename = "type")]
    pub hallucination_type: HallucinationType,

    pub evidence: Vec<EvidenceItem>,

    /// Judge's self-reported confidence in [0, 1]; `None` when not reported
    pub confidence: Option<f64>,
}

impl HallucinationVerdict {
    pub fn counts(&self) -> ClaimCounts {
        ClaimCounts::from_evidence(&self.evidence)
    }

    /// Whether the invariant holds for this verdict.
    pub fn is_consistent(&self) -> bool {
        let hallucinated = self.counts().hallucinated;
        self.detected == (hallucinated > 0) && (self.detected || self.severity == Severity::None)
    }
}

/// A single override applied by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Adjustment {
    /// Detection claimed without any hallucinated claim; cleared
    DetectionCleared { claimed_severity: Severity },
    /// Hallucinated claims present but detection not flagged; raised
    DetectionRaised { hallucinated_claims: usize },
    /// Severity was `none` on a raised detection; defaulted to minor
    SeverityDefaulted,
    /// Type was `none` on a raised detection; defaulted to fabrication
    TypeDefaulted,
}

/// Output of reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub verdict: HallucinationVerdict,
    pub counts: ClaimCounts,
    pub adjustments: Vec<Adjustment>,
}

impl Reconciled {
    pub fn was_overridden(&self) -> bool {
        !self.adjustments.is_empty()
    }
}

/// Deterministic reconciliation of a verdict against its own evidence.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsistencyValidator;

impl ConsistencyValidator {
    pub fn new() -> Self {
        Self
    }

    /// Force the verdict to agree with its evidence.
    ///
    /// 1. No hallucinated claims: `detected=false`, `severity=none`,
    ///    `type=none`, whatever the raw verdict said.
    /// 2. Hallucinated claims but `detected=false`: `detected=true`; a `none`
    ///    severity becomes `minor` and a `none` type becomes `fabrication`.
    /// 3. Otherwise the raw severity and type are kept.
    pub fn reconcile(&self, raw: HallucinationVerdict) -> Reconciled {
        let counts = raw.counts();
        let mut verdict = raw;
        let mut adjustments = Vec::new();

        if counts.hallucinated == 0 {
            if verdict.detected
                || verdict.severity != Severity::None
                || verdict.hallucination_type != HallucinationType::None
            {
                adjustments.push(Adjustment::DetectionCleared {
                    claimed_severity: verdict.severity,
                });
            }
            verdict.detected = false;
            verdict.severity = Severity::None;
            verdict.hallucination_type = HallucinationType::None;
        } else if !verdict.detected {
            verdict.detected = true;
            adjustments.push(Adjustment::DetectionRaised {
                hallucinated_claims: counts.hallucinated,
            });
            if verdict.severity == Severity::None {
                verdict.severity = Severity::Minor;
                adjustments.push(Adjustment::SeverityDefaulted);
            }
            if verdict.hallucination_type == HallucinationType::None {
                verdict.hallucination_type = HallucinationType::Fabrication;
                adjustments.push(Adjustment::TypeDefaulted);
            }
        }

        if !adjustments.is_empty() {
            tracing::warn!(
                hallucinated = counts.hallucinated,
                total = counts.total,
                adjustments = ?adjustments,
                "Hallucination verdict disagreed with its evidence; overridden"
            );
        }

        Reconciled {
            verdict,
            counts,
            adjustments,
        }
    }
}

/// Whether a reconciled verdict must go through second-stage verification.
///
/// Every detection is verified, minor ones included.
pub fn needs_verification(verdict: &HallucinationVerdict) -> bool {
    verdict.detected
}
