//! Per-claim evidence produced by the hallucination judge.
//!
//! Every factual claim extracted from the answer is one item, marked either
//! grounded in the source documents or hallucinated. The aggregate verdict
//! must agree with these items; see [`crate::consistency`].

use serde::{Deserialize, Serialize};

/// Whether a claim is supported by the documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Grounded,
    Hallucination,
    /// Status missing or outside the known labels
    Unknown,
}

impl ClaimStatus {
    pub fn parse_label(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "grounded" => ClaimStatus::Grounded,
            "hallucination" | "hallucinated" => ClaimStatus::Hallucination,
            _ => ClaimStatus::Unknown,
        }
    }
}

/// One extracted claim and its support.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// The claim, quoted or paraphrased from the answer
    pub claim: String,

    /// Grounded or hallucinated
    pub status: ClaimStatus,

    /// Supporting quote from the documents, or a "not found" marker
    #[serde(default)]
    pub document_support: String,

    /// Why the claim is or isn't supported
    #[serde(default)]
    pub explanation: String,
}

impl EvidenceItem {
    /// A claim supported by the given document quote.
    pub fn grounded(claim: impl Into<String>, document_support: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            status: ClaimStatus::Grounded,
            document_support: document_support.into(),
            explanation: String::new(),
        }
    }

    /// A claim with no document support.
    pub fn hallucination(claim: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
            status: ClaimStatus::Hallucination,
            document_support: "NOT FOUND".to_string(),
            explanation: explanation.into(),
        }
    }

    pub fn is_hallucination(&self) -> bool {
        self.status == ClaimStatus::Hallucination
    }

    pub fn is_grounded(&self) -> bool {
        self.status == ClaimStatus::Grounded
    }
}

/// Claim tallies over an evidence list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimCounts {
    pub total: usize,
    pub grounded: usize,
    pub hallucinated: usize,
    pub unknown: usize,
}

impl ClaimCounts {
    pub fn from_evidence(evidence: &[EvidenceItem]) -> Self {
        let mut counts = ClaimCounts {
            total: evidence.len(),
            ..Default::default()
        };
        for item in evidence {
            match item.status {
                ClaimStatus::Grounded => counts.grounded += 1,
                ClaimStatus::Hallucination => counts.hallucinated += 1,
                ClaimStatus::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    /// Fraction of claims grounded in the documents.
    ///
    /// No claims means nothing is ungrounded, so the ratio is 1.0.
    pub fn grounding_ratio(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.grounded as f64 / self.total as f64
    }
}
