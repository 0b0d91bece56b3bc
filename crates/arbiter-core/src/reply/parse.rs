//! Typed parsing of decoded judge replies.
//!
//! Shape errors fail the judge; value errors do not. A score outside 1..=5,
//! an unrecognized enum label or a missing optional field is coerced to a
//! sentinel (`None`, `Unknown`, empty) and noted in the report's `warnings`.

use serde_json::{Map, Value};
use thiserror::Error;

use super::schema::{validate_reply, SchemaFailure};
use crate::consistency::HallucinationVerdict;
use crate::evidence::{ClaimStatus, EvidenceItem};
use crate::report::{
    CompletenessReport, EscalationReport, HallucinationReport, JudgeOutput, RelevanceReport,
    VerificationReport,
};
use crate::types::{
    HallucinationType, JudgeRole, Recommendation, Severity, SeverityAdjustment,
};

/// Errors from parsing a decoded reply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JudgeParseError {
    #[error("{role} reply failed schema validation: {}", .errors.join("; "))]
    Schema { role: JudgeRole, errors: Vec<String> },

    #[error("schema for {role} could not be loaded: {message}")]
    SchemaLoad { role: JudgeRole, message: String },

    #[error("{role} reply is not a JSON object")]
    NotAnObject { role: JudgeRole },
}

/// Validate and parse a decoded reply for `role`.
pub fn parse_reply(role: JudgeRole, value: &Value) -> Result<JudgeOutput, JudgeParseError> {
    validate_reply(role, value).map_err(|failure| match failure {
        SchemaFailure::Load(message) => JudgeParseError::SchemaLoad { role, message },
        SchemaFailure::Invalid(errors) => JudgeParseError::Schema { role, errors },
    })?;

    let obj = value
        .as_object()
        .ok_or(JudgeParseError::NotAnObject { role })?;
    let mut fields = Fields::new(role, obj);

    let output = match role {
        JudgeRole::Hallucination => JudgeOutput::Hallucination(parse_hallucination(&mut fields)),
        JudgeRole::DocumentRelevance => {
            JudgeOutput::DocumentRelevance(parse_relevance(&mut fields))
        }
        JudgeRole::Completeness => JudgeOutput::Completeness(parse_completeness(&mut fields)),
        JudgeRole::Escalation => JudgeOutput::Escalation(parse_escalation(&mut fields)),
        JudgeRole::Verification => JudgeOutput::Verification(parse_verification(&mut fields)),
    };
    Ok(output)
}

/// Field accessor that records every coercion as a warning.
struct Fields<'a> {
    role: JudgeRole,
    obj: &'a Map<String, Value>,
    warnings: Vec<String>,
}

impl<'a> Fields<'a> {
    fn new(role: JudgeRole, obj: &'a Map<String, Value>) -> Self {
        Self {
            role,
            obj,
            warnings: Vec::new(),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        match self.obj.get(key) {
            Some(Value::Null) | None => None,
            Some(v) => Some(v),
        }
    }

    fn warn(&mut self, message: String) {
        tracing::debug!(judge = %self.role, warning = %message, "Coerced judge reply field");
        self.warnings.push(message);
    }

    fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    fn string(&mut self, key: &str) -> String {
        match self.get(key) {
            None => String::new(),
            Some(v) => value_to_string(v),
        }
    }

    fn opt_string(&mut self, key: &str) -> Option<String> {
        self.get(key).map(value_to_string)
    }

    fn bool(&mut self, key: &str) -> Option<bool> {
        match self.get(key) {
            None => {
                self.warn(format!("{} missing", key));
                None
            }
            Some(v) => {
                let parsed = coerce_bool(v);
                if parsed.is_none() {
                    self.warn(format!("{} is not a boolean: {}", key, v));
                }
                parsed
            }
        }
    }

    /// 1..=5 score; anything else becomes `None`.
    fn score(&mut self, key: &str) -> Option<u8> {
        let v = match self.get(key) {
            None => {
                self.warn(format!("{} missing", key));
                return None;
            }
            Some(v) => v,
        };
        let number = match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match number {
            Some(n) if n.fract() == 0.0 && (1.0..=5.0).contains(&n) => Some(n as u8),
            _ => {
                self.warn(format!("{} out of range 1-5: {}", key, v));
                None
            }
        }
    }

    /// Confidence clamped into [0, 1].
    fn confidence(&mut self, key: &str) -> Option<f64> {
        let v = self.get(key)?;
        let number = match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match number {
            Some(n) if n.is_finite() => {
                if !(0.0..=1.0).contains(&n) {
                    self.warn(format!("{} clamped from {}", key, n));
                }
                Some(n.clamp(0.0, 1.0))
            }
            _ => {
                self.warn(format!("{} is not a number: {}", key, v));
                None
            }
        }
    }

    fn string_list(&mut self, key: &str) -> Vec<String> {
        match self.get(key) {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter(|v| !v.is_null())
                .map(value_to_string)
                .filter(|s| !s.trim().is_empty())
                .collect(),
            Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
            Some(v) => vec![value_to_string(v)],
        }
    }

    fn severity(&mut self, key: &str) -> Option<Severity> {
        let raw = self.opt_string(key)?;
        match raw.parse::<Severity>() {
            Ok(s) => Some(s),
            Err(e) => {
                self.warn(e);
                None
            }
        }
    }

    fn evidence(&mut self, key: &str) -> Option<Vec<EvidenceItem>> {
        let items = match self.get(key) {
            Some(Value::Array(items)) => items,
            _ => return None,
        };
        let mut evidence = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let Some(obj) = item.as_object() else {
                self.warn(format!("{}[{}] is not an object", key, i));
                continue;
            };
            let field = |name: &str| {
                obj.get(name)
                    .filter(|v| !v.is_null())
                    .map(value_to_string)
                    .unwrap_or_default()
            };
            let status_label = field("status");
            let status = ClaimStatus::parse_label(&status_label);
            if status == ClaimStatus::Unknown {
                self.warn(format!("{}[{}].status unknown: '{}'", key, i, status_label));
            }
            evidence.push(EvidenceItem {
                claim: field("claim"),
                status,
                document_support: field("document_support"),
                explanation: field("explanation"),
            });
        }
        Some(evidence)
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn coerce_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

fn parse_hallucination(f: &mut Fields<'_>) -> HallucinationReport {
    let detected = f.bool("hallucination_detected").unwrap_or(false);

    let severity = f.severity("severity").unwrap_or_default();

    let hallucination_type = match f.opt_string("hallucination_type") {
        None => HallucinationType::None,
        Some(label) => {
            let parsed = HallucinationType::parse_label(&label);
            if parsed == HallucinationType::Unknown {
                f.warn(format!("hallucination_type unknown: '{}'", label));
            }
            parsed
        }
    };

    let evidence = match f.evidence("evidence") {
        Some(e) => e,
        None => {
            f.warn("evidence missing; treated as empty".to_string());
            Vec::new()
        }
    };

    let raw = HallucinationVerdict {
        detected,
        severity,
        hallucination_type,
        evidence,
        confidence: f.confidence("confidence"),
    };
    let assessment = f.string("overall_assessment");

    let report = HallucinationReport::from_raw(raw, assessment, f.take_warnings());
    if report.detected() && report.severity() >= Severity::Major {
        tracing::warn!(
            severity = %report.severity(),
            hallucinated = report.hallucinated_claims,
            "High-severity hallucination detected"
        );
    }
    report
}

fn parse_relevance(f: &mut Fields<'_>) -> RelevanceReport {
    RelevanceReport {
        relevance_score: f.score("relevance_score"),
        has_answer: f.bool("has_answer"),
        missing_information: f.string_list("missing_information"),
        relevant_documents: f.string_list("relevant_documents"),
        irrelevant_documents: f.string_list("irrelevant_documents"),
        explanation: f.string("explanation"),
        warnings: f.take_warnings(),
    }
}

fn parse_completeness(f: &mut Fields<'_>) -> CompletenessReport {
    CompletenessReport {
        completeness_score: f.score("completeness_score"),
        used_all_relevant_info: f.bool("used_all_relevant_info"),
        unnecessary_clarification: f.bool("unnecessary_clarification"),
        missing_information: f.string_list("missing_information"),
        explanation: f.string("explanation"),
        warnings: f.take_warnings(),
    }
}

fn parse_escalation(f: &mut Fields<'_>) -> EscalationReport {
    EscalationReport {
        escalation_appropriate: f.bool("escalation_appropriate"),
        should_have_escalated: f.bool("should_have_escalated"),
        reason: f.string("reason"),
        alternative_action: f.string("alternative_action"),
        warnings: f.take_warnings(),
    }
}

fn parse_verification(f: &mut Fields<'_>) -> VerificationReport {
    // Schema guarantees presence; a non-boolean label counts as not verified.
    let verified = f.bool("verified").unwrap_or(false);

    let severity_adjustment = match f.opt_string("severity_adjustment") {
        None => SeverityAdjustment::None,
        Some(label) => {
            let parsed = SeverityAdjustment::parse_label(&label);
            if parsed == SeverityAdjustment::Unknown {
                f.warn(format!("severity_adjustment unknown: '{}'", label));
            }
            parsed
        }
    };

    let new_severity = f.severity("new_severity");

    let final_recommendation = match f.opt_string("final_recommendation") {
        None => Recommendation::Review,
        Some(label) => {
            let parsed = Recommendation::parse_label(&label);
            if parsed == Recommendation::Unknown {
                f.warn(format!("final_recommendation unknown: '{}'", label));
            }
            parsed
        }
    };

    VerificationReport {
        verified,
        severity_adjustment,
        new_severity,
        explanation: f.string("explanation"),
        final_recommendation,
        evidence: f.evidence("evidence"),
        warnings: f.take_warnings(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hallucination(value: Value) -> HallucinationReport {
        match parse_reply(JudgeRole::Hallucination, &value).unwrap() {
            JudgeOutput::Hallucination(r) => r,
            other => panic!("unexpected output: {:?}", other),
        }
    }

    #[test]
    fn test_missed_detection_is_reconciled_on_parse() {
        let report = hallucination(json!({
            "hallucination_detected": false,
            "severity": "none",
            "hallucination_type": "none",
            "evidence": [
                {"claim": "X", "status": "hallucination", "document_support": "NOT FOUND"}
            ],
            "confidence": 0.6
        }));
        assert!(report.detected());
        assert_eq!(report.severity(), Severity::Minor);
        assert_eq!(report.verdict.hallucination_type, HallucinationType::Fabrication);
        assert!(report.needs_verification());
        assert!(report.reconciled);
    }

    #[test]
    fn test_unsupported_detection_is_cleared_on_parse() {
        let report = hallucination(json!({
            "hallucination_detected": true,
            "severity": "critical",
            "hallucination_type": "fabrication",
            "evidence": []
        }));
        assert!(!report.detected());
        assert_eq!(report.severity(), Severity::None);
    }

    #[test]
    fn test_unknown_labels_become_sentinels() {
        let report = hallucination(json!({
            "hallucination_detected": true,
            "severity": "catastrophic",
            "hallucination_type": "invention",
            "evidence": [{"claim": "X", "status": "hallucination"}],
            "confidence": 7
        }));
        assert_eq!(report.verdict.hallucination_type, HallucinationType::Unknown);
        assert_eq!(report.severity(), Severity::None);
        assert_eq!(report.verdict.confidence, Some(1.0));
        assert!(report.warnings.iter().any(|w| w.contains("catastrophic")));
        assert!(report.warnings.iter().any(|w| w.contains("invention")));
    }

    #[test]
    fn test_missing_evidence_defaults_to_empty() {
        let report = hallucination(json!({"hallucination_detected": false}));
        assert!(report.verdict.evidence.is_empty());
        assert!(report.warnings.iter().any(|w| w.contains("evidence missing")));
    }

    #[test]
    fn test_evidence_wrong_shape_fails() {
        let err = parse_reply(
            JudgeRole::Hallucination,
            &json!({"hallucination_detected": true, "evidence": {"claim": "X"}}),
        )
        .unwrap_err();
        assert!(matches!(err, JudgeParseError::Schema { role: JudgeRole::Hallucination, .. }));
    }

    #[test]
    fn test_score_out_of_range_is_none() {
        let out = parse_reply(
            JudgeRole::DocumentRelevance,
            &json!({"relevance_score": 9, "has_answer": "yes", "relevant_documents": "doc-1"}),
        )
        .unwrap();
        let JudgeOutput::DocumentRelevance(report) = out else {
            panic!("wrong variant");
        };
        assert_eq!(report.relevance_score, None);
        assert_eq!(report.has_answer, Some(true));
        assert_eq!(report.relevant_documents, vec!["doc-1".to_string()]);
        assert!(report.warnings.iter().any(|w| w.contains("relevance_score")));
    }

    #[test]
    fn test_score_string_is_coerced() {
        let out = parse_reply(
            JudgeRole::Completeness,
            &json!({
                "completeness_score": "4",
                "used_all_relevant_info": true,
                "unnecessary_clarification": false,
                "missing_information": []
            }),
        )
        .unwrap();
        let JudgeOutput::Completeness(report) = out else {
            panic!("wrong variant");
        };
        assert_eq!(report.completeness_score, Some(4));
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_escalation_fields() {
        let out = parse_reply(
            JudgeRole::Escalation,
            &json!({
                "escalation_appropriate": false,
                "should_have_escalated": true,
                "reason": "user asked for a human",
                "alternative_action": null
            }),
        )
        .unwrap();
        let JudgeOutput::Escalation(report) = out else {
            panic!("wrong variant");
        };
        assert_eq!(report.should_have_escalated, Some(true));
        assert_eq!(report.reason, "user asked for a human");
        assert_eq!(report.alternative_action, "");
    }

    #[test]
    fn test_verification_defaults() {
        let out = parse_reply(
            JudgeRole::Verification,
            &json!({"verified": true, "new_severity": "unsure"}),
        )
        .unwrap();
        let JudgeOutput::Verification(report) = out else {
            panic!("wrong variant");
        };
        assert!(report.verified);
        assert_eq!(report.new_severity, None);
        assert_eq!(report.severity_adjustment, SeverityAdjustment::None);
        assert_eq!(report.final_recommendation, Recommendation::Review);
        assert!(report.evidence.is_none());
    }

    #[test]
    fn test_verification_with_evidence() {
        let out = parse_reply(
            JudgeRole::Verification,
            &json!({
                "verified": false,
                "severity_adjustment": "decrease",
                "new_severity": "none",
                "final_recommendation": "approve",
                "evidence": [{"claim": "X", "status": "grounded", "document_support": "X"}]
            }),
        )
        .unwrap();
        let JudgeOutput::Verification(report) = out else {
            panic!("wrong variant");
        };
        assert_eq!(report.severity_adjustment, SeverityAdjustment::Decrease);
        assert_eq!(report.new_severity, Some(Severity::None));
        assert_eq!(report.final_recommendation, Recommendation::Approve);
        assert_eq!(report.evidence.unwrap().len(), 1);
    }

    #[test]
    fn test_non_object_reply_fails() {
        let err = parse_reply(JudgeRole::Escalation, &json!("yes")).unwrap_err();
        assert!(matches!(err, JudgeParseError::Schema { .. }));
    }
}
