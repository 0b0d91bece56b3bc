//! Verification judge: re-examines a stage-one hallucination finding.

use async_trait::async_trait;
use std::sync::Arc;

use arbiter_core::JudgeRole;

use super::traits::{AgentError, Judge, JudgeRequest};
use crate::prompts;
use crate::resilience::ResilientProvider;

pub struct VerificationJudge {
    provider: Arc<ResilientProvider>,
}

impl VerificationJudge {
    pub fn new(provider: Arc<ResilientProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Judge for VerificationJudge {
    fn role(&self) -> JudgeRole {
        JudgeRole::Verification
    }

    fn provider(&self) -> &ResilientProvider {
        &self.provider
    }

    fn render_prompt(&self, request: &JudgeRequest<'_>) -> Result<String, AgentError> {
        let finding = request.original_finding.ok_or_else(|| {
            AgentError::Prompt("verification requires the original finding".to_string())
        })?;
        prompts::verification_prompt(request.conversation, finding)
            .map_err(|e| AgentError::Prompt(format!("cannot serialize finding: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{resilient, verification_reply, RoutedProvider, Step};
    use arbiter_core::{
        ConversationInput, EvidenceItem, HallucinationReport, HallucinationType,
        HallucinationVerdict, Recommendation, Severity,
    };

    fn finding() -> HallucinationReport {
        HallucinationReport::from_raw(
            HallucinationVerdict {
                detected: true,
                severity: Severity::Major,
                hallucination_type: HallucinationType::Fabrication,
                evidence: vec![EvidenceItem::hallucination("fee is 5 dollars", "not in docs")],
                confidence: Some(0.7),
            },
            "fee invented",
            vec![],
        )
    }

    #[tokio::test]
    async fn test_verifies_finding() {
        let backend = Arc::new(RoutedProvider::new().route(
            JudgeRole::Verification,
            vec![Step::reply(verification_reply(true, "critical"))],
        ));
        let judge = VerificationJudge::new(resilient(backend.clone()));

        let input = ConversationInput::new("s-1", "q", "a", "docs");
        let finding = finding();
        let result = judge
            .evaluate(&JudgeRequest::new(&input).with_finding(&finding))
            .await;

        let report = result.verification().unwrap();
        assert!(report.verified);
        assert_eq!(report.new_severity, Some(Severity::Critical));
        assert_eq!(report.final_recommendation, Recommendation::Reject);
        assert_eq!(backend.calls(JudgeRole::Verification), 1);
    }

    #[tokio::test]
    async fn test_missing_finding_fails_without_provider_call() {
        let backend = Arc::new(RoutedProvider::new());
        let judge = VerificationJudge::new(resilient(backend.clone()));

        let input = ConversationInput::new("s-1", "q", "a", "docs");
        let result = judge.evaluate(&JudgeRequest::new(&input)).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("original finding"));
        assert_eq!(backend.calls(JudgeRole::Verification), 0);
    }
}
