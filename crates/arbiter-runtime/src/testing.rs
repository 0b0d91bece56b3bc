//! Scripted providers shared by judge and orchestrator tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use arbiter_core::{JudgeRole, TokenUsage};

use crate::providers::{CompletionResponse, GenerationConfig, LlmProvider, ProviderError, Tier};
use crate::resilience::{ResilientProvider, RetryPolicy};

/// Phrase that identifies each judge's prompt.
pub(crate) fn prompt_marker(role: JudgeRole) -> &'static str {
    match role {
        JudgeRole::Hallucination => "evaluator detecting hallucinations",
        JudgeRole::DocumentRelevance => "whether the retrieved documents are relevant",
        JudgeRole::Completeness => "whether the assistant's response is complete",
        JudgeRole::Escalation => "whether the decision to escalate",
        JudgeRole::Verification => "You are a verification agent",
    }
}

pub(crate) enum Step {
    Reply(String),
    Fail(ProviderError),
    /// Never answers within any test timeout
    Hang,
    Panic,
}

impl Step {
    pub(crate) fn reply(value: serde_json::Value) -> Self {
        Step::Reply(value.to_string())
    }
}

/// Provider that answers each judge from its own script.
#[derive(Default)]
pub(crate) struct RoutedProvider {
    routes: Mutex<BTreeMap<JudgeRole, VecDeque<Step>>>,
    calls: Mutex<BTreeMap<JudgeRole, u32>>,
}

impl RoutedProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(self, role: JudgeRole, steps: Vec<Step>) -> Self {
        self.routes.lock().insert(role, steps.into());
        self
    }

    pub(crate) fn calls(&self, role: JudgeRole) -> u32 {
        self.calls.lock().get(&role).copied().unwrap_or(0)
    }

    fn role_for(prompt: &str) -> Option<JudgeRole> {
        JudgeRole::ALL
            .into_iter()
            .find(|role| prompt.contains(prompt_marker(*role)))
    }
}

#[async_trait]
impl LlmProvider for RoutedProvider {
    async fn complete(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let role = Self::role_for(prompt)
            .ok_or_else(|| ProviderError::Transient("unrecognized prompt".to_string()))?;
        *self.calls.lock().entry(role).or_default() += 1;

        let step = self.routes.lock().get_mut(&role).and_then(VecDeque::pop_front);
        match step {
            Some(Step::Reply(content)) => Ok(CompletionResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 20,
                },
                model: config.model.clone(),
                stop_reason: Some("STOP".to_string()),
            }),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
                Err(ProviderError::Transient("woke from hang".to_string()))
            }
            Some(Step::Panic) => panic!("scripted provider panic"),
            None => Err(ProviderError::Transient(format!("no script left for {}", role))),
        }
    }

    fn name(&self) -> &str {
        "routed"
    }
}

/// Single attempt, 10s per-attempt timeout.
pub(crate) fn resilient(backend: Arc<dyn LlmProvider>) -> Arc<ResilientProvider> {
    resilient_with_policy(
        backend,
        RetryPolicy {
            max_retries: 1,
            timeout: Duration::from_secs(10),
            backoff_base: Duration::from_millis(10),
            max_backoff: Duration::from_millis(10),
        },
    )
}

pub(crate) fn resilient_with_policy(
    backend: Arc<dyn LlmProvider>,
    policy: RetryPolicy,
) -> Arc<ResilientProvider> {
    Arc::new(ResilientProvider::new(
        backend,
        GenerationConfig::new("test-model"),
        policy,
        Tier::Fast,
    ))
}

pub(crate) fn hallucination_reply(
    detected: bool,
    severity: &str,
    statuses: &[&str],
) -> serde_json::Value {
    let evidence: Vec<_> = statuses
        .iter()
        .enumerate()
        .map(|(i, status)| {
            serde_json::json!({
                "claim": format!("claim {}", i + 1),
                "status": status,
                "document_support": if *status == "grounded" { "Doc 1" } else { "NOT FOUND" },
                "explanation": "checked against the documents"
            })
        })
        .collect();
    serde_json::json!({
        "hallucination_detected": detected,
        "severity": severity,
        "hallucination_type": if detected { "fabrication" } else { "none" },
        "evidence": evidence,
        "overall_assessment": "scripted assessment",
        "confidence": 0.9
    })
}

pub(crate) fn relevance_reply(score: u8) -> serde_json::Value {
    serde_json::json!({
        "relevance_score": score,
        "has_answer": score >= 3,
        "missing_information": [],
        "relevant_documents": ["Doc 1"],
        "irrelevant_documents": [],
        "explanation": "scripted"
    })
}

pub(crate) fn completeness_reply(score: u8) -> serde_json::Value {
    serde_json::json!({
        "completeness_score": score,
        "used_all_relevant_info": score >= 4,
        "missing_information": [],
        "unnecessary_clarification": false,
        "explanation": "scripted"
    })
}

pub(crate) fn escalation_reply(appropriate: bool) -> serde_json::Value {
    serde_json::json!({
        "escalation_appropriate": appropriate,
        "should_have_escalated": false,
        "reason": "scripted",
        "alternative_action": ""
    })
}

pub(crate) fn verification_reply(verified: bool, new_severity: &str) -> serde_json::Value {
    serde_json::json!({
        "verified": verified,
        "severity_adjustment": "none",
        "new_severity": new_severity,
        "explanation": "scripted verification",
        "final_recommendation": if verified { "reject" } else { "approve" }
    })
}
