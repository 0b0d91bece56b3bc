//! Judge trait and common types.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::time::Instant;
use thiserror::Error;

use arbiter_core::{
    parse_reply, ConversationInput, HallucinationReport, JudgeOutput, JudgeParseError, JudgeResult,
    JudgeRole, LlmUsage,
};

use crate::providers::ProviderError;
use crate::resilience::ResilientProvider;

/// Errors inside a judge. Never escape [`Judge::evaluate`].
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("prompt rendering failed: {0}")]
    Prompt(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("reply rejected: {0}")]
    Parse(#[from] JudgeParseError),
}

/// Everything a judge may read for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct JudgeRequest<'a> {
    pub conversation: &'a ConversationInput,

    /// Stage-one hallucination finding; only the verifier reads it
    pub original_finding: Option<&'a HallucinationReport>,
}

impl<'a> JudgeRequest<'a> {
    pub fn new(conversation: &'a ConversationInput) -> Self {
        Self {
            conversation,
            original_finding: None,
        }
    }

    pub fn with_finding(mut self, finding: &'a HallucinationReport) -> Self {
        self.original_finding = Some(finding);
        self
    }
}

/// A judge: renders a prompt, calls its tier's provider, parses the reply.
///
/// # Isolation Contract
/// - `evaluate` never fails; every error becomes a failed [`JudgeResult`]
/// - judges hold no conversation state between calls
/// - no judge reads another judge's result, except the verifier which is
///   handed the stage-one finding explicitly
#[async_trait]
pub trait Judge: Send + Sync {
    fn role(&self) -> JudgeRole;

    /// Provider for this judge's tier.
    fn provider(&self) -> &ResilientProvider;

    fn render_prompt(&self, request: &JudgeRequest<'_>) -> Result<String, AgentError>;

    /// Validate and type the reply JSON.
    fn parse_reply(&self, value: &JsonValue) -> Result<JudgeOutput, AgentError> {
        Ok(parse_reply(self.role(), value)?)
    }

    /// Run the judge once.
    async fn evaluate(&self, request: &JudgeRequest<'_>) -> JudgeResult {
        let role = self.role();
        let session_id = request.conversation.session_id.as_str();
        let started = Instant::now();
        let mut usage = LlmUsage::default();
        let mut raw_response = None;

        let outcome = async {
            let prompt = self.render_prompt(request)?;
            tracing::debug!(
                session_id,
                judge = %role,
                prompt_len = prompt.len(),
                "Rendered judge prompt"
            );

            let generation = self.provider().generate_json(&prompt).await?;
            usage.add(&generation.usage);
            tracing::debug!(
                session_id,
                judge = %role,
                reply_len = generation.raw.len(),
                attempts = generation.attempts,
                "Judge reply received"
            );
            raw_response = Some(generation.raw);

            self.parse_reply(&generation.value)
        }
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                for warning in output.warnings() {
                    tracing::debug!(session_id, judge = %role, warning = %warning, "Reply coerced");
                }
                JudgeResult::succeeded(output, raw_response)
                    .with_elapsed_ms(elapsed_ms)
                    .with_usage(usage)
            }
            Err(e) => {
                tracing::warn!(
                    session_id,
                    judge = %role,
                    error = %e,
                    elapsed_ms,
                    "Judge failed"
                );
                usage.failed_calls += 1;
                JudgeResult::failed(role, e.to_string())
                    .with_raw_response(raw_response)
                    .with_elapsed_ms(elapsed_ms)
                    .with_usage(usage)
            }
        }
    }
}
