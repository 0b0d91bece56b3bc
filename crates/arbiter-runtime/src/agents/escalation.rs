//! Escalation validator.

use async_trait::async_trait;
use std::sync::Arc;

use arbiter_core::JudgeRole;

use super::traits::{AgentError, Judge, JudgeRequest};
use crate::prompts;
use crate::resilience::ResilientProvider;

/// Judges whether handing off (or not) to a human was the right call.
pub struct EscalationJudge {
    provider: Arc<ResilientProvider>,
}

impl EscalationJudge {
    pub fn new(provider: Arc<ResilientProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Judge for EscalationJudge {
    fn role(&self) -> JudgeRole {
        JudgeRole::Escalation
    }

    fn provider(&self) -> &ResilientProvider {
        &self.provider
    }

    fn render_prompt(&self, request: &JudgeRequest<'_>) -> Result<String, AgentError> {
        Ok(prompts::escalation_prompt(request.conversation))
    }
}
