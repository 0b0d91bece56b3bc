//! Completeness judge.

use async_trait::async_trait;
use std::sync::Arc;

use arbiter_core::JudgeRole;

use super::traits::{AgentError, Judge, JudgeRequest};
use crate::prompts;
use crate::resilience::ResilientProvider;

/// Scores whether the answer used everything relevant in the documents.
pub struct CompletenessJudge {
    provider: Arc<ResilientProvider>,
}

impl CompletenessJudge {
    pub fn new(provider: Arc<ResilientProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Judge for CompletenessJudge {
    fn role(&self) -> JudgeRole {
        JudgeRole::Completeness
    }

    fn provider(&self) -> &ResilientProvider {
        &self.provider
    }

    fn render_prompt(&self, request: &JudgeRequest<'_>) -> Result<String, AgentError> {
        Ok(prompts::completeness_prompt(request.conversation))
    }
}
