//! Document relevance judge.

use async_trait::async_trait;
use std::sync::Arc;

use arbiter_core::JudgeRole;

use super::traits::{AgentError, Judge, JudgeRequest};
use crate::prompts;
use crate::resilience::ResilientProvider;

/// Scores whether the retrieved documents can answer the question.
pub struct RelevanceJudge {
    provider: Arc<ResilientProvider>,
}

impl RelevanceJudge {
    pub fn new(provider: Arc<ResilientProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Judge for RelevanceJudge {
    fn role(&self) -> JudgeRole {
        JudgeRole::DocumentRelevance
    }

    fn provider(&self) -> &ResilientProvider {
        &self.provider
    }

    fn render_prompt(&self, request: &JudgeRequest<'_>) -> Result<String, AgentError> {
        Ok(prompts::relevance_prompt(request.conversation))
    }
}
