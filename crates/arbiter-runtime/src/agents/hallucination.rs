//! Hallucination judge.
//!
//! The reply is reconciled by the Consistency Validator during parsing, so
//! every report this judge returns already satisfies
//! `detected == (hallucinated claims > 0)`.

use async_trait::async_trait;
use std::sync::Arc;

use arbiter_core::JudgeRole;

use super::traits::{AgentError, Judge, JudgeRequest};
use crate::prompts;
use crate::resilience::ResilientProvider;

pub struct HallucinationJudge {
    provider: Arc<ResilientProvider>,
}

impl HallucinationJudge {
    pub fn new(provider: Arc<ResilientProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Judge for HallucinationJudge {
    fn role(&self) -> JudgeRole {
        JudgeRole::Hallucination
    }

    fn provider(&self) -> &ResilientProvider {
        &self.provider
    }

    fn render_prompt(&self, request: &JudgeRequest<'_>) -> Result<String, AgentError> {
        Ok(prompts::hallucination_prompt(request.conversation))
    }
}
