//! # arbiter-runtime
//!
//! Model-facing half of the arbiter judge engine.
//!
//! `arbiter-core` decides what a verdict means; this crate gets the verdicts:
//! it renders judge prompts, calls the model backends with retries and
//! timeouts, and runs the two-stage protocol over one conversation or a batch.
//!
//! ## Stages
//!
//! 1. Hallucination, document relevance, completeness and escalation judges
//!    run independently on a bounded worker pool
//! 2. When the escalation policy fires, a verification judge re-examines the
//!    hallucination finding on the powerful tier
//!
//! A judge that fails, times out or panics costs only its own axis.
//!
//! ## Example
//!
//! ```rust,ignore
//! use arbiter_runtime::{EvaluatorConfig, Orchestrator, ProviderFactories};
//!
//! let config = EvaluatorConfig::from_yaml_file("arbiter.yaml")?;
//! let orchestrator = Orchestrator::from_config(&config, &ProviderFactories::with_defaults())?;
//!
//! let evaluations = orchestrator.evaluate_batch(conversations).await;
//! for evaluation in &evaluations {
//!     println!("{}: {} axes", evaluation.session_id, evaluation.available_axes());
//! }
//! ```

pub mod agents;
pub mod config;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod resilience;

#[cfg(test)]
mod testing;

pub use agents::{
    AgentError, CompletenessJudge, EscalationJudge, HallucinationJudge, Judge, JudgeRequest,
    RelevanceJudge, VerificationJudge,
};
pub use config::{
    ConfigError, CredentialSettings, EvaluatorConfig, GenerationSettings, ModelTiers,
    OrchestrationSettings,
};
pub use orchestrator::{OrchestrationError, Orchestrator, OrchestratorBuilder};
pub use providers::{
    ApiCredential, CompletionResponse, GenerationConfig, LlmProvider, ProviderError,
    ProviderErrorKind, ProviderFactories, ProviderFactory, ProviderRegistry, Tier,
    TierAssignments,
};
pub use resilience::{Generation, JsonGeneration, ResilientProvider, RetryPolicy, UsageTracker};
