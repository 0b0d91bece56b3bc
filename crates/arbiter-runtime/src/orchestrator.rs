//! Two-stage judge orchestration.
//!
//! For one conversation the orchestrator:
//! 1. fans out the four independent Stage-1 judges onto a bounded worker pool
//! 2. collects each judge's result from its own single-use channel
//! 3. asks the escalation policy whether the finding needs verification
//! 4. runs the Verification judge on the Stage-1 finding and merges its verdict
//!
//! Judge failures, timeouts and panics only make their axis unavailable.
//! The conversation fails as a whole only on an [`OrchestrationError`].

use futures::{future::join_all, stream, StreamExt};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use arbiter_core::{
    AggregatedEvaluation, ConversationInput, EscalationPolicy, EvaluationStage,
    HallucinationReport, InputError, JudgeResult, JudgeRole,
};

use crate::agents::{
    CompletenessJudge, EscalationJudge, HallucinationJudge, Judge, JudgeRequest, RelevanceJudge,
    VerificationJudge,
};
use crate::config::{ConfigError, EvaluatorConfig, OrchestrationSettings};
use crate::providers::{ProviderError, ProviderFactories, ProviderRegistry};
use crate::resilience::UsageTracker;

/// Errors that fail a whole conversation, or orchestrator construction.
#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),

    #[error("no judge registered for {0}")]
    MissingJudge(JudgeRole),

    #[error("worker pool is closed")]
    PoolClosed,

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("provider setup failed: {0}")]
    Provider(#[from] ProviderError),
}

/// What a judge task sends back on its channel.
enum TaskOutcome {
    Finished(JudgeResult),
    TimedOut(Duration),
}

/// A spawned judge and the receiving end of its result channel.
struct PendingJudge {
    role: JudgeRole,
    handle: JoinHandle<()>,
    receiver: oneshot::Receiver<TaskOutcome>,
}

/// Drives conversations through the judge set.
///
/// Cheap to clone; clones share judges, the worker pool and usage counters.
#[derive(Clone)]
pub struct Orchestrator {
    judges: BTreeMap<JudgeRole, Arc<dyn Judge>>,
    settings: OrchestrationSettings,
    policy: EscalationPolicy,
    pool: Arc<Semaphore>,
    usage: Arc<UsageTracker>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("judges", &self.judges.keys().collect::<Vec<_>>())
            .field("settings", &self.settings)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Build providers and judges from configuration.
    pub fn from_config(
        config: &EvaluatorConfig,
        factories: &ProviderFactories,
    ) -> Result<Self, OrchestrationError> {
        config.validate()?;

        let usage = Arc::new(UsageTracker::new());
        let registry = ProviderRegistry::from_config(config, factories, usage.clone())?;

        Self::builder()
            .judge(Arc::new(HallucinationJudge::new(
                registry.for_role(JudgeRole::Hallucination)?,
            )))
            .judge(Arc::new(RelevanceJudge::new(
                registry.for_role(JudgeRole::DocumentRelevance)?,
            )))
            .judge(Arc::new(CompletenessJudge::new(
                registry.for_role(JudgeRole::Completeness)?,
            )))
            .judge(Arc::new(EscalationJudge::new(
                registry.for_role(JudgeRole::Escalation)?,
            )))
            .judge(Arc::new(VerificationJudge::new(
                registry.for_role(JudgeRole::Verification)?,
            )))
            .settings(config.orchestration.clone())
            .policy(config.escalation.clone())
            .usage_tracker(usage)
            .build()
    }

    pub fn settings(&self) -> &OrchestrationSettings {
        &self.settings
    }

    /// Usage across every evaluation run by this orchestrator and its clones.
    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Close the worker pool. Later evaluations fail with
    /// [`OrchestrationError::PoolClosed`]; running judges finish.
    pub fn shutdown(&self) {
        self.pool.close();
    }

    fn judge(&self, role: JudgeRole) -> Result<Arc<dyn Judge>, OrchestrationError> {
        self.judges
            .get(&role)
            .cloned()
            .ok_or(OrchestrationError::MissingJudge(role))
    }

    /// Evaluate one conversation.
    ///
    /// Never fails: an [`OrchestrationError`] yields a record with
    /// `success = false` and a top-level error.
    pub async fn evaluate_one(&self, input: ConversationInput) -> AggregatedEvaluation {
        let session_id = input.session_id.clone();

        match self.try_evaluate(Arc::new(input)).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                tracing::error!(session_id = %session_id, error = %e, "Evaluation failed");
                AggregatedEvaluation::failed(session_id, e.to_string())
            }
        }
    }

    /// Evaluate many conversations, `batch_concurrency` at a time.
    ///
    /// Output order follows completion, not input; correlate on
    /// `session_id`. Every input yields exactly one record.
    pub async fn evaluate_batch(&self, inputs: Vec<ConversationInput>) -> Vec<AggregatedEvaluation> {
        let total = inputs.len();
        let completed = AtomicUsize::new(0);

        tracing::info!(
            total,
            concurrency = self.settings.batch_concurrency,
            "Starting batch evaluation"
        );

        let results: Vec<AggregatedEvaluation> = stream::iter(inputs)
            .map(|input| {
                let this = self.clone();
                async move {
                    let session_id = input.session_id.clone();
                    // Own task per conversation so a panic stays contained
                    match tokio::spawn(async move { this.evaluate_one(input).await }).await {
                        Ok(evaluation) => evaluation,
                        Err(e) => {
                            tracing::error!(
                                session_id = %session_id,
                                error = %e,
                                "Evaluation task aborted"
                            );
                            AggregatedEvaluation::failed(
                                session_id,
                                format!("evaluation task aborted: {}", e),
                            )
                        }
                    }
                }
            })
            .buffer_unordered(self.settings.batch_concurrency.max(1))
            .inspect(|_| {
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                if done % 10 == 0 || done == total {
                    tracing::info!(done, total, "Batch progress");
                }
            })
            .collect()
            .await;

        let failed = results.iter().filter(|r| !r.success).count();
        tracing::info!(total, failed, "Batch evaluation finished");
        results
    }

    async fn try_evaluate(
        &self,
        input: Arc<ConversationInput>,
    ) -> Result<AggregatedEvaluation, OrchestrationError> {
        input.validate()?;

        let session_id = input.session_id.clone();
        let mut evaluation = AggregatedEvaluation::new(session_id.as_str());
        tracing::info!(
            session_id = %session_id,
            parallel = self.settings.parallel_agents,
            "Starting evaluation"
        );

        evaluation.stage = EvaluationStage::StageOneRunning;
        self.run_stage_one(&input, &mut evaluation).await?;
        evaluation.stage = EvaluationStage::StageOneDone;

        let trigger = if self.settings.run_verification {
            self.policy.evaluate(
                evaluation.hallucination_report(),
                evaluation.relevance_report(),
                evaluation.completeness_report(),
            )
        } else {
            None
        };

        if let Some(trigger) = trigger {
            // The policy only fires on an existing hallucination report
            if let Some(finding) = evaluation.hallucination_report().cloned() {
                tracing::info!(session_id = %session_id, trigger = ?trigger, "Escalating to verification");
                evaluation.escalation_trigger = Some(trigger);
                evaluation.stage = EvaluationStage::StageTwoRunning;

                // Stage-1 results stand even if Stage 2 cannot start
                let result = match self.run_verification(&input, finding).await {
                    Ok(result) => result,
                    Err(e) => JudgeResult::failed(JudgeRole::Verification, e.to_string()),
                };
                evaluation.apply_verification(result);
            }
        }

        evaluation.stage = EvaluationStage::Done;
        tracing::info!(
            session_id = %session_id,
            available = evaluation.available_axes(),
            verified = evaluation.verification.as_ref().is_some_and(|v| v.success),
            llm_calls = evaluation.usage.llm_calls,
            "Evaluation finished"
        );
        Ok(evaluation)
    }

    async fn run_stage_one(
        &self,
        input: &Arc<ConversationInput>,
        evaluation: &mut AggregatedEvaluation,
    ) -> Result<(), OrchestrationError> {
        if self.settings.parallel_agents {
            let mut pending = Vec::with_capacity(JudgeRole::STAGE_ONE.len());
            for role in JudgeRole::STAGE_ONE {
                let judge = self.judge(role)?;
                let permit = self.acquire().await?;
                pending.push(self.spawn_judge(judge, input.clone(), None, permit));
            }

            for (role, outcome) in join_all(pending.into_iter().map(Self::collect)).await {
                Self::record(evaluation, role, outcome);
            }
        } else {
            for role in JudgeRole::STAGE_ONE {
                let judge = self.judge(role)?;
                let permit = self.acquire().await?;
                let pending = self.spawn_judge(judge, input.clone(), None, permit);
                let (role, outcome) = Self::collect(pending).await;
                Self::record(evaluation, role, outcome);
            }
        }
        Ok(())
    }

    async fn run_verification(
        &self,
        input: &Arc<ConversationInput>,
        finding: HallucinationReport,
    ) -> Result<JudgeResult, OrchestrationError> {
        let judge = self.judge(JudgeRole::Verification)?;
        let permit = self.acquire().await?;
        let pending = self.spawn_judge(judge, input.clone(), Some(finding), permit);

        Ok(match Self::collect(pending).await {
            (_, Ok(result)) => result,
            (role, Err(reason)) => JudgeResult::failed(role, reason),
        })
    }

    async fn acquire(&self) -> Result<OwnedSemaphorePermit, OrchestrationError> {
        self.pool
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| OrchestrationError::PoolClosed)
    }

    /// Spawn one judge under its own timeout governor.
    ///
    /// The timeout wraps the judge future inside the task, so on expiry the
    /// in-flight call is dropped there and nothing late can reach the channel.
    fn spawn_judge(
        &self,
        judge: Arc<dyn Judge>,
        input: Arc<ConversationInput>,
        finding: Option<HallucinationReport>,
        permit: OwnedSemaphorePermit,
    ) -> PendingJudge {
        let role = judge.role();
        let timeout = self.settings.judge_timeout;
        let (sender, receiver) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            let mut request = JudgeRequest::new(&input);
            if let Some(finding) = finding.as_ref() {
                request = request.with_finding(finding);
            }

            let outcome = match tokio::time::timeout(timeout, judge.evaluate(&request)).await {
                Ok(result) => TaskOutcome::Finished(result),
                Err(_) => TaskOutcome::TimedOut(timeout),
            };
            // Receiver is gone only if the evaluation itself was dropped
            let _ = sender.send(outcome);
        });

        PendingJudge {
            role,
            handle,
            receiver,
        }
    }

    /// Wait for a judge's channel; map timeouts and panics to a reason.
    async fn collect(pending: PendingJudge) -> (JudgeRole, Result<JudgeResult, String>) {
        let PendingJudge {
            role,
            handle,
            receiver,
        } = pending;

        let outcome = match receiver.await {
            Ok(TaskOutcome::Finished(result)) => Ok(result),
            Ok(TaskOutcome::TimedOut(timeout)) => Err(format!(
                "timed out after {}",
                humantime::format_duration(timeout)
            )),
            Err(_) => match handle.await {
                Err(e) if e.is_panic() => Err("judge panicked".to_string()),
                Err(e) => Err(format!("judge task aborted: {}", e)),
                Ok(()) => Err("judge ended without a result".to_string()),
            },
        };
        (role, outcome)
    }

    fn record(
        evaluation: &mut AggregatedEvaluation,
        role: JudgeRole,
        outcome: Result<JudgeResult, String>,
    ) {
        match outcome {
            Ok(result) => evaluation.record(result),
            Err(reason) => {
                tracing::warn!(
                    session_id = %evaluation.session_id,
                    judge = %role,
                    reason = %reason,
                    "Judge unavailable"
                );
                evaluation.mark_unavailable(role, reason);
            }
        }
    }
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    judges: BTreeMap<JudgeRole, Arc<dyn Judge>>,
    settings: OrchestrationSettings,
    policy: EscalationPolicy,
    usage: Option<Arc<UsageTracker>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            judges: BTreeMap::new(),
            settings: OrchestrationSettings::default(),
            policy: EscalationPolicy::default(),
            usage: None,
        }
    }

    /// Register a judge, replacing any with the same role.
    pub fn judge(mut self, judge: Arc<dyn Judge>) -> Self {
        self.judges.insert(judge.role(), judge);
        self
    }

    pub fn settings(mut self, settings: OrchestrationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn policy(mut self, policy: EscalationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn usage_tracker(mut self, usage: Arc<UsageTracker>) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Build the orchestrator.
    ///
    /// All Stage-1 judges are required, and the verifier too unless
    /// verification is disabled.
    pub fn build(self) -> Result<Orchestrator, OrchestrationError> {
        for role in JudgeRole::STAGE_ONE {
            if !self.judges.contains_key(&role) {
                return Err(OrchestrationError::MissingJudge(role));
            }
        }
        if self.settings.run_verification && !self.judges.contains_key(&JudgeRole::Verification) {
            return Err(OrchestrationError::MissingJudge(JudgeRole::Verification));
        }

        for judge in self.judges.values() {
            let budget = judge.provider().policy().budget();
            if self.settings.judge_timeout < budget {
                tracing::warn!(
                    judge = %judge.role(),
                    judge_timeout = ?self.settings.judge_timeout,
                    retry_budget = ?budget,
                    "Judge timeout can cut provider retries short"
                );
            }
        }

        let pool = Arc::new(Semaphore::new(self.settings.worker_pool_size.max(1)));

        Ok(Orchestrator {
            judges: self.judges,
            settings: self.settings,
            policy: self.policy,
            pool,
            usage: self.usage.unwrap_or_default(),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::LlmProvider;
    use crate::agents::AgentError;
    use crate::resilience::{ResilientProvider, RetryPolicy};
    use crate::testing::{
        completeness_reply, escalation_reply, hallucination_reply, relevance_reply, resilient,
        resilient_with_policy, verification_reply, RoutedProvider, Step,
    };
    use async_trait::async_trait;
    use arbiter_core::{EscalationTrigger, Severity};

    fn input(session_id: &str) -> ConversationInput {
        ConversationInput::new(
            session_id,
            "What is the transfer limit?",
            "The limit is 5,000 per day.",
            "Doc 1: Transfers are limited to 5,000 per day.",
        )
    }

    fn orchestrator(backend: Arc<RoutedProvider>, settings: OrchestrationSettings) -> Orchestrator {
        orchestrator_with_policy(backend, settings, EscalationPolicy::default())
    }

    fn orchestrator_with_policy(
        backend: Arc<RoutedProvider>,
        settings: OrchestrationSettings,
        policy: EscalationPolicy,
    ) -> Orchestrator {
        let backend: Arc<dyn LlmProvider> = backend;
        let provider = resilient(backend);
        Orchestrator::builder()
            .judge(Arc::new(HallucinationJudge::new(provider.clone())))
            .judge(Arc::new(RelevanceJudge::new(provider.clone())))
            .judge(Arc::new(CompletenessJudge::new(provider.clone())))
            .judge(Arc::new(EscalationJudge::new(provider.clone())))
            .judge(Arc::new(VerificationJudge::new(provider)))
            .settings(settings)
            .policy(policy)
            .build()
            .unwrap()
    }

    /// Stage-1 scripts with a clean hallucination verdict.
    fn clean_backend() -> RoutedProvider {
        RoutedProvider::new()
            .route(
                JudgeRole::Hallucination,
                vec![Step::reply(hallucination_reply(false, "none", &["grounded"]))],
            )
            .route(JudgeRole::DocumentRelevance, vec![Step::reply(relevance_reply(5))])
            .route(JudgeRole::Completeness, vec![Step::reply(completeness_reply(4))])
            .route(JudgeRole::Escalation, vec![Step::reply(escalation_reply(true))])
    }

    #[tokio::test]
    async fn test_clean_conversation_skips_verification() {
        let backend = Arc::new(clean_backend());
        let orchestrator = orchestrator(backend.clone(), OrchestrationSettings::default());

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert!(evaluation.success);
        assert_eq!(evaluation.stage, EvaluationStage::Done);
        assert_eq!(evaluation.available_axes(), 4);
        assert!(evaluation.unavailable.is_empty());
        assert!(evaluation.verification.is_none());
        assert!(evaluation.escalation_trigger.is_none());
        assert_eq!(backend.calls(JudgeRole::Verification), 0);
        assert_eq!(evaluation.usage.llm_calls, 4);
    }

    #[tokio::test]
    async fn test_one_failed_judge_leaves_other_axes() {
        let backend = Arc::new(
            clean_backend().route(JudgeRole::Completeness, vec![Step::Fail(ProviderError::AuthError)]),
        );
        let orchestrator = orchestrator(backend, OrchestrationSettings::default());

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert!(evaluation.success);
        assert_eq!(evaluation.available_axes(), 3);
        assert!(evaluation.unavailable.contains_key(&JudgeRole::Completeness));
        assert!(!evaluation.completeness.as_ref().unwrap().success);
        assert!(evaluation.completeness_report().is_none());
        assert!(evaluation.relevance_report().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_judge_times_out() {
        let backend = Arc::new(clean_backend().route(JudgeRole::Escalation, vec![Step::Hang]));
        let settings = OrchestrationSettings {
            judge_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let orchestrator = orchestrator(backend, settings);

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert!(evaluation.success);
        assert_eq!(evaluation.available_axes(), 3);
        let reason = &evaluation.unavailable[&JudgeRole::Escalation];
        assert!(reason.contains("timed out"), "reason: {}", reason);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_deadline_leaves_room_for_retry() {
        let backend = Arc::new(clean_backend().route(
            JudgeRole::Hallucination,
            vec![
                Step::Hang,
                Step::reply(hallucination_reply(false, "none", &["grounded"])),
            ],
        ));
        let backend_dyn: Arc<dyn LlmProvider> = backend.clone();
        let provider = resilient_with_policy(backend_dyn, RetryPolicy::default());
        let orchestrator = Orchestrator::builder()
            .judge(Arc::new(HallucinationJudge::new(provider.clone())))
            .judge(Arc::new(RelevanceJudge::new(provider.clone())))
            .judge(Arc::new(CompletenessJudge::new(provider.clone())))
            .judge(Arc::new(EscalationJudge::new(provider.clone())))
            .judge(Arc::new(VerificationJudge::new(provider)))
            .settings(OrchestrationSettings::default())
            .build()
            .unwrap();

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert!(evaluation.unavailable.is_empty(), "{:?}", evaluation.unavailable);
        assert!(evaluation.hallucination.as_ref().unwrap().success);
        assert_eq!(backend.calls(JudgeRole::Hallucination), 2);
        assert_eq!(evaluation.available_axes(), 4);
    }

    #[tokio::test]
    async fn test_panicking_judge_is_contained() {
        let backend = Arc::new(clean_backend().route(JudgeRole::DocumentRelevance, vec![Step::Panic]));
        let orchestrator = orchestrator(backend, OrchestrationSettings::default());

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert!(evaluation.success);
        assert_eq!(evaluation.available_axes(), 3);
        assert_eq!(
            evaluation.unavailable[&JudgeRole::DocumentRelevance],
            "judge panicked"
        );
    }

    #[tokio::test]
    async fn test_unflagged_hallucination_escalates_and_is_verified() {
        let backend = Arc::new(
            clean_backend()
                .route(
                    JudgeRole::Hallucination,
                    vec![Step::reply(hallucination_reply(
                        false,
                        "none",
                        &["grounded", "hallucination"],
                    ))],
                )
                .route(
                    JudgeRole::Verification,
                    vec![Step::reply(verification_reply(true, "major"))],
                ),
        );
        let orchestrator = orchestrator(backend.clone(), OrchestrationSettings::default());

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert!(evaluation.success);
        assert_eq!(backend.calls(JudgeRole::Verification), 1);
        assert_eq!(
            evaluation.escalation_trigger,
            Some(EscalationTrigger::HallucinationDetected {
                severity: Severity::Minor
            })
        );

        let report = evaluation.hallucination_report().unwrap();
        assert!(report.detected());
        assert_eq!(report.severity(), Severity::Major);
        let superseded = report.superseded.as_ref().unwrap();
        assert_eq!(superseded.severity, Severity::Minor);
        assert!(evaluation.verification_error.is_none());
    }

    #[tokio::test]
    async fn test_rejected_finding_is_cleared() {
        let backend = Arc::new(
            clean_backend()
                .route(
                    JudgeRole::Hallucination,
                    vec![Step::reply(hallucination_reply(true, "major", &["hallucination"]))],
                )
                .route(
                    JudgeRole::Verification,
                    vec![Step::reply(verification_reply(false, "none"))],
                ),
        );
        let orchestrator = orchestrator(backend, OrchestrationSettings::default());

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        let report = evaluation.hallucination_report().unwrap();
        assert!(!report.detected());
        assert_eq!(report.severity(), Severity::None);
        assert!(report.verdict.is_consistent());
    }

    #[tokio::test]
    async fn test_failed_verification_keeps_stage_one() {
        let backend = Arc::new(
            clean_backend()
                .route(
                    JudgeRole::Hallucination,
                    vec![Step::reply(hallucination_reply(true, "critical", &["hallucination"]))],
                )
                .route(
                    JudgeRole::Verification,
                    vec![Step::Fail(ProviderError::Transient("connection reset".into()))],
                ),
        );
        let orchestrator = orchestrator(backend, OrchestrationSettings::default());

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert!(evaluation.success);
        let report = evaluation.hallucination_report().unwrap();
        assert!(report.detected());
        assert_eq!(report.severity(), Severity::Critical);
        assert!(report.superseded.is_none());

        let error = evaluation.verification_error.as_ref().unwrap();
        assert!(error.contains("exhausted"), "error: {}", error);
        assert!(!evaluation.verification.as_ref().unwrap().success);
        assert!(evaluation.unavailable.contains_key(&JudgeRole::Verification));
    }

    /// Closes the worker pool once it has produced its result.
    struct PoolClosingJudge {
        inner: EscalationJudge,
        pool: Arc<Semaphore>,
    }

    #[async_trait]
    impl Judge for PoolClosingJudge {
        fn role(&self) -> JudgeRole {
            self.inner.role()
        }

        fn provider(&self) -> &ResilientProvider {
            self.inner.provider()
        }

        fn render_prompt(&self, request: &JudgeRequest<'_>) -> Result<String, AgentError> {
            self.inner.render_prompt(request)
        }

        async fn evaluate(&self, request: &JudgeRequest<'_>) -> JudgeResult {
            let result = self.inner.evaluate(request).await;
            self.pool.close();
            result
        }
    }

    #[tokio::test]
    async fn test_pool_closed_before_verification_keeps_stage_one() {
        let backend = Arc::new(clean_backend().route(
            JudgeRole::Hallucination,
            vec![Step::reply(hallucination_reply(true, "major", &["hallucination"]))],
        ));
        let settings = OrchestrationSettings {
            parallel_agents: false,
            ..Default::default()
        };
        let mut orchestrator = orchestrator(backend.clone(), settings);
        let backend_dyn: Arc<dyn LlmProvider> = backend.clone();
        let closing = PoolClosingJudge {
            inner: EscalationJudge::new(resilient(backend_dyn)),
            pool: orchestrator.pool.clone(),
        };
        orchestrator.judges.insert(JudgeRole::Escalation, Arc::new(closing));

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert!(evaluation.success);
        assert_eq!(evaluation.stage, EvaluationStage::Done);
        assert_eq!(evaluation.available_axes(), 4);
        assert_eq!(evaluation.verification_error.as_deref(), Some("worker pool is closed"));
        assert!(evaluation.unavailable.contains_key(&JudgeRole::Verification));

        let report = evaluation.hallucination_report().unwrap();
        assert!(report.detected());
        assert_eq!(report.severity(), Severity::Major);
        assert!(report.superseded.is_none());
        assert_eq!(backend.calls(JudgeRole::Verification), 0);
    }

    #[tokio::test]
    async fn test_min_severity_trigger_skips_minor() {
        let backend = Arc::new(clean_backend().route(
            JudgeRole::Hallucination,
            vec![Step::reply(hallucination_reply(true, "minor", &["hallucination"]))],
        ));
        let policy = EscalationPolicy {
            verification_trigger: arbiter_core::VerificationTrigger::MinSeverity(Severity::Major),
            quality_threshold: None,
        };
        let orchestrator =
            orchestrator_with_policy(backend.clone(), OrchestrationSettings::default(), policy);

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert!(evaluation.hallucination_report().unwrap().detected());
        assert_eq!(backend.calls(JudgeRole::Verification), 0);
    }

    #[tokio::test]
    async fn test_quality_threshold_triggers_verification() {
        let backend = Arc::new(
            clean_backend()
                .route(JudgeRole::DocumentRelevance, vec![Step::reply(relevance_reply(1))])
                .route(
                    JudgeRole::Verification,
                    vec![Step::reply(verification_reply(false, "none"))],
                ),
        );
        let policy = EscalationPolicy {
            quality_threshold: Some(2),
            ..Default::default()
        };
        let orchestrator =
            orchestrator_with_policy(backend.clone(), OrchestrationSettings::default(), policy);

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert_eq!(backend.calls(JudgeRole::Verification), 1);
        assert_eq!(
            evaluation.escalation_trigger,
            Some(EscalationTrigger::QualityBelowThreshold {
                judge: JudgeRole::DocumentRelevance,
                score: 1
            })
        );
    }

    #[tokio::test]
    async fn test_verification_disabled() {
        let backend = Arc::new(clean_backend().route(
            JudgeRole::Hallucination,
            vec![Step::reply(hallucination_reply(true, "major", &["hallucination"]))],
        ));
        let settings = OrchestrationSettings {
            run_verification: false,
            ..Default::default()
        };
        let orchestrator = orchestrator(backend.clone(), settings);

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert!(evaluation.hallucination_report().unwrap().detected());
        assert!(evaluation.verification.is_none());
        assert_eq!(backend.calls(JudgeRole::Verification), 0);
    }

    #[tokio::test]
    async fn test_sequential_mode() {
        let backend = Arc::new(clean_backend());
        let settings = OrchestrationSettings {
            parallel_agents: false,
            worker_pool_size: 1,
            ..Default::default()
        };
        let orchestrator = orchestrator(backend, settings);

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert!(evaluation.success);
        assert_eq!(evaluation.available_axes(), 4);
    }

    #[tokio::test]
    async fn test_empty_session_id_fails_evaluation() {
        let backend = Arc::new(clean_backend());
        let orchestrator = orchestrator(backend.clone(), OrchestrationSettings::default());

        let evaluation = orchestrator.evaluate_one(input("  ")).await;

        assert!(!evaluation.success);
        assert_eq!(evaluation.stage, EvaluationStage::Failed);
        assert!(evaluation.error.as_ref().unwrap().contains("session_id"));
        assert!(evaluation.hallucination.is_none());
        assert_eq!(backend.calls(JudgeRole::Hallucination), 0);
    }

    #[tokio::test]
    async fn test_closed_pool_fails_evaluation() {
        let orchestrator = orchestrator(Arc::new(clean_backend()), OrchestrationSettings::default());
        orchestrator.shutdown();

        let evaluation = orchestrator.evaluate_one(input("s-1")).await;

        assert!(!evaluation.success);
        assert_eq!(evaluation.error.as_deref(), Some("worker pool is closed"));
    }

    #[tokio::test]
    async fn test_batch_keeps_every_conversation() {
        let n = 11;
        let script = |reply: serde_json::Value| -> Vec<Step> {
            (0..n).map(|_| Step::reply(reply.clone())).collect()
        };
        let backend = Arc::new(
            RoutedProvider::new()
                .route(
                    JudgeRole::Hallucination,
                    script(hallucination_reply(false, "none", &["grounded"])),
                )
                .route(JudgeRole::DocumentRelevance, script(relevance_reply(4)))
                .route(JudgeRole::Completeness, script(completeness_reply(4)))
                .route(JudgeRole::Escalation, script(escalation_reply(true))),
        );
        let orchestrator = orchestrator(backend, OrchestrationSettings::default());

        let mut inputs: Vec<_> = (0..n).map(|i| input(&format!("s-{}", i))).collect();
        inputs.push(input(""));

        let results = orchestrator.evaluate_batch(inputs).await;

        assert_eq!(results.len(), 12);
        assert_eq!(results.iter().filter(|r| !r.success).count(), 1);
        let mut ids: Vec<_> = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.session_id.clone())
            .collect();
        ids.sort();
        let mut expected: Vec<_> = (0..n).map(|i| format!("s-{}", i)).collect();
        expected.sort();
        assert_eq!(ids, expected);
        assert!(results.iter().filter(|r| r.success).all(|r| r.available_axes() == 4));
    }

    #[test]
    fn test_builder_requires_judges() {
        let backend: Arc<dyn LlmProvider> = Arc::new(RoutedProvider::new());
        let provider = resilient(backend);

        let err = Orchestrator::builder()
            .judge(Arc::new(HallucinationJudge::new(provider.clone())))
            .build()
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::MissingJudge(JudgeRole::DocumentRelevance)));

        let without_verifier = Orchestrator::builder()
            .judge(Arc::new(HallucinationJudge::new(provider.clone())))
            .judge(Arc::new(RelevanceJudge::new(provider.clone())))
            .judge(Arc::new(CompletenessJudge::new(provider.clone())))
            .judge(Arc::new(EscalationJudge::new(provider)));
        assert!(matches!(
            without_verifier.build().unwrap_err(),
            OrchestrationError::MissingJudge(JudgeRole::Verification)
        ));
    }
}
