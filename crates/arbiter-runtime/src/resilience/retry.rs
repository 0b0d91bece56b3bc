//! Timeout, retry and backoff around a raw provider.
//!
//! Every attempt gets its own timeout governor. When it fires, the
//! in-flight request future is dropped, so a late reply can never be
//! observed by the next attempt.

use backon::{ExponentialBuilder, Retryable};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arbiter_core::{parse_json_reply, TokenUsage};

use super::UsageTracker;
use crate::config::duration_str;
use crate::providers::{CompletionResponse, GenerationConfig, LlmProvider, ProviderError, Tier};

/// Retry and timeout settings for one `generate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,

    /// Per-attempt timeout
    #[serde(with = "duration_str")]
    pub timeout: Duration,

    /// Delay before the first retry; doubles on each further retry
    #[serde(with = "duration_str")]
    pub backoff_base: Duration,

    #[serde(with = "duration_str")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(120),
            backoff_base: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Upper bound on one `generate` call: every attempt runs into its
    /// timeout and every wait is a full `max_backoff`.
    pub fn budget(&self) -> Duration {
        let attempts = self.max_retries.max(1);
        self.timeout
            .saturating_mul(attempts)
            .saturating_add(self.max_backoff.saturating_mul(attempts - 1))
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.backoff_base)
            .with_max_delay(self.max_backoff)
            .with_factor(2.0)
            .with_max_times(self.max_retries.saturating_sub(1) as usize)
    }
}

/// Text reply of a successful `generate`.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub usage: TokenUsage,
    pub attempts: u32,
    pub model: String,
}

/// Parsed reply of a successful `generate_json`.
#[derive(Debug, Clone)]
pub struct JsonGeneration {
    pub value: JsonValue,
    /// Reply text before fence stripping
    pub raw: String,
    pub usage: TokenUsage,
    pub attempts: u32,
}

/// A raw backend bound to one tier's generation settings and retry policy.
pub struct ResilientProvider {
    backend: Arc<dyn LlmProvider>,
    generation: GenerationConfig,
    policy: RetryPolicy,
    tier: Tier,
    usage: Option<Arc<UsageTracker>>,
}

impl std::fmt::Debug for ResilientProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientProvider")
            .field("backend", &self.backend.name())
            .field("model", &self.generation.model)
            .field("tier", &self.tier)
            .field("policy", &self.policy)
            .finish()
    }
}

impl ResilientProvider {
    pub fn new(
        backend: Arc<dyn LlmProvider>,
        generation: GenerationConfig,
        policy: RetryPolicy,
        tier: Tier,
    ) -> Self {
        Self {
            backend,
            generation,
            policy,
            tier,
            usage: None,
        }
    }

    /// Report calls and tokens to a shared tracker.
    pub fn with_usage_tracker(mut self, tracker: Arc<UsageTracker>) -> Self {
        self.usage = Some(tracker);
        self
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn model(&self) -> &str {
        &self.generation.model
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Generate text, retrying transient failures.
    ///
    /// A retryable error that survives every attempt is returned as
    /// [`ProviderError::Exhausted`]; anything else is returned unchanged.
    pub async fn generate(&self, prompt: &str) -> Result<Generation, ProviderError> {
        let attempts = AtomicU32::new(0);
        let counter = &attempts;
        let this = self;
        let max_backoff = self.policy.max_backoff;

        let result = (move || async move { this.attempt(prompt, counter).await })
            .retry(self.policy.backoff())
            .sleep(tokio::time::sleep)
            .when(|e: &ProviderError| e.is_retryable())
            .adjust(|e: &ProviderError, scheduled: Option<Duration>| {
                let scheduled = scheduled?;
                match e {
                    // Server-requested wait, within the configured ceiling
                    ProviderError::RateLimited {
                        retry_after: Some(wait),
                    } => Some((*wait).max(scheduled).min(max_backoff)),
                    _ => Some(scheduled),
                }
            })
            .notify(|e: &ProviderError, delay: Duration| {
                tracing::warn!(
                    tier = %self.tier,
                    model = %self.generation.model,
                    attempt = counter.load(Ordering::SeqCst),
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Provider call failed, retrying"
                );
            })
            .await;

        let attempts = attempts.load(Ordering::SeqCst);

        match result {
            Ok(response) => {
                if let Some(tracker) = &self.usage {
                    tracker.record(self.tier, &response.usage);
                }
                Ok(Generation {
                    text: response.content,
                    usage: response.usage,
                    attempts,
                    model: response.model,
                })
            }
            Err(e) => {
                if let Some(tracker) = &self.usage {
                    tracker.record_failure(self.tier);
                }
                if e.is_retryable() {
                    tracing::warn!(
                        tier = %self.tier,
                        model = %self.generation.model,
                        attempts,
                        error = %e,
                        "Provider retries exhausted"
                    );
                    Err(ProviderError::Exhausted {
                        attempts,
                        last: Box::new(e),
                    })
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Generate and parse a JSON reply.
    ///
    /// Fences around the reply are stripped. A reply that is not JSON fails
    /// with [`ProviderError::MalformedResponse`] and is not retried.
    pub async fn generate_json(&self, prompt: &str) -> Result<JsonGeneration, ProviderError> {
        let generation = self.generate(prompt).await?;

        let value = parse_json_reply(&generation.text).map_err(|e| {
            tracing::warn!(
                tier = %self.tier,
                model = %self.generation.model,
                reply_len = generation.text.len(),
                error = %e,
                "Reply is not valid JSON"
            );
            ProviderError::MalformedResponse(e.to_string())
        })?;

        Ok(JsonGeneration {
            value,
            raw: generation.text,
            usage: generation.usage,
            attempts: generation.attempts,
        })
    }

    async fn attempt(
        &self,
        prompt: &str,
        attempts: &AtomicU32,
    ) -> Result<CompletionResponse, ProviderError> {
        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(
            tier = %self.tier,
            model = %self.generation.model,
            attempt,
            prompt_len = prompt.len(),
            "Calling provider"
        );

        match tokio::time::timeout(
            self.policy.timeout,
            self.backend.complete(prompt, &self.generation),
        )
        .await
        {
            Ok(Ok(response)) if response.content.trim().is_empty() => {
                Err(ProviderError::EmptyResponse {
                    reason: "reply text is empty".to_string(),
                })
            }
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.policy.timeout)),
        }
    }
}
