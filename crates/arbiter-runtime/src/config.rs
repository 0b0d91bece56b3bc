//! Runtime configuration.
//!
//! One [`EvaluatorConfig`] is loaded (usually from YAML), validated, and then
//! passed by reference into the provider registry and the orchestrator.
//! Every field has a default, so an empty document is a valid config.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use arbiter_core::EscalationPolicy;

use crate::providers::{Tier, TierAssignments};
use crate::resilience::RetryPolicy;

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Serde helper for humantime strings such as `"2m"` or `"1s 500ms"`.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// Model name per tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTiers {
    pub fast: String,
    pub powerful: String,
}

impl Default for ModelTiers {
    fn default() -> Self {
        Self {
            fast: "gemini-2.0-flash-exp".to_string(),
            powerful: "gemini-1.5-pro".to_string(),
        }
    }
}

impl ModelTiers {
    pub fn model_for(&self, tier: Tier) -> &str {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Powerful => &self.powerful,
        }
    }
}

/// Sampling knobs shared by every tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_output_tokens: 4096,
        }
    }
}

/// Execution settings for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationSettings {
    /// Run Stage-1 judges concurrently
    pub parallel_agents: bool,

    /// Concurrent judge calls across all conversations
    pub worker_pool_size: usize,

    /// Deadline for one judge; must cover `RetryPolicy::budget`
    #[serde(with = "duration_str")]
    pub judge_timeout: Duration,

    /// Conversations evaluated concurrently in a batch
    pub batch_concurrency: usize,

    /// Allow Stage-2 verification at all
    pub run_verification: bool,
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            parallel_agents: true,
            worker_pool_size: 4,
            judge_timeout: Duration::from_secs(480),
            batch_concurrency: 3,
            run_verification: true,
        }
    }
}

/// Where backends find their credentials.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    /// Inline API key; prefer `api_key_env`
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub base_url: Option<String>,
    pub vertex_project_id: Option<String>,
    pub vertex_location: String,
    pub vertex_access_token_env: String,
}

impl Default for CredentialSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: "GEMINI_API_KEY".to_string(),
            base_url: None,
            vertex_project_id: None,
            vertex_location: "us-central1".to_string(),
            vertex_access_token_env: "VERTEX_ACCESS_TOKEN".to_string(),
        }
    }
}

impl fmt::Debug for CredentialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_env", &self.api_key_env)
            .field("base_url", &self.base_url)
            .field("vertex_project_id", &self.vertex_project_id)
            .field("vertex_location", &self.vertex_location)
            .field("vertex_access_token_env", &self.vertex_access_token_env)
            .finish()
    }
}

/// Complete evaluator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Backend type registered in the provider factories
    pub provider: String,
    pub models: ModelTiers,
    pub assignments: TierAssignments,
    pub generation: GenerationSettings,
    pub retry: RetryPolicy,
    pub orchestration: OrchestrationSettings,
    pub escalation: EscalationPolicy,
    pub credentials: CredentialSettings,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            models: ModelTiers::default(),
            assignments: TierAssignments::default(),
            generation: GenerationSettings::default(),
            retry: RetryPolicy::default(),
            orchestration: OrchestrationSettings::default(),
            escalation: EscalationPolicy::default(),
            credentials: CredentialSettings::default(),
        }
    }
}

impl EvaluatorConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.trim().is_empty() {
            return Err(ConfigError::Invalid("provider must not be empty".into()));
        }
        for tier in Tier::ALL {
            if self.models.model_for(tier).trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "models.{} must not be empty",
                    tier
                )));
            }
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ConfigError::Invalid(format!(
                "generation.temperature must be in [0, 2], got {}",
                self.generation.temperature
            )));
        }
        if self.generation.max_output_tokens == 0 {
            return Err(ConfigError::Invalid(
                "generation.max_output_tokens must be > 0".into(),
            ));
        }
        if self.retry.max_retries == 0 {
            return Err(ConfigError::Invalid("retry.max_retries must be >= 1".into()));
        }
        if self.retry.timeout.is_zero() {
            return Err(ConfigError::Invalid("retry.timeout must be > 0".into()));
        }
        if self.retry.max_backoff < self.retry.backoff_base {
            return Err(ConfigError::Invalid(
                "retry.max_backoff must be >= retry.backoff_base".into(),
            ));
        }
        if self.orchestration.worker_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "orchestration.worker_pool_size must be >= 1".into(),
            ));
        }
        if self.orchestration.batch_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "orchestration.batch_concurrency must be >= 1".into(),
            ));
        }
        if self.orchestration.judge_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "orchestration.judge_timeout must be > 0".into(),
            ));
        }
        let budget = self.retry.budget();
        if self.orchestration.judge_timeout < budget {
            return Err(ConfigError::Invalid(format!(
                "orchestration.judge_timeout ({}) must cover the retry budget of {}",
                humantime::format_duration(self.orchestration.judge_timeout),
                humantime::format_duration(budget)
            )));
        }
        if let Some(threshold) = self.escalation.quality_threshold {
            if !(1..=5).contains(&threshold) {
                return Err(ConfigError::Invalid(format!(
                    "escalation.quality_threshold must be in 1..=5, got {}",
                    threshold
                )));
            }
        }
        Ok(())
    }

    /// JSON handed to the provider factory.
    ///
    /// Holds the keys of every built-in backend; each reads its own.
    pub fn provider_config(&self) -> JsonValue {
        let creds = &self.credentials;
        let mut config = serde_json::json!({
            "api_key_env": creds.api_key_env,
            "location": creds.vertex_location,
            "access_token_env": creds.vertex_access_token_env,
        });
        if let Some(key) = &creds.api_key {
            config["api_key"] = JsonValue::String(key.clone());
        }
        if let Some(url) = &creds.base_url {
            config["base_url"] = JsonValue::String(url.clone());
        }
        if let Some(project) = &creds.vertex_project_id {
            config["project_id"] = JsonValue::String(project.clone());
        }
        config
    }
}
