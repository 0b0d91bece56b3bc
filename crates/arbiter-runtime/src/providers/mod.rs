//! Model inference providers.
//!
//! [`LlmProvider`] is the raw backend: one HTTP call, no retries. The
//! resilient wrapper in [`crate::resilience`] adds the per-attempt timeout,
//! retry and backoff on top of it.
//!
//! ## Security
//!
//! All providers use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the patterns.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use arbiter_core::TokenUsage;

mod factory;
mod registry;
pub mod secrets;

#[cfg(any(feature = "gemini", feature = "vertex"))]
mod wire;

#[cfg(feature = "gemini")]
mod gemini;

#[cfg(feature = "vertex")]
mod vertex;

pub use factory::{ProviderFactories, ProviderFactory};
pub use registry::{ProviderRegistry, Tier, TierAssignments};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "gemini")]
pub use gemini::{GeminiProvider, GeminiProviderFactory, GEMINI_API_KEY_ENV};

#[cfg(feature = "vertex")]
pub use vertex::{VertexProvider, VertexProviderFactory, VERTEX_ACCESS_TOKEN_ENV};

/// Errors from LLM providers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("empty response: {reason}")]
    EmptyResponse { reason: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("exhausted after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<ProviderError>,
    },

    #[error("authentication failed")]
    AuthError,

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// Coarse error classes at the provider boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Timeout,
    Transient,
    Exhausted,
    EmptyResponse,
    MalformedResponse,
    /// Credentials, configuration or a rejected request; retrying cannot help
    Rejected,
}

impl ProviderError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Timeout(_)
            | ProviderError::Transient(_)
            | ProviderError::RateLimited { .. }
            | ProviderError::EmptyResponse { .. } => true,
            ProviderError::Api { status, .. } => *status >= 500,
            ProviderError::MalformedResponse(_)
            | ProviderError::Exhausted { .. }
            | ProviderError::AuthError
            | ProviderError::NotConfigured(_) => false,
        }
    }

    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Timeout(_) => ProviderErrorKind::Timeout,
            ProviderError::Transient(_) | ProviderError::RateLimited { .. } => {
                ProviderErrorKind::Transient
            }
            ProviderError::Api { status, .. } if *status >= 500 => ProviderErrorKind::Transient,
            ProviderError::EmptyResponse { .. } => ProviderErrorKind::EmptyResponse,
            ProviderError::MalformedResponse(_) => ProviderErrorKind::MalformedResponse,
            ProviderError::Exhausted { .. } => ProviderErrorKind::Exhausted,
            ProviderError::Api { .. } | ProviderError::AuthError | ProviderError::NotConfigured(_) => {
                ProviderErrorKind::Rejected
            }
        }
    }
}

/// Generation settings for one tier.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    /// Model name, e.g. "gemini-1.5-pro"
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_output_tokens: u32,
}

impl GenerationConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash-exp".to_string(),
            temperature: 0.1,
            max_output_tokens: 4096,
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,
}

/// Provider abstraction over inference backends.
///
/// Implementations make exactly one request per call. They hold no
/// conversation state and are shared across judges of the same tier.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a single completion.
    async fn complete(
        &self,
        prompt: &str,
        config: &GenerationConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Get provider name for logs.
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(ProviderError::EmptyResponse {
            reason: "blocked".into()
        }
        .is_retryable());
        assert!(ProviderError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!ProviderError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
        assert!(!ProviderError::MalformedResponse("x".into()).is_retryable());
        assert!(!ProviderError::AuthError.is_retryable());
    }

    #[test]
    fn test_kind_mapping() {
        let exhausted = ProviderError::Exhausted {
            attempts: 3,
            last: Box::new(ProviderError::Timeout(Duration::from_secs(120))),
        };
        assert_eq!(exhausted.kind(), ProviderErrorKind::Exhausted);
        assert!(exhausted.to_string().contains("3 attempts"));
        assert_eq!(
            ProviderError::RateLimited { retry_after: None }.kind(),
            ProviderErrorKind::Transient
        );
        assert_eq!(ProviderError::AuthError.kind(), ProviderErrorKind::Rejected);
    }

    #[test]
    fn test_generation_defaults() {
        let config = GenerationConfig::new("gemini-1.5-pro");
        assert_eq!(config.model, "gemini-1.5-pro");
        assert_eq!(config.temperature, 0.1);
        assert_eq!(config.max_output_tokens, 4096);
    }
}
