//! Backend factories, keyed by the `provider` name in the configuration.
//!
//! The registry resolves one factory, validates the credential section once
//! and asks it for a backend per tier.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use super::{LlmProvider, ProviderError};

/// Builds one kind of backend from the `credentials` JSON view.
pub trait ProviderFactory: Send + Sync {
    /// Name matched against `EvaluatorConfig::provider`.
    fn provider_type(&self) -> &'static str;

    /// Check that the backend could be built, without building it.
    fn validate_config(&self, config: &JsonValue) -> Result<(), ProviderError>;

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LlmProvider>, ProviderError>;
}

/// The set of backends an orchestrator can be built with.
#[derive(Default, Clone)]
pub struct ProviderFactories {
    by_type: BTreeMap<&'static str, Arc<dyn ProviderFactory>>,
}

impl ProviderFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every backend compiled in.
    pub fn with_defaults() -> Self {
        let factories = Self::new();
        #[cfg(feature = "gemini")]
        let factories = factories.with(Arc::new(super::GeminiProviderFactory));
        #[cfg(feature = "vertex")]
        let factories = factories.with(Arc::new(super::VertexProviderFactory));
        factories
    }

    pub fn with(mut self, factory: Arc<dyn ProviderFactory>) -> Self {
        self.register(factory);
        self
    }

    /// Add a factory; a later one with the same type wins.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.by_type.insert(factory.provider_type(), factory);
    }

    pub fn types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.by_type.keys().copied()
    }

    pub fn get(&self, provider_type: &str) -> Result<&dyn ProviderFactory, ProviderError> {
        self.by_type
            .get(provider_type)
            .map(|factory| factory.as_ref())
            .ok_or_else(|| {
                ProviderError::NotConfigured(format!(
                    "unknown provider '{}' (known: {})",
                    provider_type,
                    self.types().collect::<Vec<_>>().join(", ")
                ))
            })
    }

    /// Resolve a factory and check its configuration.
    pub fn validate(&self, provider_type: &str, config: &JsonValue) -> Result<(), ProviderError> {
        self.get(provider_type)?.validate_config(config)
    }
}

impl fmt::Debug for ProviderFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.types()).finish()
    }
}
