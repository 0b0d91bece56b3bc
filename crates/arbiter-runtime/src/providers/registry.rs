//! Capability tiers and their provider instances.
//!
//! One backend per tier is built at construction and shared by every judge
//! assigned to that tier. The registry is read-only afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use arbiter_core::JudgeRole;

use super::{factory::ProviderFactories, GenerationConfig, ProviderError};
use crate::config::EvaluatorConfig;
use crate::resilience::{ResilientProvider, UsageTracker};

/// Capability tier of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Fast, cheap model
    Fast,
    /// Slower, stronger model
    Powerful,
}

impl Tier {
    pub const ALL: [Tier; 2] = [Tier::Fast, Tier::Powerful];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Powerful => "powerful",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tier used by each judge role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierAssignments {
    pub hallucination: Tier,
    pub document_relevance: Tier,
    pub completeness: Tier,
    pub escalation: Tier,
    pub verification: Tier,
}

impl Default for TierAssignments {
    fn default() -> Self {
        Self {
            hallucination: Tier::Powerful,
            document_relevance: Tier::Fast,
            completeness: Tier::Fast,
            escalation: Tier::Fast,
            verification: Tier::Powerful,
        }
    }
}

impl TierAssignments {
    pub fn tier_for(&self, role: JudgeRole) -> Tier {
        match role {
            JudgeRole::Hallucination => self.hallucination,
            JudgeRole::DocumentRelevance => self.document_relevance,
            JudgeRole::Completeness => self.completeness,
            JudgeRole::Escalation => self.escalation,
            JudgeRole::Verification => self.verification,
        }
    }

    /// Tiers that at least one role uses.
    pub fn used_tiers(&self) -> Vec<Tier> {
        Tier::ALL
            .into_iter()
            .filter(|tier| JudgeRole::ALL.iter().any(|role| self.tier_for(*role) == *tier))
            .collect()
    }
}

/// Tier to provider map plus the role assignments.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    tiers: BTreeMap<Tier, Arc<ResilientProvider>>,
    assignments: TierAssignments,
}

impl ProviderRegistry {
    pub fn new(assignments: TierAssignments) -> Self {
        Self {
            tiers: BTreeMap::new(),
            assignments,
        }
    }

    /// Install the provider for a tier, replacing any previous one.
    pub fn insert(&mut self, tier: Tier, provider: Arc<ResilientProvider>) {
        self.tiers.insert(tier, provider);
    }

    /// Build one backend per used tier from configuration.
    pub fn from_config(
        config: &EvaluatorConfig,
        factories: &ProviderFactories,
        usage: Arc<UsageTracker>,
    ) -> Result<Self, ProviderError> {
        let provider_config = config.provider_config();
        let factory = factories.get(&config.provider)?;
        factory.validate_config(&provider_config)?;

        let mut registry = Self::new(config.assignments.clone());

        for tier in config.assignments.used_tiers() {
            let backend = factory.create(&provider_config)?;
            let generation = GenerationConfig {
                model: config.models.model_for(tier).to_string(),
                temperature: config.generation.temperature,
                max_output_tokens: config.generation.max_output_tokens,
            };

            tracing::info!(
                tier = %tier,
                provider = %config.provider,
                model = %generation.model,
                "Registered provider tier"
            );

            let provider = ResilientProvider::new(backend, generation, config.retry.clone(), tier)
                .with_usage_tracker(usage.clone());
            registry.insert(tier, Arc::new(provider));
        }

        Ok(registry)
    }

    pub fn assignments(&self) -> &TierAssignments {
        &self.assignments
    }

    pub fn for_tier(&self, tier: Tier) -> Option<Arc<ResilientProvider>> {
        self.tiers.get(&tier).cloned()
    }

    /// Provider assigned to a judge role.
    pub fn for_role(&self, role: JudgeRole) -> Result<Arc<ResilientProvider>, ProviderError> {
        let tier = self.assignments.tier_for(role);
        self.for_tier(tier).ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no provider registered for tier '{}' (needed by {})",
                tier, role
            ))
        })
    }

    /// Distinct provider instances.
    pub fn unique_providers(&self) -> usize {
        self.tiers.len()
    }
}
