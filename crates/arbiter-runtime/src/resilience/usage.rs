//! Per-tier usage accounting.
//!
//! One tracker is shared by every resilient provider built from the same
//! configuration, so totals cover a whole batch run.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use arbiter_core::{LlmUsage, TokenUsage};

use crate::providers::Tier;

/// Accumulated calls and tokens, keyed by capability tier.
#[derive(Debug, Default)]
pub struct UsageTracker {
    tiers: RwLock<BTreeMap<Tier, LlmUsage>>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one completed provider call.
    pub fn record(&self, tier: Tier, usage: &TokenUsage) {
        self.tiers.write().entry(tier).or_default().add(usage);
    }

    /// Record a `generate` call that ended in an error.
    pub fn record_failure(&self, tier: Tier) {
        self.tiers.write().entry(tier).or_default().failed_calls += 1;
    }

    pub fn snapshot(&self) -> BTreeMap<Tier, LlmUsage> {
        self.tiers.read().clone()
    }

    pub fn for_tier(&self, tier: Tier) -> LlmUsage {
        self.tiers.read().get(&tier).cloned().unwrap_or_default()
    }

    /// Sum over all tiers.
    pub fn total(&self) -> LlmUsage {
        let tiers = self.tiers.read();
        tiers.values().fold(LlmUsage::default(), |mut acc, u| {
            acc.merge(u);
            acc
        })
    }

    pub fn reset(&self) {
        self.tiers.write().clear();
    }
}
