//! Resilience around provider calls.
//!
//! This module provides:
//! - per-attempt timeout with exponential-backoff retry ([`ResilientProvider`])
//! - per-tier usage accounting ([`UsageTracker`])

mod retry;
mod usage;

pub use retry::{Generation, JsonGeneration, ResilientProvider, RetryPolicy};
pub use usage::UsageTracker;
