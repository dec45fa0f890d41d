//! Operational events emitted by the orchestration core.
//!
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};

use crate::llm::Role;

/// Events for logging/telemetry subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A caller was held by the local rate limiter before admission.
    RateLimitWait { provider: String, waited_ms: u64 },

    /// A role moved from one provider to the next in its route.
    ProviderFallback {
        role: Role,
        from_provider: String,
        to_provider: String,
        /// Error class that ended the previous provider's attempts.
        reason: String,
    },

    /// A transient failure will be retried on the same provider.
    RetryScheduled {
        role: Role,
        provider: String,
        /// The attempt number about to run.
        attempt: u32,
        delay_ms: u64,
        reason: String,
    },

    /// Daily spend crossed 90% of the limit. Advisory only.
    BudgetWarning { spent_usd: f64, limit_usd: f64 },

    /// A call was refused by the budget ledger.
    BudgetExceeded {
        role: Role,
        provider: String,
        requested_usd: f64,
        remaining_usd: f64,
    },
}
