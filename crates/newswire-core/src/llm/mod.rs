//! LLM provider orchestration.
//!
//! - `LlmProvider` / `BoxLlmProvider`: backend abstraction and its object-safe wrapper
//! - `ProviderClient`: summarize / analyze-sentiment over one backend
//! - `RateLimiter`: per-provider sliding-window throttle
//! - `FallbackController`: per-role retry and provider substitution

pub mod backoff;
pub mod box_provider;
pub mod client;
pub mod fallback;
pub mod prompt;
pub mod provider;
pub mod rate_limiter;

#[cfg(test)]
pub(crate) mod testing;
