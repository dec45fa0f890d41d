//! LlmProvider trait definition.
//!
//! This is the core abstraction that all LLM backends implement. Uses RPITIT
//! for `complete`; `BoxLlmProvider` adds object safety on top.

use newswire_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// Trait for LLM provider backends (Anthropic, OpenAI, test fakes).
///
/// Implementations translate the abstract request into the backend's wire
/// shape and map every failure into one [`LlmError`] class. Token counts in
/// the response must come from the backend when it reports them.
///
/// Implementations live in newswire-infra (e.g., `AnthropicProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable backend name (e.g., "anthropic", "openai").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
