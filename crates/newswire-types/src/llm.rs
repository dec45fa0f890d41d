//! LLM request/response types for Newswire.
//!
//! These types model the data shapes for provider interactions: the two
//! roles a provider can serve, completion requests, usage reporting, static
//! provider profiles and the error taxonomy every backend maps into.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two LLM tasks performed per article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Summarize,
    Sentiment,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Summarize, Role::Sentiment];
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Summarize => write!(f, "summarize"),
            Role::Sentiment => write!(f, "sentiment"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summarize" => Ok(Role::Summarize),
            "sentiment" => Ok(Role::Sentiment),
            other => Err(format!("invalid role: '{other}'")),
        }
    }
}

/// Role of a message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A single message in an LLM conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Request to an LLM provider for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Response from an LLM provider.
///
/// `usage` is `None` when the backend did not report token counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub usage: Option<Usage>,
}

/// Token usage reported by a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Errors from LLM provider operations.
///
/// Every backend maps its failures into exactly one of these classes; the
/// fallback controller decides retry vs. provider substitution from the class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LlmError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("rate limited by backend (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("transient backend error: {message}")]
    Transient { message: String },

    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("authentication failed")]
    AuthenticationFailed,
}

impl LlmError {
    pub fn invalid_response(message: impl Into<String>) -> Self {
        LlmError::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        LlmError::Transient {
            message: message.into(),
        }
    }

    /// Worth another attempt on the same provider.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::Timeout { .. } | LlmError::RateLimited { .. } | LlmError::Transient { .. }
        )
    }

    /// This provider cannot serve the request; move on without retrying.
    pub fn advances_provider(&self) -> bool {
        !self.is_retryable()
    }

    /// Short machine-friendly class name, used in events and log fields.
    pub fn class(&self) -> &'static str {
        match self {
            LlmError::Timeout { .. } => "timeout",
            LlmError::RateLimited { .. } => "rate_limited",
            LlmError::Transient { .. } => "transient",
            LlmError::InvalidResponse { .. } => "invalid_response",
            LlmError::AuthenticationFailed => "auth",
        }
    }
}

/// Type of LLM provider backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    #[serde(rename = "openai")]
    OpenAi,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenAi => write!(f, "openai"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(ProviderKind::Anthropic),
            "openai" => Ok(ProviderKind::OpenAi),
            other => Err(format!("invalid provider kind: '{other}'")),
        }
    }
}

/// Static pricing and throughput ceiling for one configured provider.
///
/// Loaded once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub name: String,
    pub model: String,
    pub input_price_per_million: f64,
    pub output_price_per_million: f64,
    pub requests_per_minute: u32,
}

impl ProviderProfile {
    /// Dollar cost of a call with the given token counts.
    pub fn cost_usd(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 / 1_000_000.0) * self.input_price_per_million
            + (output_tokens as f64 / 1_000_000.0) * self.output_price_per_million
    }
}
