//! Anthropic Claude backend.

pub mod client;
pub mod types;

pub use client::AnthropicProvider;
