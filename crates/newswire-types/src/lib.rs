//! Shared domain types for Newswire.
//!
//! Articles, usage records, per-role results, provider profiles, config,
//! pipeline events and the error taxonomy shared by every other crate.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod article;
pub mod budget;
pub mod config;
pub mod error;
pub mod event;
pub mod llm;
