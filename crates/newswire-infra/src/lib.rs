//! Infrastructure layer for Newswire.
//!
//! Implements the ports defined in `newswire-core`: LLM backends (Anthropic
//! Messages API, OpenAI-compatible chat completions), the NewsAPI article
//! source, SQLite article storage, the file-backed response cache, SHA-256
//! content hashing, and config loading.

pub mod cache;
pub mod config;
pub mod crypto;
pub mod filesystem;
pub mod llm;
pub mod news;
pub mod sqlite;
