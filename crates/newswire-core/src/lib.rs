//! Orchestration core and port definitions for Newswire.
//!
//! This crate owns rate limiting, cost tracking, provider fallback and the
//! summarization pipeline, and defines the ports (cache, repository, news
//! source, hashing) that the infrastructure layer implements. It depends only
//! on `newswire-types` -- never on `newswire-infra` or any network/IO crate.

pub mod cache;
pub mod cost;
pub mod event;
pub mod llm;
pub mod news;
pub mod pipeline;
pub mod service;
pub mod storage;
