//! Article processing: cache, rate limit, budget and fallback wired together.

pub mod summarizer;
