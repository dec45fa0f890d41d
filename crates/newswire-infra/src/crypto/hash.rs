//! SHA-256 content hashing for response-cache keys.

use sha2::{Digest, Sha256};

use newswire_core::service::hash::ContentHasher;

/// SHA-256 implementation of `ContentHasher`.
///
/// Produces lowercase hex digests. The pipeline hashes the truncated content
/// an article is summarized from, so two articles with identical bodies share
/// cache entries.
#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256ContentHasher;

impl Sha256ContentHasher {
    pub fn new() -> Self {
        Self
    }
}

impl ContentHasher for Sha256ContentHasher {
    fn compute_hash(&self, content: &str) -> String {
        format!("{:x}", Sha256::digest(content.as_bytes()))
    }
}
