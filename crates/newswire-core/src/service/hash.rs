//! ContentHasher trait for cache keys.
//!
//! Defined in newswire-core so the pipeline can key the response cache
//! without coupling to a hashing algorithm. The `Sha256ContentHasher`
//! adapter lives in newswire-infra.

/// Stable hex digest of article content.
pub trait ContentHasher: Send + Sync {
    /// Compute a hex-encoded hash of the given content.
    fn compute_hash(&self, content: &str) -> String;
}
