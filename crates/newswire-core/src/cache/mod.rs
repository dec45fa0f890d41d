//! Response cache port.
//!
//! The pipeline consults the cache before any billed call and fills it after
//! a success. Entries are keyed by content hash plus role; concurrent writers
//! race with last-writer-wins, which is fine for derived data.

pub mod memory;

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use newswire_types::article::CachedResult;
use newswire_types::error::RepositoryError;
use newswire_types::llm::Role;

/// Hit/miss counters for one cache instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: u64,
}

impl CacheStats {
    /// Hit rate as a percentage; zero before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64 * 100.0
    }
}

/// Trait for content-addressed response caches.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
/// Implementations: [`memory::MemoryResponseCache`] here, a JSON-file cache
/// in newswire-infra.
pub trait ResponseCache: Send + Sync {
    fn get(
        &self,
        content_hash: &str,
        role: Role,
    ) -> impl Future<Output = Result<Option<CachedResult>, RepositoryError>> + Send;

    fn put(
        &self,
        content_hash: &str,
        role: Role,
        result: &CachedResult,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn clear(&self) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    fn stats(&self) -> CacheStats;
}

/// Object-safe mirror of [`ResponseCache`].
pub trait ResponseCacheDyn: Send + Sync {
    fn get_boxed<'a>(
        &'a self,
        content_hash: &'a str,
        role: Role,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CachedResult>, RepositoryError>> + Send + 'a>>;

    fn put_boxed<'a>(
        &'a self,
        content_hash: &'a str,
        role: Role,
        result: &'a CachedResult,
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>>;

    fn clear_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + '_>>;

    fn stats(&self) -> CacheStats;
}

impl<T: ResponseCache> ResponseCacheDyn for T {
    fn get_boxed<'a>(
        &'a self,
        content_hash: &'a str,
        role: Role,
    ) -> Pin<Box<dyn Future<Output = Result<Option<CachedResult>, RepositoryError>> + Send + 'a>>
    {
        Box::pin(self.get(content_hash, role))
    }

    fn put_boxed<'a>(
        &'a self,
        content_hash: &'a str,
        role: Role,
        result: &'a CachedResult,
    ) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + 'a>> {
        Box::pin(self.put(content_hash, role, result))
    }

    fn clear_boxed(&self) -> Pin<Box<dyn Future<Output = Result<(), RepositoryError>> + Send + '_>> {
        Box::pin(self.clear())
    }

    fn stats(&self) -> CacheStats {
        ResponseCache::stats(self)
    }
}

/// Type-erased response cache.
pub struct BoxResponseCache {
    inner: Box<dyn ResponseCacheDyn + Send + Sync>,
}

impl BoxResponseCache {
    pub fn new<T: ResponseCache + 'static>(cache: T) -> Self {
        Self {
            inner: Box::new(cache),
        }
    }

    pub async fn get(
        &self,
        content_hash: &str,
        role: Role,
    ) -> Result<Option<CachedResult>, RepositoryError> {
        self.inner.get_boxed(content_hash, role).await
    }

    pub async fn put(
        &self,
        content_hash: &str,
        role: Role,
        result: &CachedResult,
    ) -> Result<(), RepositoryError> {
        self.inner.put_boxed(content_hash, role, result).await
    }

    pub async fn clear(&self) -> Result<(), RepositoryError> {
        self.inner.clear_boxed().await
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

impl std::fmt::Debug for BoxResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxResponseCache")
            .field("stats", &self.stats())
            .finish()
    }
}
