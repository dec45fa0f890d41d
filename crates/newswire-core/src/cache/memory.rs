//! In-process response cache backed by a `DashMap`.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use newswire_types::article::CachedResult;
use newswire_types::error::RepositoryError;
use newswire_types::llm::Role;

use super::{CacheStats, ResponseCache};

#[derive(Debug, Default)]
pub struct MemoryResponseCache {
    entries: DashMap<(String, Role), CachedResult>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryResponseCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResponseCache for MemoryResponseCache {
    async fn get(
        &self,
        content_hash: &str,
        role: Role,
    ) -> Result<Option<CachedResult>, RepositoryError> {
        let found = self
            .entries
            .get(&(content_hash.to_string(), role))
            .map(|entry| entry.value().clone());
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        Ok(found)
    }

    async fn put(
        &self,
        content_hash: &str,
        role: Role,
        result: &CachedResult,
    ) -> Result<(), RepositoryError> {
        self.entries
            .insert((content_hash.to_string(), role), result.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), RepositoryError> {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len() as u64,
        }
    }
}
