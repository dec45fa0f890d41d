//! JSON-file response cache.
//!
//! The whole cache lives in `{cache_dir}/response_cache.json` as one JSON
//! object keyed by `"{content_hash}:{role}"`. It is loaded once at open and
//! rewritten after every `put` and `clear`. A missing or corrupt file opens
//! as an empty cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

use newswire_core::cache::{CacheStats, ResponseCache};
use newswire_types::article::CachedResult;
use newswire_types::error::RepositoryError;
use newswire_types::llm::Role;

pub const CACHE_FILE_NAME: &str = "response_cache.json";

pub struct FileResponseCache {
    dir: PathBuf,
    path: PathBuf,
    entries: Mutex<HashMap<String, CachedResult>>,
    /// Mirrors `entries.len()` so `stats` never waits on a write.
    entry_count: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn cache_key(content_hash: &str, role: Role) -> String {
    format!("{content_hash}:{role}")
}

impl FileResponseCache {
    /// Open the cache stored under `dir`. Nothing is created until the first write.
    pub async fn open(dir: &Path) -> Self {
        let path = dir.join(CACHE_FILE_NAME);
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<HashMap<String, CachedResult>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Corrupt response cache, starting empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable response cache, starting empty");
                HashMap::new()
            }
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "Response cache opened");

        Self {
            dir: dir.to_path_buf(),
            path,
            entry_count: AtomicU64::new(entries.len() as u64),
            entries: Mutex::new(entries),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the full map to disk via a temp file and rename.
    async fn persist(&self, entries: &HashMap<String, CachedResult>) -> Result<(), RepositoryError> {
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize cache: {e}")))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| RepositoryError::Query(format!("failed to create cache dir: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| RepositoryError::Query(format!("failed to write cache: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| RepositoryError::Query(format!("failed to replace cache file: {e}")))?;
        Ok(())
    }
}

impl ResponseCache for FileResponseCache {
    async fn get(
        &self,
        content_hash: &str,
        role: Role,
    ) -> Result<Option<CachedResult>, RepositoryError> {
        let found = self
            .entries
            .lock()
            .await
            .get(&cache_key(content_hash, role))
            .cloned();
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
        let mut entries = self.entries.lock().await;
        entries.insert(cache_key(content_hash, role), result.clone());
        self.entry_count.store(entries.len() as u64, Ordering::Relaxed);
        self.persist(&entries).await
    }

    async fn clear(&self) -> Result<(), RepositoryError> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.entry_count.store(0, Ordering::Relaxed);
        self.persist(&entries).await
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entry_count.load(Ordering::Relaxed),
        }
    }
}
