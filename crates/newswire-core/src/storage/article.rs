//! Processed-article repository trait.

use std::future::Future;

use newswire_types::article::ProcessedArticle;
use newswire_types::error::RepositoryError;

/// Trait for persisting pipeline output and searching it later.
///
/// Articles are unique by URL; saving an article that already exists
/// replaces the stored row. Uses RPITIT (native async fn in traits).
pub trait ArticleRepository: Send + Sync {
    fn save(
        &self,
        article: &ProcessedArticle,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Save several articles in one transaction.
    fn save_many(
        &self,
        articles: &[ProcessedArticle],
    ) -> impl Future<Output = Result<usize, RepositoryError>> + Send;

    fn get_by_url(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Option<ProcessedArticle>, RepositoryError>> + Send;

    fn get(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<ProcessedArticle>, RepositoryError>> + Send;

    /// Most recently processed first.
    fn list(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ProcessedArticle>, RepositoryError>> + Send;

    /// Case-insensitive substring match on title or summary text.
    fn search(
        &self,
        keyword: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<ProcessedArticle>, RepositoryError>> + Send;

    fn count(&self) -> impl Future<Output = Result<u64, RepositoryError>> + Send;
}
