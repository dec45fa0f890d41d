//! Upstream news source port.

use std::future::Future;

use newswire_types::article::Article;
use newswire_types::error::NewsSourceError;

/// Supplies articles for a category. Implementations apply their own rate
/// limit; the NewsAPI adapter lives in newswire-infra.
pub trait NewsSource: Send + Sync {
    fn fetch_articles(
        &self,
        category: &str,
        count: u32,
    ) -> impl Future<Output = Result<Vec<Article>, NewsSourceError>> + Send;
}
