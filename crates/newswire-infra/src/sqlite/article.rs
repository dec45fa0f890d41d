//! SQLite article repository implementation.
//!
//! Implements `ArticleRepository` from `newswire-core`. Articles are unique by
//! URL and upserted. The full `ProcessedArticle` is stored as JSON in
//! `payload`; the other columns exist for ordering and search.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;
use sqlx::Sqlite;
use sqlx::sqlite::SqliteArguments;

use newswire_core::storage::article::ArticleRepository;
use newswire_types::article::ProcessedArticle;
use newswire_types::error::RepositoryError;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ArticleRepository`.
pub struct SqliteArticleRepository {
    pool: DatabasePool,
}

impl SqliteArticleRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Column values for one article, ready to bind.
struct ArticleRow {
    url: String,
    id: String,
    title: String,
    source: String,
    published_at: String,
    summary: Option<String>,
    sentiment: Option<String>,
    status: String,
    total_cost_usd: f64,
    processed_at: String,
    payload: String,
}

impl ArticleRow {
    fn from_article(article: &ProcessedArticle) -> Result<Self, RepositoryError> {
        let payload = serde_json::to_string(article)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize article: {e}")))?;
        Ok(Self {
            url: article.article.url.clone(),
            id: article.article.id.clone(),
            title: article.article.title.clone(),
            source: article.article.source.clone(),
            published_at: format_datetime(&article.article.published_at),
            summary: article.summary.as_ref().map(|s| s.text.clone()),
            sentiment: article.sentiment.as_ref().map(|s| s.label.to_string()),
            status: article.status().to_string(),
            total_cost_usd: article.total_cost_usd,
            processed_at: format_datetime(&article.processed_at),
            payload,
        })
    }

    fn upsert(&self) -> sqlx::query::Query<'_, Sqlite, SqliteArguments<'_>> {
        sqlx::query(
            r#"INSERT INTO articles
                   (url, id, title, source, published_at, summary, sentiment, status,
                    total_cost_usd, processed_at, payload)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (url) DO UPDATE SET
                   id = excluded.id,
                   title = excluded.title,
                   source = excluded.source,
                   published_at = excluded.published_at,
                   summary = excluded.summary,
                   sentiment = excluded.sentiment,
                   status = excluded.status,
                   total_cost_usd = excluded.total_cost_usd,
                   processed_at = excluded.processed_at,
                   payload = excluded.payload"#,
        )
        .bind(&self.url)
        .bind(&self.id)
        .bind(&self.title)
        .bind(&self.source)
        .bind(&self.published_at)
        .bind(&self.summary)
        .bind(&self.sentiment)
        .bind(&self.status)
        .bind(self.total_cost_usd)
        .bind(&self.processed_at)
        .bind(&self.payload)
    }
}

fn parse_payload(row: &sqlx::sqlite::SqliteRow) -> Result<ProcessedArticle, RepositoryError> {
    let payload: String = row
        .try_get("payload")
        .map_err(|e| RepositoryError::Query(e.to_string()))?;
    serde_json::from_str(&payload)
        .map_err(|e| RepositoryError::Query(format!("invalid article payload: {e}")))
}

fn parse_rows(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<ProcessedArticle>, RepositoryError> {
    rows.iter().map(parse_payload).collect()
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ---------------------------------------------------------------------------
// ArticleRepository implementation
// ---------------------------------------------------------------------------

impl ArticleRepository for SqliteArticleRepository {
    async fn save(&self, article: &ProcessedArticle) -> Result<(), RepositoryError> {
        let row = ArticleRow::from_article(article)?;
        row.upsert()
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(())
    }

    async fn save_many(&self, articles: &[ProcessedArticle]) -> Result<usize, RepositoryError> {
        let rows = articles
            .iter()
            .map(ArticleRow::from_article)
            .collect::<Result<Vec<_>, _>>()?;

        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        for row in &rows {
            row.upsert()
                .execute(&mut *tx)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
        }
        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(rows.len())
    }

    async fn get_by_url(&self, url: &str) -> Result<Option<ProcessedArticle>, RepositoryError> {
        let row = sqlx::query("SELECT payload FROM articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(parse_payload).transpose()
    }

    async fn get(&self, id: &str) -> Result<Option<ProcessedArticle>, RepositoryError> {
        let row = sqlx::query(
            "SELECT payload FROM articles WHERE id = ? ORDER BY processed_at DESC LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.as_ref().map(parse_payload).transpose()
    }

    async fn list(&self, limit: u32) -> Result<Vec<ProcessedArticle>, RepositoryError> {
        let rows = sqlx::query("SELECT payload FROM articles ORDER BY processed_at DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        parse_rows(&rows)
    }

    async fn search(
        &self,
        keyword: &str,
        limit: u32,
    ) -> Result<Vec<ProcessedArticle>, RepositoryError> {
        let pattern = format!("%{keyword}%");
        let rows = sqlx::query(
            r#"SELECT payload FROM articles
               WHERE title LIKE ?1 OR summary LIKE ?1
               ORDER BY processed_at DESC
               LIMIT ?2"#,
        )
        .bind(&pattern)
        .bind(limit as i64)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        parse_rows(&rows)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        Ok(count as u64)
    }
}
