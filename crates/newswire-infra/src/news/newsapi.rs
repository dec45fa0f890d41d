//! NewsAPI article source.
//!
//! Fetches `GET {base_url}/top-headlines?category=&pageSize=` and maps the
//! results to [`Article`]s. Items NewsAPI has withdrawn (title or URL of
//! `[Removed]`) are skipped. Requests go through this source's own
//! [`RateLimiter`] window.

use chrono::{DateTime, NaiveDate, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use newswire_core::llm::rate_limiter::RateLimiter;
use newswire_core::news::NewsSource;
use newswire_types::article::Article;
use newswire_types::config::NewsConfig;
use newswire_types::error::NewsSourceError;

/// Rate-limit key for the news API.
pub const NEWSAPI_LIMIT_KEY: &str = "newsapi";

const REMOVED_MARKER: &str = "[Removed]";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeadlinesResponse {
    status: String,
    #[serde(default)]
    articles: Vec<RawArticle>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArticle {
    title: Option<String>,
    description: Option<String>,
    content: Option<String>,
    url: Option<String>,
    source: Option<RawSource>,
    published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    name: Option<String>,
}

pub struct NewsApiSource {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    limiter: RateLimiter,
}

impl NewsApiSource {
    pub fn new(api_key: SecretString, config: &NewsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new([(
                NEWSAPI_LIMIT_KEY.to_string(),
                config.requests_per_minute,
            )]),
        }
    }
}

/// Stable article id derived from its URL.
fn article_id(url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    digest[..16].to_string()
}

/// RFC 3339 timestamps, or a bare date at midnight UTC.
fn parse_published_at(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        return Utc::now();
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or_else(Utc::now)
}

fn is_removed(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim() == REMOVED_MARKER)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Map raw results to articles, skipping withdrawn or URL-less items.
fn map_articles(raw: Vec<RawArticle>, count: usize) -> Vec<Article> {
    raw.into_iter()
        .filter(|a| !is_removed(a.title.as_deref()) && !is_removed(a.url.as_deref()))
        .filter_map(|a| {
            let url = non_empty(a.url)?;
            let title = non_empty(a.title).unwrap_or_else(|| url.clone());
            let content = non_empty(a.content)
                .or_else(|| non_empty(a.description))
                .unwrap_or_else(|| title.clone());
            Some(Article {
                id: article_id(&url),
                source: a
                    .source
                    .and_then(|s| non_empty(s.name))
                    .unwrap_or_else(|| "Unknown".to_string()),
                published_at: parse_published_at(a.published_at.as_deref()),
                title,
                url,
                content,
            })
        })
        .take(count)
        .collect()
}

impl NewsSource for NewsApiSource {
    async fn fetch_articles(
        &self,
        category: &str,
        count: u32,
    ) -> Result<Vec<Article>, NewsSourceError> {
        let permit = self.limiter.acquire(NEWSAPI_LIMIT_KEY).await;
        tracing::debug!(category, count, waited_ms = permit.waited.as_millis() as u64, "Fetching headlines");

        let response = self
            .client
            .get(format!("{}/top-headlines", self.base_url))
            .header("X-Api-Key", self.api_key.expose_secret())
            .query(&[
                ("category", category.to_string()),
                ("pageSize", count.to_string()),
                ("language", "en".to_string()),
            ])
            .send()
            .await
            .map_err(|e| NewsSourceError::Request(e.to_string()))?;

        let status = response.status();
        let body: HeadlinesResponse = response
            .json()
            .await
            .map_err(|e| NewsSourceError::Malformed(e.to_string()))?;

        if !status.is_success() || body.status != "ok" {
            return Err(NewsSourceError::Rejected {
                status: status.as_u16(),
                message: body
                    .message
                    .or(body.code)
                    .unwrap_or_else(|| "unknown error".to_string()),
            });
        }

        let articles = map_articles(body.articles, count as usize);
        tracing::info!(category, fetched = articles.len(), "Fetched headlines");
        Ok(articles)
    }
}
