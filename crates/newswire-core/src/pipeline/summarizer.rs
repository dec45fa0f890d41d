//! Summarization pipeline.
//!
//! `SummarizationPipeline` turns an `Article` into a `ProcessedArticle`.
//! For each role it:
//! 1. looks up the response cache by content hash + role (hits skip everything below)
//! 2. runs the role's fallback sequence, where every attempt
//!    acquires a rate-limit permit, reserves the estimated cost against the
//!    daily budget, calls the provider and settles the actual usage
//! 3. fills the cache on success
//!
//! Articles can be processed one at a time (roles in sequence) or as a
//! bounded-concurrency batch (roles in parallel), with results in input order.

use std::borrow::Cow;
use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use futures_util::stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use newswire_types::article::{
    Article, CachedResult, ProcessedArticle, RoleFailure, SentimentResult, Summary,
};
use newswire_types::config::{GlobalConfig, PartialResultPolicy};
use newswire_types::error::{PipelineError, RoleError};
use newswire_types::llm::Role;

use crate::cache::BoxResponseCache;
use crate::cost::tracker::CostTracker;
use crate::llm::client::{ProviderClient, RoleValue};
use crate::llm::fallback::{AttemptError, FallbackController};
use crate::llm::rate_limiter::RateLimiter;
use crate::service::hash::ContentHasher;

/// Pipeline knobs taken from the global config.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Maximum characters of article content sent to a provider.
    pub truncation_limit: usize,
    pub partial_results: PartialResultPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&GlobalConfig::default())
    }
}

impl From<&GlobalConfig> for PipelineSettings {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            truncation_limit: config.truncation_limit,
            partial_results: config.partial_results,
        }
    }
}

/// First `limit` characters of `content`, cut on a char boundary.
pub fn truncate_content(content: &str, limit: usize) -> Cow<'_, str> {
    match content.char_indices().nth(limit) {
        Some((byte_index, _)) => Cow::Borrowed(&content[..byte_index]),
        None => Cow::Borrowed(content),
    }
}

/// How one role ended for one article.
struct RoleRun {
    result: CachedResult,
    from_cache: bool,
}

pub struct SummarizationPipeline {
    controller: FallbackController,
    limiter: RateLimiter,
    tracker: Arc<CostTracker>,
    hasher: Arc<dyn ContentHasher>,
    cache: Option<BoxResponseCache>,
    settings: PipelineSettings,
}

impl SummarizationPipeline {
    pub fn new(
        controller: FallbackController,
        limiter: RateLimiter,
        tracker: Arc<CostTracker>,
        hasher: Arc<dyn ContentHasher>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            controller,
            limiter,
            tracker,
            hasher,
            cache: None,
            settings,
        }
    }

    pub fn with_cache(mut self, cache: BoxResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn tracker(&self) -> &Arc<CostTracker> {
        &self.tracker
    }

    pub fn cache(&self) -> Option<&BoxResponseCache> {
        self.cache.as_ref()
    }

    /// Process one article, running its roles one after the other.
    pub async fn process(&self, article: Article) -> Result<ProcessedArticle, PipelineError> {
        self.process_with_cancel(article, &CancellationToken::new())
            .await
    }

    pub async fn process_with_cancel(
        &self,
        article: Article,
        cancel: &CancellationToken,
    ) -> Result<ProcessedArticle, PipelineError> {
        self.process_article(article, cancel, false).await
    }

    /// Process articles strictly one at a time.
    pub async fn process_sequential(
        &self,
        articles: Vec<Article>,
        cancel: &CancellationToken,
    ) -> Vec<Result<ProcessedArticle, PipelineError>> {
        let mut results = Vec::with_capacity(articles.len());
        for article in articles {
            results.push(self.process_article(article, cancel, false).await);
        }
        results
    }

    /// Process up to `max_concurrency` articles at once, each with its two
    /// roles in parallel. One outcome per input, in input order.
    pub async fn process_batch(
        &self,
        articles: Vec<Article>,
        max_concurrency: usize,
        cancel: &CancellationToken,
    ) -> Vec<Result<ProcessedArticle, PipelineError>> {
        let total = articles.len();
        info!(total, max_concurrency, "Processing article batch");

        stream::iter(
            articles
                .into_iter()
                .map(|article| self.process_article(article, cancel, true)),
        )
        .buffered(max_concurrency.max(1))
        .collect()
        .await
    }

    async fn process_article(
        &self,
        article: Article,
        cancel: &CancellationToken,
        parallel_roles: bool,
    ) -> Result<ProcessedArticle, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let content = truncate_content(&article.content, self.settings.truncation_limit);
        let content_hash = self.hasher.compute_hash(&content);

        let (summary, sentiment) = if parallel_roles {
            tokio::join!(
                self.run_role(Role::Summarize, &content, &content_hash, cancel),
                self.run_role(Role::Sentiment, &content, &content_hash, cancel),
            )
        } else {
            let summary = self
                .run_role(Role::Summarize, &content, &content_hash, cancel)
                .await;
            let sentiment = self
                .run_role(Role::Sentiment, &content, &content_hash, cancel)
                .await;
            (summary, sentiment)
        };

        self.assemble(article, summary, sentiment)
    }

    async fn run_role(
        &self,
        role: Role,
        content: &str,
        content_hash: &str,
        cancel: &CancellationToken,
    ) -> Result<RoleRun, RoleError> {
        if let Some(result) = self.cache_lookup(content_hash, role).await {
            return Ok(RoleRun {
                result,
                from_cache: true,
            });
        }

        let success = self
            .controller
            .execute(role, cancel, |client, _attempt| {
                self.attempt(role, client, content, cancel)
            })
            .await?;

        self.cache_store(content_hash, role, &success.value).await;
        Ok(RoleRun {
            result: success.value,
            from_cache: false,
        })
    }

    /// One billed attempt: rate permit, budget hold, call, settle.
    ///
    /// Cancellation is honoured while waiting for a permit. Once the request
    /// is issued it runs to completion so its usage is always recorded. A
    /// reply with reported usage is settled even when it fails to parse.
    async fn attempt(
        &self,
        role: Role,
        client: Arc<ProviderClient>,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<CachedResult, AttemptError> {
        tokio::select! {
            _ = cancel.cancelled() => return Err(AttemptError::Cancelled),
            _permit = self.limiter.acquire(client.name()) => {}
        }

        let estimate = client.estimate_usage(role, content);
        let reservation = self.tracker.reserve(
            client.name(),
            role,
            estimate.input_tokens,
            estimate.output_tokens,
        )?;

        let reply = match client.send(role, content).await {
            Ok(reply) => reply,
            Err(err) => {
                self.tracker.release(reservation);
                return Err(err.into());
            }
        };

        let value = match reply.parse() {
            Ok(value) => value,
            Err(err) if reply.usage_estimated => {
                self.tracker.release(reservation);
                return Err(err.into());
            }
            Err(err) => {
                let record = self.tracker.settle(
                    reservation,
                    reply.usage.input_tokens,
                    reply.usage.output_tokens,
                );
                warn!(
                    provider = %client.name(),
                    role = %role,
                    cost_usd = record.cost_usd,
                    error = %err,
                    "Billed reply was unusable"
                );
                return Err(err.into());
            }
        };

        let usage = self.tracker.settle(
            reservation,
            reply.usage.input_tokens,
            reply.usage.output_tokens,
        );
        let provider = client.name().to_string();
        Ok(match value {
            RoleValue::Summary(text) => CachedResult::Summarize(Summary {
                text,
                provider,
                usage,
            }),
            RoleValue::Sentiment(parsed) => CachedResult::Sentiment(SentimentResult {
                label: parsed.label,
                confidence: parsed.confidence,
                explanation: parsed.explanation,
                provider,
                usage,
            }),
        })
    }

    async fn cache_lookup(&self, content_hash: &str, role: Role) -> Option<CachedResult> {
        let cache = self.cache.as_ref()?;
        match cache.get(content_hash, role).await {
            Ok(Some(hit)) if hit.role() == role => {
                debug!(role = %role, content_hash, "Cache hit");
                Some(hit)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(role = %role, error = %e, "Cache lookup failed, treating as miss");
                None
            }
        }
    }

    async fn cache_store(&self, content_hash: &str, role: Role, result: &CachedResult) {
        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(content_hash, role, result).await {
                warn!(role = %role, error = %e, "Failed to store result in cache");
            }
        }
    }

    fn assemble(
        &self,
        article: Article,
        summary: Result<RoleRun, RoleError>,
        sentiment: Result<RoleRun, RoleError>,
    ) -> Result<ProcessedArticle, PipelineError> {
        match (summary, sentiment) {
            (Err(RoleError::Cancelled), Err(RoleError::Cancelled)) => Err(PipelineError::Cancelled),
            (Err(RoleError::BudgetExceeded { .. }), Err(RoleError::BudgetExceeded { .. })) => {
                let state = self.tracker.budget_state();
                warn!(article_id = %article.id, "Article rejected, daily budget exhausted");
                Err(PipelineError::BudgetExhausted {
                    spent_usd: state.spent_today_usd,
                    limit_usd: state.daily_limit_usd,
                })
            }
            (Err(s), Err(t)) => {
                warn!(article_id = %article.id, summary = %s, sentiment = %t, "Both roles failed");
                Err(PipelineError::Failed {
                    article_id: article.id,
                    summary: Some(s),
                    sentiment: Some(t),
                })
            }
            (summary, sentiment) => {
                if self.settings.partial_results == PartialResultPolicy::Discard
                    && (summary.is_err() || sentiment.is_err())
                {
                    warn!(article_id = %article.id, "Discarding partially processed article");
                    return Err(PipelineError::Failed {
                        article_id: article.id,
                        summary: summary.err(),
                        sentiment: sentiment.err(),
                    });
                }
                Ok(self.build_processed(article, summary, sentiment))
            }
        }
    }

    fn build_processed(
        &self,
        article: Article,
        summary: Result<RoleRun, RoleError>,
        sentiment: Result<RoleRun, RoleError>,
    ) -> ProcessedArticle {
        let mut processed = ProcessedArticle {
            article,
            summary: None,
            sentiment: None,
            failures: Vec::new(),
            cache_hits: Vec::new(),
            total_cost_usd: 0.0,
            processed_at: Utc::now(),
        };

        for (role, outcome) in [(Role::Summarize, summary), (Role::Sentiment, sentiment)] {
            match outcome {
                Ok(run) => {
                    if run.from_cache {
                        processed.cache_hits.push(role);
                    }
                    match run.result {
                        CachedResult::Summarize(s) => {
                            if !run.from_cache {
                                processed.total_cost_usd += s.usage.cost_usd;
                            }
                            processed.summary = Some(s);
                        }
                        CachedResult::Sentiment(s) => {
                            if !run.from_cache {
                                processed.total_cost_usd += s.usage.cost_usd;
                            }
                            processed.sentiment = Some(s);
                        }
                    }
                }
                Err(err) => processed.failures.push(RoleFailure {
                    role,
                    error: (&err).into(),
                }),
            }
        }

        info!(
            article_id = %processed.article.id,
            status = %processed.status(),
            cost_usd = processed.total_cost_usd,
            cache_hits = processed.cache_hits.len(),
            "Article processed"
        );
        processed
    }
}

impl std::fmt::Debug for SummarizationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummarizationPipeline")
            .field("controller", &self.controller)
            .field("limiter", &self.limiter)
            .field("cache", &self.cache)
            .field("settings", &self.settings)
            .finish()
    }
}
