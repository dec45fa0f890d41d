//! Application state wiring the orchestration core to its infra adapters.
//!
//! Read-only commands (`list`, `search`, `show`, `budget`, `cache`) need only
//! the config and the database. The pipeline and the news source need API
//! keys, so they are built on demand by the `process` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use secrecy::SecretString;

use newswire_core::cache::BoxResponseCache;
use newswire_core::cost::tracker::CostTracker;
use newswire_core::event::bus::EventBus;
use newswire_core::llm::backoff::ExponentialBackoff;
use newswire_core::llm::box_provider::BoxLlmProvider;
use newswire_core::llm::client::ProviderClient;
use newswire_core::llm::fallback::FallbackController;
use newswire_core::llm::rate_limiter::RateLimiter;
use newswire_core::pipeline::summarizer::{PipelineSettings, SummarizationPipeline};
use newswire_infra::cache::FileResponseCache;
use newswire_infra::config::{load_config, resolve_api_keys, resolve_path};
use newswire_infra::crypto::hash::Sha256ContentHasher;
use newswire_infra::filesystem::resolve_data_dir;
use newswire_infra::llm::create_provider;
use newswire_infra::llm::pricing::resolve_profile;
use newswire_infra::news::NewsApiSource;
use newswire_infra::sqlite::article::SqliteArticleRepository;
use newswire_infra::sqlite::pool::DatabasePool;
use newswire_types::config::GlobalConfig;

/// Shared state for every CLI command.
pub struct AppState {
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
    pub articles: SqliteArticleRepository,
}

impl AppState {
    /// Load config and open the article database.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;

        let config = load_config(&data_dir).await?;

        let db_path = resolve_path(&data_dir, &config.database_path);
        let pool = DatabasePool::open(&db_path)
            .await
            .with_context(|| format!("opening database {}", db_path.display()))?;

        Ok(Self {
            config,
            data_dir,
            articles: SqliteArticleRepository::new(pool),
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        resolve_path(&self.data_dir, &self.config.cache.dir)
    }

    pub fn database_path(&self) -> PathBuf {
        resolve_path(&self.data_dir, &self.config.database_path)
    }

    /// The response cache, or `None` when caching is disabled.
    pub async fn open_cache(&self) -> Option<FileResponseCache> {
        if !self.config.cache.enabled {
            return None;
        }
        Some(FileResponseCache::open(&self.cache_dir()).await)
    }

    /// Wire clients, fallback, rate limits, budget and cache into a pipeline.
    ///
    /// Every routed provider must have its API key set.
    pub async fn build_pipeline(&self, events: &EventBus) -> anyhow::Result<SummarizationPipeline> {
        let config = &self.config;
        let keys = resolve_api_keys(config, |key| std::env::var(key).ok())?;
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let mut profiles = Vec::new();
        let mut clients = Vec::new();
        for provider in config.routed_providers() {
            let api_key = keys
                .get(&provider.name)
                .cloned()
                .with_context(|| format!("no API key resolved for '{}'", provider.name))?;
            let profile = resolve_profile(provider);
            let backend = create_provider(provider, api_key);
            clients.push(Arc::new(ProviderClient::new(
                profile.clone(),
                BoxLlmProvider::new(backend),
                timeout,
            )));
            profiles.push(profile);
        }

        let controller = FallbackController::new(
            clients,
            &config.routing,
            config.max_retries,
            ExponentialBackoff::from(&config.backoff),
        )?
        .with_event_bus(events.clone());

        let limiter = RateLimiter::from_profiles(&profiles).with_event_bus(events.clone());
        let tracker = Arc::new(
            CostTracker::with_system_clock(profiles, config.daily_budget_usd)
                .with_event_bus(events.clone()),
        );

        let mut pipeline = SummarizationPipeline::new(
            controller,
            limiter,
            tracker,
            Arc::new(Sha256ContentHasher::new()),
            PipelineSettings::from(config),
        );
        if let Some(cache) = self.open_cache().await {
            pipeline = pipeline.with_cache(BoxResponseCache::new(cache));
        }

        tracing::debug!(?pipeline, "Pipeline ready");
        Ok(pipeline)
    }

    pub fn news_source(&self) -> anyhow::Result<NewsApiSource> {
        let env_var = &self.config.news.api_key_env;
        let key = std::env::var(env_var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .with_context(|| format!("{env_var} is not set"))?;
        Ok(NewsApiSource::new(SecretString::from(key), &self.config.news))
    }
}
