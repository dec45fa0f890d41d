//! Global configuration types for Newswire.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! daily budget, retry policy, provider table and per-role routing.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::llm::{ProviderKind, Role};

/// Top-level configuration.
///
/// Loaded from `~/.newswire/config.toml`. All fields have sensible defaults,
/// so an empty file yields a working OpenAI + Anthropic setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Hard daily spend ceiling in USD.
    #[serde(default = "default_daily_budget_usd")]
    pub daily_budget_usd: f64,

    /// Attempts per provider before falling back to the next one.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Hard per-attempt timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum characters of article content sent to any provider.
    #[serde(default = "default_truncation_limit")]
    pub truncation_limit: usize,

    /// Articles in flight at once in batch mode.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// What to do with an article where exactly one role failed.
    #[serde(default)]
    pub partial_results: PartialResultPolicy,

    #[serde(default)]
    pub backoff: BackoffConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// SQLite file, relative to the data directory unless absolute.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub news: NewsConfig,
}

fn default_daily_budget_usd() -> f64 {
    5.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_truncation_limit() -> usize {
    4000
}

fn default_max_concurrency() -> usize {
    4
}

fn default_database_path() -> String {
    "newswire.db".to_string()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            daily_budget_usd: default_daily_budget_usd(),
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            truncation_limit: default_truncation_limit(),
            max_concurrency: default_max_concurrency(),
            partial_results: PartialResultPolicy::default(),
            backoff: BackoffConfig::default(),
            cache: CacheConfig::default(),
            database_path: default_database_path(),
            providers: default_providers(),
            routing: RoutingConfig::default(),
            news: NewsConfig::default(),
        }
    }
}

impl GlobalConfig {
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Providers referenced by at least one role, in first-seen order.
    pub fn routed_providers(&self) -> Vec<&ProviderConfig> {
        let mut seen = HashSet::new();
        Role::ALL
            .iter()
            .flat_map(|role| self.routing.route(*role).iter())
            .filter(|name| seen.insert(name.as_str()))
            .filter_map(|name| self.provider(name))
            .collect()
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.daily_budget_usd > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "daily_budget_usd must be positive, got {}",
                self.daily_budget_usd
            )));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.truncation_limit == 0 {
            return Err(ConfigError::Invalid(
                "truncation_limit must be at least 1".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrency must be at least 1".into(),
            ));
        }

        let mut names = HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider name '{}'",
                    provider.name
                )));
            }
            if provider.requests_per_minute == 0 {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' has requests_per_minute = 0",
                    provider.name
                )));
            }
        }

        for role in Role::ALL {
            let route = self.routing.route(role);
            if route.is_empty() || route.len() > 2 {
                return Err(ConfigError::InvalidRouting {
                    role,
                    count: route.len(),
                });
            }
            for name in route {
                if !names.contains(name.as_str()) {
                    return Err(ConfigError::UnknownProvider {
                        role,
                        provider: name.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Partial-result policy for articles where only one role succeeded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialResultPolicy {
    /// Keep the article with the failed role absent and its error attached.
    #[default]
    Keep,
    /// Treat the whole article as failed.
    Discard,
}

/// Exponential backoff between retries on the same provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_backoff_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub multiplier: f64,
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_max_ms() -> u64 {
    8_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_backoff_initial_ms(),
            max_ms: default_backoff_max_ms(),
            multiplier: default_backoff_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Cache directory, relative to the data directory unless absolute.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> String {
    "cache".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: default_cache_dir(),
        }
    }
}

/// One LLM backend entry in `[[providers]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name used by routing, events and usage records.
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub requests_per_minute: u32,
    /// Overrides the built-in pricing table when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_price_per_million: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_price_per_million: Option<f64>,
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            name: "openai".to_string(),
            kind: ProviderKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            requests_per_minute: 500,
            input_price_per_million: None,
            output_price_per_million: None,
        },
        ProviderConfig {
            name: "anthropic".to_string(),
            kind: ProviderKind::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
            requests_per_minute: 50,
            input_price_per_million: None,
            output_price_per_million: None,
        },
    ]
}

/// Ordered provider names per role: primary first, optional fallback second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_summarize_route")]
    pub summarize: Vec<String>,
    #[serde(default = "default_sentiment_route")]
    pub sentiment: Vec<String>,
}

fn default_summarize_route() -> Vec<String> {
    vec!["openai".to_string(), "anthropic".to_string()]
}

fn default_sentiment_route() -> Vec<String> {
    vec!["anthropic".to_string(), "openai".to_string()]
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            summarize: default_summarize_route(),
            sentiment: default_sentiment_route(),
        }
    }
}

impl RoutingConfig {
    pub fn route(&self, role: Role) -> &[String] {
        match role {
            Role::Summarize => &self.summarize,
            Role::Sentiment => &self.sentiment,
        }
    }
}

/// Upstream news source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    #[serde(default = "default_news_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_news_base_url")]
    pub base_url: String,
    #[serde(default = "default_news_rpm")]
    pub requests_per_minute: u32,
}

fn default_news_api_key_env() -> String {
    "NEWS_API_KEY".to_string()
}

fn default_news_base_url() -> String {
    "https://newsapi.org/v2".to_string()
}

fn default_news_rpm() -> u32 {
    100
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_news_api_key_env(),
            base_url: default_news_base_url(),
            requests_per_minute: default_news_rpm(),
        }
    }
}
