//! LLM backend implementations.
//!
//! Contains the concrete [`LlmProvider`] backends, the closed [`Backend`]
//! sum type the CLI builds from config ([`create_provider`]), the HTTP
//! failure classification shared by both backends, and the default pricing
//! table.

pub mod anthropic;
pub mod openai_compat;
pub mod pricing;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use secrecy::SecretString;

use newswire_core::llm::provider::LlmProvider;
use newswire_types::config::ProviderConfig;
use newswire_types::llm::{CompletionRequest, CompletionResponse, LlmError, ProviderKind};

use self::anthropic::AnthropicProvider;
use self::openai_compat::OpenAiCompatibleProvider;

/// Every backend this build can talk to.
pub enum Backend {
    Anthropic(AnthropicProvider),
    OpenAi(OpenAiCompatibleProvider),
}

impl LlmProvider for Backend {
    fn name(&self) -> &str {
        match self {
            Backend::Anthropic(p) => p.name(),
            Backend::OpenAi(p) => p.name(),
        }
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        match self {
            Backend::Anthropic(p) => p.complete(request).await,
            Backend::OpenAi(p) => p.complete(request).await,
        }
    }
}

/// Build the backend described by `config`, authenticated with `api_key`.
pub fn create_provider(config: &ProviderConfig, api_key: SecretString) -> Backend {
    match config.kind {
        ProviderKind::Anthropic => {
            let mut provider = AnthropicProvider::new(config.name.clone(), api_key);
            if let Some(base_url) = config.base_url.as_deref() {
                provider = provider.with_base_url(base_url);
            }
            Backend::Anthropic(provider)
        }
        ProviderKind::OpenAi => Backend::OpenAi(OpenAiCompatibleProvider::new(
            config.name.clone(),
            &api_key,
            config.base_url.as_deref(),
        )),
    }
}

/// Classify a non-success HTTP status.
pub(crate) fn classify_status(status: u16, retry_after_ms: Option<u64>, body: String) -> LlmError {
    match status {
        401 | 403 => LlmError::AuthenticationFailed,
        429 => LlmError::RateLimited { retry_after_ms },
        408 | 500..=599 => LlmError::transient(format!("HTTP {status}: {body}")),
        _ => LlmError::invalid_response(format!("HTTP {status}: {body}")),
    }
}

/// Classify a failure that happened before a status line was received.
pub(crate) fn classify_transport_error(err: &reqwest::Error) -> LlmError {
    if err.is_decode() {
        LlmError::invalid_response(format!("undecodable response: {err}"))
    } else {
        LlmError::transient(format!("HTTP request failed: {err}"))
    }
}

/// `Retry-After` in milliseconds, when given as (possibly fractional) seconds.
pub(crate) fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    let secs: f64 = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then(|| (secs * 1000.0).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn provider_config(kind: ProviderKind, name: &str) -> ProviderConfig {
        ProviderConfig {
            name: name.to_string(),
            kind,
            model: "some-model".to_string(),
            api_key_env: "TEST_KEY".to_string(),
            base_url: None,
            requests_per_minute: 60,
            input_price_per_million: None,
            output_price_per_million: None,
        }
    }

    #[test]
    fn test_create_provider_matches_kind() {
        let backend = create_provider(
            &provider_config(ProviderKind::Anthropic, "claude"),
            SecretString::from("k"),
        );
        assert!(matches!(backend, Backend::Anthropic(_)));
        assert_eq!(backend.name(), "claude");

        let backend = create_provider(
            &provider_config(ProviderKind::OpenAi, "gpt"),
            SecretString::from("k"),
        );
        assert!(matches!(backend, Backend::OpenAi(_)));
        assert_eq!(backend.name(), "gpt");
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            classify_status(401, None, String::new()),
            LlmError::AuthenticationFailed
        );
        assert_eq!(
            classify_status(403, None, String::new()),
            LlmError::AuthenticationFailed
        );
        assert_eq!(
            classify_status(429, Some(2_000), String::new()),
            LlmError::RateLimited {
                retry_after_ms: Some(2_000)
            }
        );
        assert!(classify_status(500, None, String::new()).is_retryable());
        assert!(classify_status(503, None, String::new()).is_retryable());
        assert!(classify_status(529, None, "Overloaded".into()).is_retryable());
        assert!(matches!(
            classify_status(400, None, "bad".into()),
            LlmError::InvalidResponse { .. }
        ));
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after_ms(&headers), None);

        headers.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after_ms(&headers), Some(3_000));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("0.5"));
        assert_eq!(retry_after_ms(&headers), Some(500));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after_ms(&headers), None);
    }
}
