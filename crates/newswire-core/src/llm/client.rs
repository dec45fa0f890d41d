//! ProviderClient -- the two-role capability over one backend.
//!
//! Wraps a boxed backend with its static profile and the hard per-attempt
//! timeout, turning raw completions into typed role outputs plus the token
//! counts used for billing.

use std::time::Duration;

use tracing::{Instrument, field, info_span, warn};

use newswire_types::llm::{CompletionRequest, CompletionResponse, LlmError, ProviderProfile, Role, Usage};

use super::box_provider::BoxLlmProvider;
use super::prompt::{self, ParsedSentiment};

/// A role output together with the usage to bill for it.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleCompletion<T> {
    pub value: T,
    pub usage: Usage,
    /// True when the backend did not report usage and it was estimated.
    pub usage_estimated: bool,
}

/// Parsed output of either role.
#[derive(Debug, Clone, PartialEq)]
pub enum RoleValue {
    Summary(String),
    Sentiment(ParsedSentiment),
}

/// A backend reply that has not been parsed yet, with the usage to bill.
///
/// Billing and parsing are separate steps: a reply the backend charged for
/// still costs money when its content turns out to be unusable.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleReply {
    pub role: Role,
    pub content: String,
    pub usage: Usage,
    pub usage_estimated: bool,
}

impl RoleReply {
    pub fn parse(&self) -> Result<RoleValue, LlmError> {
        match self.role {
            Role::Summarize => prompt::parse_summary(&self.content).map(RoleValue::Summary),
            Role::Sentiment => prompt::parse_sentiment(&self.content).map(RoleValue::Sentiment),
        }
    }

    fn completion<T>(self, value: T) -> RoleCompletion<T> {
        RoleCompletion {
            value,
            usage: self.usage,
            usage_estimated: self.usage_estimated,
        }
    }
}

pub struct ProviderClient {
    profile: ProviderProfile,
    provider: BoxLlmProvider,
    request_timeout: Duration,
}

impl ProviderClient {
    pub fn new(profile: ProviderProfile, provider: BoxLlmProvider, request_timeout: Duration) -> Self {
        Self {
            profile,
            provider,
            request_timeout,
        }
    }

    /// Configured provider name (routing key), not the backend's own name.
    pub fn name(&self) -> &str {
        &self.profile.name
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    /// The exact request this client would send for `role`.
    pub fn build_request(&self, role: Role, content: &str) -> CompletionRequest {
        match role {
            Role::Summarize => prompt::summarize_request(&self.profile.model, content),
            Role::Sentiment => prompt::sentiment_request(&self.profile.model, content),
        }
    }

    /// Upper bound on the usage of one call: input bounded by its UTF-8 byte
    /// length plus framing, output by the role's `max_tokens`.
    pub fn estimate_usage(&self, role: Role, content: &str) -> Usage {
        let request = self.build_request(role, content);
        Usage {
            input_tokens: prompt::max_request_tokens(&request),
            output_tokens: request.max_tokens,
        }
    }

    /// Issue one request for `role` and return the unparsed reply.
    pub async fn send(&self, role: Role, content: &str) -> Result<RoleReply, LlmError> {
        let request = self.build_request(role, content);
        let response = self.call(role, &request).await?;
        Ok(self.reply(role, &request, response))
    }

    pub async fn summarize(&self, content: &str) -> Result<RoleCompletion<String>, LlmError> {
        let reply = self.send(Role::Summarize, content).await?;
        let text = prompt::parse_summary(&reply.content)?;
        Ok(reply.completion(text))
    }

    pub async fn analyze_sentiment(
        &self,
        text: &str,
    ) -> Result<RoleCompletion<ParsedSentiment>, LlmError> {
        let reply = self.send(Role::Sentiment, text).await?;
        let parsed = prompt::parse_sentiment(&reply.content)?;
        Ok(reply.completion(parsed))
    }

    async fn call(
        &self,
        role: Role,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let span = info_span!(
            "gen_ai.complete",
            gen_ai.operation.name = %role,
            gen_ai.provider.name = self.provider.name(),
            gen_ai.request.model = %request.model,
            gen_ai.request.max_tokens = request.max_tokens,
            gen_ai.usage.input_tokens = field::Empty,
            gen_ai.usage.output_tokens = field::Empty,
        );

        let result = match tokio::time::timeout(self.request_timeout, self.provider.complete(request))
            .instrument(span.clone())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout {
                timeout_ms: self.request_timeout.as_millis() as u64,
            }),
        };

        if let Ok(CompletionResponse {
            usage: Some(usage), ..
        }) = &result
        {
            span.record("gen_ai.usage.input_tokens", usage.input_tokens);
            span.record("gen_ai.usage.output_tokens", usage.output_tokens);
        }
        result
    }

    fn reply(&self, role: Role, request: &CompletionRequest, response: CompletionResponse) -> RoleReply {
        let (usage, usage_estimated) = match response.usage {
            Some(usage) => (usage, false),
            None => {
                let usage = Usage {
                    input_tokens: prompt::estimate_request_tokens(request),
                    output_tokens: prompt::estimate_tokens(&response.content)
                        .min(request.max_tokens),
                };
                warn!(
                    provider = %self.profile.name,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "Backend reported no usage; billing estimated token counts"
                );
                (usage, true)
            }
        };
        RoleReply {
            role,
            content: response.content,
            usage,
            usage_estimated,
        }
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("profile", &self.profile)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
