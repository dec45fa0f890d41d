//! OpenAI-compatible LLM backend.
//!
//! [`OpenAiCompatibleProvider`] talks to any chat-completions endpoint
//! (OpenAI itself, or a compatible proxy via `base_url`). Uses
//! [`async_openai`] for type-safe request/response handling, with its
//! built-in retry turned off: every re-send goes through the fallback
//! controller and the local rate limiter.

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest,
};
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use secrecy::{ExposeSecret, SecretString};

use newswire_core::llm::provider::LlmProvider;
use newswire_types::llm::{CompletionRequest, CompletionResponse, LlmError, MessageRole, Usage};

use crate::llm::{classify_status, classify_transport_error};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Provider for any OpenAI-compatible chat completions API.
///
/// Does NOT derive Debug: the `async_openai::Client` holds the API key.
pub struct OpenAiCompatibleProvider {
    client: Client<OpenAIConfig>,
    name: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(name: impl Into<String>, api_key: &SecretString, base_url: Option<&str>) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key.expose_secret())
            .with_api_base(base_url.unwrap_or(DEFAULT_BASE_URL));

        Self {
            client: Client::with_config(config).with_backoff(no_retry_backoff()),
            name: name.into(),
        }
    }
}

/// A backoff that gives up before the first retry, so a 429 or 5xx reaches
/// [`map_openai_error`] on the first response.
fn no_retry_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

/// Build a [`CreateChatCompletionRequest`] from a generic [`CompletionRequest`].
fn build_request(request: &CompletionRequest) -> CreateChatCompletionRequest {
    let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();

    if let Some(system) = &request.system {
        messages.push(ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessage {
                content: ChatCompletionRequestSystemMessageContent::Text(system.clone()),
                name: None,
            },
        ));
    }

    for msg in &request.messages {
        let oai_msg = match msg.role {
            MessageRole::User => {
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            MessageRole::Assistant => {
                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                        msg.content.clone(),
                    )),
                    refusal: None,
                    name: None,
                    audio: None,
                    tool_calls: None,
                    function_call: None,
                })
            }
        };
        messages.push(oai_msg);
    }

    CreateChatCompletionRequest {
        model: request.model.clone(),
        messages,
        max_completion_tokens: Some(request.max_tokens),
        temperature: request.temperature.map(|t| t as f32),
        ..Default::default()
    }
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let response = self
            .client
            .chat()
            .create(build_request(request))
            .await
            .map_err(map_openai_error)?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::invalid_response("response contained no message content"))?;

        Ok(CompletionResponse {
            id: response.id,
            content,
            model: response.model,
            usage: response.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

/// Map an async-openai error onto the shared failure classes.
fn map_openai_error(err: OpenAIError) -> LlmError {
    match &err {
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.as_deref().unwrap_or("");
            let error_type = api_err.r#type.as_deref().unwrap_or("");

            if code == "invalid_api_key"
                || error_type == "authentication_error"
                || api_err.message.contains("Incorrect API key")
                || api_err.message.contains("Invalid API key")
            {
                LlmError::AuthenticationFailed
            } else if code == "rate_limit_exceeded" || error_type == "rate_limit_error" {
                LlmError::RateLimited {
                    retry_after_ms: None,
                }
            } else if code == "server_error"
                || error_type == "server_error"
                || error_type == "overloaded_error"
            {
                LlmError::transient(api_err.message.clone())
            } else {
                LlmError::invalid_response(api_err.message.clone())
            }
        }
        OpenAIError::Reqwest(reqwest_err) => match reqwest_err.status() {
            Some(status) => classify_status(status.as_u16(), None, err.to_string()),
            None => classify_transport_error(reqwest_err),
        },
        OpenAIError::JSONDeserialize(..) => {
            LlmError::invalid_response(format!("failed to parse response: {err}"))
        }
        _ => LlmError::transient(err.to_string()),
    }
}
