//! Scripted fake backend shared by the core's unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use newswire_types::llm::{CompletionRequest, CompletionResponse, LlmError, ProviderProfile, Usage};

use super::prompt::SENTIMENT_MAX_TOKENS;
use super::provider::LlmProvider;

/// One scripted outcome for a single `complete` call.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Role-appropriate reply (summary text or sentiment JSON) with usage.
    Success { input_tokens: u32, output_tokens: u32 },
    Reply { content: String, usage: Option<Usage> },
    Fail(LlmError),
    Delayed(Duration, Box<Scripted>),
}

impl Scripted {
    pub fn ok() -> Self {
        Scripted::Success {
            input_tokens: 100,
            output_tokens: 20,
        }
    }

    pub fn text_with_usage(content: &str, input_tokens: u32, output_tokens: u32) -> Self {
        Scripted::Reply {
            content: content.to_string(),
            usage: Some(Usage {
                input_tokens,
                output_tokens,
            }),
        }
    }

    pub fn text_without_usage(content: &str) -> Self {
        Scripted::Reply {
            content: content.to_string(),
            usage: None,
        }
    }

    pub fn transient() -> Self {
        Scripted::Fail(LlmError::transient("503 service unavailable"))
    }
}

/// What the fake saw.
#[derive(Debug, Default)]
pub struct ScriptLog {
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptLog {
    pub fn calls(&self) -> usize {
        self.requests.lock().expect("script log lock poisoned").len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("script log lock poisoned").clone()
    }
}

/// Fake backend that replays queued outcomes, then repeats `otherwise`.
pub struct ScriptedProvider {
    name: String,
    queue: Mutex<VecDeque<Scripted>>,
    otherwise: Scripted,
    log: Arc<ScriptLog>,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Vec<Scripted>) -> Self {
        Self {
            name: name.to_string(),
            queue: Mutex::new(script.into()),
            otherwise: Scripted::Fail(LlmError::invalid_response("script exhausted")),
            log: Arc::new(ScriptLog::default()),
        }
    }

    pub fn always(name: &str, outcome: Scripted) -> Self {
        let mut provider = Self::new(name, Vec::new());
        provider.otherwise = outcome;
        provider
    }

    pub fn log(&self) -> Arc<ScriptLog> {
        Arc::clone(&self.log)
    }

    fn next(&self) -> Scripted {
        self.queue
            .lock()
            .expect("script queue lock poisoned")
            .pop_front()
            .unwrap_or_else(|| self.otherwise.clone())
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.log
            .requests
            .lock()
            .expect("script log lock poisoned")
            .push(request.clone());

        let mut step = self.next();
        loop {
            match step {
                Scripted::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    step = *inner;
                }
                Scripted::Fail(err) => return Err(err),
                Scripted::Reply { content, usage } => {
                    return Ok(CompletionResponse {
                        id: format!("{}-resp", self.name),
                        content,
                        model: request.model.clone(),
                        usage,
                    });
                }
                Scripted::Success {
                    input_tokens,
                    output_tokens,
                } => {
                    let content = if request.max_tokens == SENTIMENT_MAX_TOKENS {
                        r#"{"label":"positive","confidence":0.75,"explanation":"Upbeat tone."}"#
                            .to_string()
                    } else {
                        format!("Summary from {}.", self.name)
                    };
                    return Ok(CompletionResponse {
                        id: format!("{}-resp", self.name),
                        content,
                        model: request.model.clone(),
                        usage: Some(Usage {
                            input_tokens,
                            output_tokens,
                        }),
                    });
                }
            }
        }
    }
}

/// Profile priced at $1 / $2 per million tokens with a generous rate limit.
pub fn test_profile(name: &str) -> ProviderProfile {
    ProviderProfile {
        name: name.to_string(),
        model: format!("{name}-model"),
        input_price_per_million: 1.0,
        output_price_per_million: 2.0,
        requests_per_minute: 1_000,
    }
}
