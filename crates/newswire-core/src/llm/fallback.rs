//! Per-role provider fallback.
//!
//! Each role has an ordered route of one or two providers. A role's attempt
//! sequence is an explicit state machine: `Attempting(provider, attempt)`
//! moves to `Done` on success, retries the same provider with exponential
//! backoff on transient failures until `max_retries` attempts are used, and
//! otherwise advances to the next provider or ends in `Failed`.
//! Authentication and invalid-response failures advance immediately.
//!
//! Attempts for one role are strictly sequential. Budget rejections and
//! cancellation end the sequence at once and are never retried.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use newswire_types::config::RoutingConfig;
use newswire_types::error::{BudgetError, ConfigError, RoleError};
use newswire_types::event::PipelineEvent;
use newswire_types::llm::{LlmError, Role};

use super::backoff::ExponentialBackoff;
use super::client::ProviderClient;
use crate::event::bus::EventBus;

/// Position in one role's attempt sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState<T> {
    Attempting { provider_index: usize, attempt: u32 },
    Done(T),
    Failed(LlmError),
}

/// Limits that drive [`AttemptState::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed per provider.
    pub max_retries: u32,
    pub provider_count: usize,
}

impl<T> AttemptState<T> {
    pub fn start() -> Self {
        AttemptState::Attempting {
            provider_index: 0,
            attempt: 1,
        }
    }

    /// Apply the outcome of the current attempt. Terminal states absorb.
    pub fn step(self, outcome: Result<T, LlmError>, policy: RetryPolicy) -> Self {
        let AttemptState::Attempting {
            provider_index,
            attempt,
        } = self
        else {
            return self;
        };

        match outcome {
            Ok(value) => AttemptState::Done(value),
            Err(err) if !err.advances_provider() && attempt < policy.max_retries => {
                AttemptState::Attempting {
                    provider_index,
                    attempt: attempt + 1,
                }
            }
            Err(_) if provider_index + 1 < policy.provider_count => AttemptState::Attempting {
                provider_index: provider_index + 1,
                attempt: 1,
            },
            Err(err) => AttemptState::Failed(err),
        }
    }
}

/// Why a single attempt did not produce a value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptError {
    /// The backend call failed; subject to retry/fallback rules.
    Provider(LlmError),
    /// The budget ledger refused the call before it was issued.
    Budget(BudgetError),
    /// Cancelled while waiting to issue the call.
    Cancelled,
}

impl From<LlmError> for AttemptError {
    fn from(err: LlmError) -> Self {
        AttemptError::Provider(err)
    }
}

impl From<BudgetError> for AttemptError {
    fn from(err: BudgetError) -> Self {
        AttemptError::Budget(err)
    }
}

/// A role's successful outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackSuccess<T> {
    pub value: T,
    /// Provider that produced `value`.
    pub provider: String,
    /// Attempts made across all providers, the successful one included.
    pub attempts: u32,
}

pub struct FallbackController {
    routes: HashMap<Role, Vec<Arc<ProviderClient>>>,
    max_retries: u32,
    backoff: ExponentialBackoff,
    events: Option<EventBus>,
}

impl FallbackController {
    /// Resolve each role's route against the available clients.
    pub fn new(
        clients: impl IntoIterator<Item = Arc<ProviderClient>>,
        routing: &RoutingConfig,
        max_retries: u32,
        backoff: ExponentialBackoff,
    ) -> Result<Self, ConfigError> {
        let by_name: HashMap<String, Arc<ProviderClient>> = clients
            .into_iter()
            .map(|c| (c.name().to_string(), c))
            .collect();

        let mut routes = HashMap::new();
        for role in Role::ALL {
            let names = routing.route(role);
            if names.is_empty() || names.len() > 2 {
                return Err(ConfigError::InvalidRouting {
                    role,
                    count: names.len(),
                });
            }
            let route = names
                .iter()
                .map(|name| {
                    by_name
                        .get(name)
                        .cloned()
                        .ok_or_else(|| ConfigError::UnknownProvider {
                            role,
                            provider: name.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            routes.insert(role, route);
        }

        Ok(Self {
            routes,
            max_retries: max_retries.max(1),
            backoff,
            events: None,
        })
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn route(&self, role: Role) -> &[Arc<ProviderClient>] {
        self.routes.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run one role to completion.
    ///
    /// `attempt_fn` performs one attempt against the given client; it is
    /// called strictly sequentially. No new attempt starts once `cancel` is
    /// raised, and a pending backoff is cut short.
    pub async fn execute<T, F, Fut>(
        &self,
        role: Role,
        cancel: &CancellationToken,
        mut attempt_fn: F,
    ) -> Result<FallbackSuccess<T>, RoleError>
    where
        F: FnMut(Arc<ProviderClient>, u32) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let route = self.route(role);
        if route.is_empty() {
            return Err(RoleError::NoProviders { role });
        }
        let policy = RetryPolicy {
            max_retries: self.max_retries,
            provider_count: route.len(),
        };

        let mut state = AttemptState::start();
        let mut attempts = 0u32;
        let mut current = 0usize;

        loop {
            let (provider_index, attempt) = match state {
                AttemptState::Attempting {
                    provider_index,
                    attempt,
                } => (provider_index, attempt),
                AttemptState::Done(value) => {
                    return Ok(FallbackSuccess {
                        value,
                        provider: route[current].name().to_string(),
                        attempts,
                    });
                }
                AttemptState::Failed(last_error) => {
                    warn!(role = %role, attempts, error = %last_error, "All providers failed");
                    return Err(RoleError::AllProvidersFailed {
                        last_error,
                        attempts,
                    });
                }
            };

            if cancel.is_cancelled() {
                debug!(role = %role, attempts, "Cancelled before next attempt");
                return Err(RoleError::Cancelled);
            }

            current = provider_index;
            let client = Arc::clone(&route[provider_index]);
            attempts += 1;
            debug!(role = %role, provider = client.name(), attempt, "Attempting provider");

            let outcome = match attempt_fn(Arc::clone(&client), attempt).await {
                Ok(value) => Ok(value),
                Err(AttemptError::Provider(err)) => Err(err),
                Err(AttemptError::Budget(err)) => return Err(err.into()),
                Err(AttemptError::Cancelled) => return Err(RoleError::Cancelled),
            };
            let failure = outcome.as_ref().err().cloned();

            state = AttemptState::Attempting {
                provider_index,
                attempt,
            }
            .step(outcome, policy);

            let (Some(err), AttemptState::Attempting {
                provider_index: next_index,
                attempt: next_attempt,
            }) = (failure, &state)
            else {
                continue;
            };

            if *next_index == provider_index {
                let delay = self.retry_delay(attempt, &err);
                info!(
                    role = %role,
                    provider = client.name(),
                    attempt = *next_attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying same provider"
                );
                self.publish(PipelineEvent::RetryScheduled {
                    role,
                    provider: client.name().to_string(),
                    attempt: *next_attempt,
                    delay_ms: delay.as_millis() as u64,
                    reason: err.class().to_string(),
                });
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(role = %role, attempts, "Cancelled during backoff");
                        return Err(RoleError::Cancelled);
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            } else {
                let next = route[*next_index].name();
                warn!(
                    role = %role,
                    from = client.name(),
                    to = next,
                    error = %err,
                    "Provider failed, falling back to next in route"
                );
                self.publish(PipelineEvent::ProviderFallback {
                    role,
                    from_provider: client.name().to_string(),
                    to_provider: next.to_string(),
                    reason: err.class().to_string(),
                });
            }
        }
    }

    /// Backoff for the retry after `attempt`, stretched to honour a
    /// backend-supplied retry-after.
    fn retry_delay(&self, attempt: u32, err: &LlmError) -> Duration {
        let backoff = self.backoff.delay_for(attempt);
        match err {
            LlmError::RateLimited {
                retry_after_ms: Some(ms),
            } => backoff.max(Duration::from_millis(*ms)),
            _ => backoff,
        }
    }

    fn publish(&self, event: PipelineEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

impl std::fmt::Debug for FallbackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes: HashMap<String, Vec<&str>> = self
            .routes
            .iter()
            .map(|(role, clients)| (role.to_string(), clients.iter().map(|c| c.name()).collect()))
            .collect();
        f.debug_struct("FallbackController")
            .field("routes", &routes)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::bus::drain;
    use crate::llm::box_provider::BoxLlmProvider;
    use crate::llm::testing::{ScriptLog, Scripted, ScriptedProvider, test_profile};

    const POLICY: RetryPolicy = RetryPolicy {
        max_retries: 2,
        provider_count: 2,
    };

    fn client(provider: ScriptedProvider) -> (Arc<ProviderClient>, Arc<ScriptLog>) {
        let log = provider.log();
        let name = provider_name(&provider);
        let client = ProviderClient::new(
            test_profile(&name),
            BoxLlmProvider::new(provider),
            Duration::from_secs(30),
        );
        (Arc::new(client), log)
    }

    fn provider_name(provider: &ScriptedProvider) -> String {
        crate::llm::provider::LlmProvider::name(provider).to_string()
    }

    fn routing(summarize: &[&str]) -> RoutingConfig {
        RoutingConfig {
            summarize: summarize.iter().map(|s| s.to_string()).collect(),
            sentiment: vec![summarize[0].to_string()],
        }
    }

    fn controller(
        primary: ScriptedProvider,
        secondary: ScriptedProvider,
        max_retries: u32,
    ) -> (FallbackController, Arc<ScriptLog>, Arc<ScriptLog>) {
        let (p, p_log) = client(primary);
        let (s, s_log) = client(secondary);
        let controller = FallbackController::new(
            [p, s],
            &routing(&["primary", "secondary"]),
            max_retries,
            ExponentialBackoff::none(),
        )
        .unwrap();
        (controller, p_log, s_log)
    }

    async fn summarize(
        controller: &FallbackController,
        cancel: &CancellationToken,
    ) -> Result<FallbackSuccess<String>, RoleError> {
        controller
            .execute(Role::Summarize, cancel, |client, _attempt| async move {
                client
                    .summarize("article body")
                    .await
                    .map(|c| c.value)
                    .map_err(AttemptError::from)
            })
            .await
    }

    // --- pure transitions ---

    #[test]
    fn success_is_done() {
        let state = AttemptState::start().step(Ok("x"), POLICY);
        assert_eq!(state, AttemptState::Done("x"));
    }

    #[test]
    fn transient_retries_same_provider_until_max() {
        let err = LlmError::transient("502");
        let state = AttemptState::<()>::start().step(Err(err.clone()), POLICY);
        assert_eq!(
            state,
            AttemptState::Attempting {
                provider_index: 0,
                attempt: 2
            }
        );
        let state = state.step(Err(err.clone()), POLICY);
        assert_eq!(
            state,
            AttemptState::Attempting {
                provider_index: 1,
                attempt: 1
            }
        );
        let state = state.step(Err(err.clone()), POLICY);
        let state = state.step(Err(err.clone()), POLICY);
        assert_eq!(state, AttemptState::Failed(err));
    }

    #[test]
    fn auth_and_invalid_response_advance_immediately() {
        for err in [
            LlmError::AuthenticationFailed,
            LlmError::invalid_response("garbage"),
        ] {
            let state = AttemptState::<()>::start().step(Err(err), POLICY);
            assert_eq!(
                state,
                AttemptState::Attempting {
                    provider_index: 1,
                    attempt: 1
                }
            );
        }
    }

    #[test]
    fn single_provider_route_fails_after_retries() {
        let policy = RetryPolicy {
            max_retries: 1,
            provider_count: 1,
        };
        let state = AttemptState::<()>::start().step(Err(LlmError::AuthenticationFailed), policy);
        assert_eq!(state, AttemptState::Failed(LlmError::AuthenticationFailed));
    }

    #[test]
    fn fatal_error_on_last_provider_skips_remaining_retries() {
        let policy = RetryPolicy {
            max_retries: 3,
            provider_count: 1,
        };
        for err in [
            LlmError::AuthenticationFailed,
            LlmError::invalid_response("garbage"),
        ] {
            let state = AttemptState::<()>::start().step(Err(err.clone()), policy);
            assert_eq!(state, AttemptState::Failed(err));
        }
        let state = AttemptState::<()>::start().step(Err(LlmError::transient("503")), policy);
        assert_eq!(
            state,
            AttemptState::Attempting {
                provider_index: 0,
                attempt: 2
            }
        );
    }

    #[test]
    fn terminal_states_absorb() {
        let done = AttemptState::Done(1).step(Err(LlmError::AuthenticationFailed), POLICY);
        assert_eq!(done, AttemptState::Done(1));
        let failed = AttemptState::<i32>::Failed(LlmError::AuthenticationFailed).step(Ok(2), POLICY);
        assert_eq!(failed, AttemptState::Failed(LlmError::AuthenticationFailed));
    }

    // --- driven sequences ---

    #[tokio::test]
    async fn two_primary_attempts_then_secondary() {
        let (controller, p_log, s_log) = controller(
            ScriptedProvider::always("primary", Scripted::transient()),
            ScriptedProvider::always("secondary", Scripted::ok()),
            2,
        );

        let out = summarize(&controller, &CancellationToken::new()).await.unwrap();

        assert_eq!(p_log.calls(), 2);
        assert_eq!(s_log.calls(), 1);
        assert_eq!(out.provider, "secondary");
        assert_eq!(out.value, "Summary from secondary.");
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test]
    async fn auth_error_skips_retries() {
        let (controller, p_log, s_log) = controller(
            ScriptedProvider::always("primary", Scripted::Fail(LlmError::AuthenticationFailed)),
            ScriptedProvider::always("secondary", Scripted::ok()),
            3,
        );

        let out = summarize(&controller, &CancellationToken::new()).await.unwrap();
        assert_eq!(p_log.calls(), 1);
        assert_eq!(s_log.calls(), 1);
        assert_eq!(out.provider, "secondary");
    }

    #[tokio::test]
    async fn recovers_on_same_provider() {
        let (controller, p_log, s_log) = controller(
            ScriptedProvider::new(
                "primary",
                vec![
                    Scripted::Fail(LlmError::Timeout { timeout_ms: 30_000 }),
                    Scripted::ok(),
                ],
            ),
            ScriptedProvider::always("secondary", Scripted::ok()),
            3,
        );

        let out = summarize(&controller, &CancellationToken::new()).await.unwrap();
        assert_eq!(out.provider, "primary");
        assert_eq!(p_log.calls(), 2);
        assert_eq!(s_log.calls(), 0);
    }

    #[tokio::test]
    async fn all_providers_failed_reports_last_error_and_count() {
        let (controller, p_log, s_log) = controller(
            ScriptedProvider::always("primary", Scripted::transient()),
            ScriptedProvider::always(
                "secondary",
                Scripted::Fail(LlmError::RateLimited {
                    retry_after_ms: None,
                }),
            ),
            3,
        );

        let err = summarize(&controller, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RoleError::AllProvidersFailed {
                last_error: LlmError::RateLimited {
                    retry_after_ms: None
                },
                attempts: 6,
            }
        );
        assert_eq!(p_log.calls(), 3);
        assert_eq!(s_log.calls(), 3);
    }

    #[tokio::test]
    async fn budget_rejection_is_not_retried() {
        let (controller, _p, _s) = controller(
            ScriptedProvider::always("primary", Scripted::ok()),
            ScriptedProvider::always("secondary", Scripted::ok()),
            3,
        );
        let mut calls = 0;
        let err = controller
            .execute(Role::Summarize, &CancellationToken::new(), |_client, _| {
                calls += 1;
                async {
                    Err::<(), _>(AttemptError::Budget(BudgetError::Exceeded {
                        requested_usd: 0.01,
                        spent_usd: 5.0,
                        reserved_usd: 0.0,
                        limit_usd: 5.0,
                    }))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RoleError::BudgetExceeded { .. }));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_calls() {
        let (controller, p_log, s_log) = controller(
            ScriptedProvider::always("primary", Scripted::ok()),
            ScriptedProvider::always("secondary", Scripted::ok()),
            3,
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = summarize(&controller, &cancel).await.unwrap_err();
        assert_eq!(err, RoleError::Cancelled);
        assert_eq!(p_log.calls() + s_log.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_backoff_stops_retries() {
        let (p, p_log) = client(ScriptedProvider::always("primary", Scripted::transient()));
        let (s, s_log) = client(ScriptedProvider::always("secondary", Scripted::ok()));
        let controller = FallbackController::new(
            [p, s],
            &routing(&["primary", "secondary"]),
            3,
            ExponentialBackoff::new(Duration::from_secs(10), Duration::from_secs(10), 2.0),
        )
        .unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let err = controller
            .execute(Role::Summarize, &cancel, |client, _| {
                let trigger = trigger.clone();
                async move {
                    let result = client.summarize("body").await;
                    // Raised while the call is in flight; the call still completes.
                    trigger.cancel();
                    result.map(|c| c.value).map_err(AttemptError::from)
                }
            })
            .await
            .unwrap_err();

        assert_eq!(err, RoleError::Cancelled);
        assert_eq!(p_log.calls(), 1);
        assert_eq!(s_log.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn backend_retry_after_stretches_backoff() {
        let (p, _) = client(ScriptedProvider::new(
            "primary",
            vec![
                Scripted::Fail(LlmError::RateLimited {
                    retry_after_ms: Some(7_000),
                }),
                Scripted::ok(),
            ],
        ));
        let controller = FallbackController::new(
            [p],
            &routing(&["primary"]),
            3,
            ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1), 2.0),
        )
        .unwrap();

        let started = tokio::time::Instant::now();
        summarize(&controller, &CancellationToken::new()).await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test]
    async fn emits_retry_and_fallback_events() {
        let (controller, _, _) = controller(
            ScriptedProvider::always("primary", Scripted::transient()),
            ScriptedProvider::always("secondary", Scripted::ok()),
            2,
        );
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let controller = controller.with_event_bus(bus);

        summarize(&controller, &CancellationToken::new()).await.unwrap();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            PipelineEvent::RetryScheduled { provider, attempt: 2, .. } if provider == "primary"
        ));
        assert_eq!(
            events[1],
            PipelineEvent::ProviderFallback {
                role: Role::Summarize,
                from_provider: "primary".to_string(),
                to_provider: "secondary".to_string(),
                reason: "transient".to_string(),
            }
        );
    }

    #[test]
    fn unknown_route_entry_is_rejected() {
        let (p, _) = client(ScriptedProvider::always("primary", Scripted::ok()));
        let err = FallbackController::new(
            [p],
            &routing(&["primary", "ghost"]),
            3,
            ExponentialBackoff::none(),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider { provider, .. } if provider == "ghost"));
    }
}
