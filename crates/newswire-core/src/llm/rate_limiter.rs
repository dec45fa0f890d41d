//! Per-provider sliding-window rate limiter.
//!
//! Each provider owns one window of recent admission times behind its own
//! async mutex. `acquire` holds that mutex while it waits, so admissions for
//! a provider are strictly serialized and the trailing-window count can never
//! be exceeded by racing callers. Providers never contend with each other.
//!
//! This is a throttle: callers are delayed, never rejected.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use newswire_types::event::PipelineEvent;
use newswire_types::llm::ProviderProfile;

use crate::event::bus::EventBus;

/// Default trailing window for requests-per-minute limits.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Proof of admission, with how long the caller was held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePermit {
    pub waited: Duration,
}

#[derive(Debug)]
struct RateWindow {
    limit: u32,
    admitted: VecDeque<Instant>,
}

impl RateWindow {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.admitted.front() {
            if now.duration_since(*oldest) >= window {
                self.admitted.pop_front();
            } else {
                break;
            }
        }
    }

    /// When the next slot opens, or `None` if one is free now.
    fn next_slot(&self, window: Duration) -> Option<Instant> {
        if (self.admitted.len() as u32) < self.limit {
            return None;
        }
        self.admitted.front().map(|oldest| *oldest + window)
    }
}

pub struct RateLimiter {
    windows: HashMap<String, Arc<Mutex<RateWindow>>>,
    window: Duration,
    events: Option<EventBus>,
}

impl RateLimiter {
    /// Build one window per `(provider, requests_per_window)` pair.
    ///
    /// A limit of zero is treated as one; config validation rejects it first.
    pub fn new(limits: impl IntoIterator<Item = (String, u32)>) -> Self {
        let windows = limits
            .into_iter()
            .map(|(name, limit)| {
                let window = RateWindow {
                    limit: limit.max(1),
                    admitted: VecDeque::with_capacity(limit as usize),
                };
                (name, Arc::new(Mutex::new(window)))
            })
            .collect();
        Self {
            windows,
            window: DEFAULT_WINDOW,
            events: None,
        }
    }

    pub fn from_profiles<'a>(profiles: impl IntoIterator<Item = &'a ProviderProfile>) -> Self {
        Self::new(
            profiles
                .into_iter()
                .map(|p| (p.name.clone(), p.requests_per_minute)),
        )
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Wait until `provider` has a free slot in the trailing window, then
    /// claim it.
    ///
    /// Providers without a configured limit are admitted immediately.
    pub async fn acquire(&self, provider: &str) -> RatePermit {
        let Some(window) = self.windows.get(provider) else {
            debug!(provider, "No rate limit configured, admitting");
            return RatePermit {
                waited: Duration::ZERO,
            };
        };

        let started = Instant::now();
        let mut state = window.lock().await;
        loop {
            let now = Instant::now();
            state.prune(now, self.window);
            match state.next_slot(self.window) {
                None => {
                    state.admitted.push_back(now);
                    break;
                }
                Some(wake_at) => {
                    debug!(
                        provider,
                        in_window = state.admitted.len(),
                        wait_ms = wake_at.duration_since(now).as_millis() as u64,
                        "Rate window full, waiting for oldest admission to expire"
                    );
                    tokio::time::sleep_until(wake_at).await;
                }
            }
        }
        drop(state);

        let waited = started.elapsed();
        if !waited.is_zero() {
            let waited_ms = waited.as_millis() as u64;
            info!(provider, waited_ms, "Rate limit wait");
            if let Some(events) = &self.events {
                events.publish(PipelineEvent::RateLimitWait {
                    provider: provider.to_string(),
                    waited_ms,
                });
            }
        }
        RatePermit { waited }
    }

    /// Admissions currently counted in `provider`'s trailing window.
    pub async fn in_window(&self, provider: &str) -> usize {
        match self.windows.get(provider) {
            Some(window) => {
                let mut state = window.lock().await;
                state.prune(Instant::now(), self.window);
                state.admitted.len()
            }
            None => 0,
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("providers", &self.windows.keys().collect::<Vec<_>>())
            .field("window", &self.window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::bus::drain;

    fn limiter(limit: u32) -> RateLimiter {
        RateLimiter::new([("a".to_string(), limit), ("b".to_string(), limit)])
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_limit_without_waiting() {
        let limiter = limiter(3);
        for _ in 0..3 {
            assert_eq!(limiter.acquire("a").await.waited, Duration::ZERO);
        }
        assert_eq!(limiter.in_window("a").await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_exactly_until_oldest_expires() {
        let limiter = limiter(2);
        limiter.acquire("a").await;
        tokio::time::advance(Duration::from_secs(10)).await;
        limiter.acquire("a").await;

        // Oldest admission was 10s ago, so the next slot opens in 50s.
        let permit = limiter.acquire("a").await;
        assert_eq!(permit.waited, Duration::from_secs(50));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_admissions_free_slots() {
        let limiter = limiter(1);
        limiter.acquire("a").await;
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.acquire("a").await.waited, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn providers_do_not_share_windows() {
        let limiter = limiter(1);
        limiter.acquire("a").await;
        assert_eq!(limiter.acquire("b").await.waited, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_provider_is_not_throttled() {
        let limiter = limiter(1);
        for _ in 0..5 {
            assert_eq!(limiter.acquire("zzz").await.waited, Duration::ZERO);
        }
        assert_eq!(limiter.in_window("zzz").await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_never_exceed_window() {
        let limit = 3usize;
        let limiter = Arc::new(limiter(limit as u32));
        let mut handles = Vec::new();
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire("a").await;
                Instant::now()
            }));
        }

        let mut admitted = Vec::new();
        for handle in handles {
            admitted.push(handle.await.unwrap());
        }
        admitted.sort();

        // Any `limit + 1` consecutive admissions must span a full window.
        for pair in admitted.windows(limit + 1) {
            let span = pair[limit].duration_since(pair[0]);
            assert!(span >= DEFAULT_WINDOW, "admissions too dense: {span:?}");
        }
        // 10 calls at 3/min: batches at 0s, 60s, 120s, 180s.
        let total = admitted[9].duration_since(admitted[0]);
        assert_eq!(total, Duration::from_secs(180));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_publishes_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let limiter = limiter(1)
            .with_window(Duration::from_secs(5))
            .with_event_bus(bus);

        limiter.acquire("a").await;
        limiter.acquire("a").await;

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![PipelineEvent::RateLimitWait {
                provider: "a".to_string(),
                waited_ms: 5_000,
            }]
        );
    }
}
