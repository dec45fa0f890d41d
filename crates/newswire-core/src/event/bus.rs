//! Pipeline event fan-out.
//!
//! Rate-limit waits, retries, fallbacks and budget signals go to every
//! subscriber of a `tokio::sync::broadcast` channel and to the debug log, so
//! `--json` runs still leave a trail with `-vv`.

use newswire_types::event::PipelineEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Clones share one channel; a slow subscriber lags without blocking producers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Deliver `event` to current subscribers. Returns how many received it.
    pub fn publish(&self, event: PipelineEvent) -> usize {
        debug!(?event, "Pipeline event");
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("receiver_count", &self.sender.receiver_count())
            .finish()
    }
}

/// Drain everything currently buffered on a receiver.
#[cfg(test)]
pub(crate) fn drain(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> PipelineEvent {
        PipelineEvent::RateLimitWait {
            provider: "openai".to_string(),
            waited_ms: 1_200,
        }
    }

    #[tokio::test]
    async fn publish_and_subscribe_delivers_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(sample_event());

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, PipelineEvent::RateLimitWait { waited_ms: 1_200, .. }));
    }

    #[test]
    fn publish_counts_receivers() {
        let bus = EventBus::new(16);
        assert_eq!(bus.publish(sample_event()), 0);

        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.publish(sample_event()), 2);
        assert_eq!(drain(&mut first).len(), 1);
        assert_eq!(drain(&mut second).len(), 1);
    }

    #[test]
    fn slow_subscriber_lags_instead_of_blocking() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.publish(sample_event());
        }
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(3))
        ));
        assert_eq!(drain(&mut rx).len(), 2);
    }

    #[test]
    fn clone_shares_channel() {
        let bus = EventBus::new(16);
        let bus2 = bus.clone();
        let mut rx = bus.subscribe();

        bus2.publish(sample_event());

        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn debug_impl() {
        let bus = EventBus::new(16);
        let _rx = bus.subscribe();
        let debug = format!("{bus:?}");
        assert!(debug.contains("receiver_count"));
    }
}
