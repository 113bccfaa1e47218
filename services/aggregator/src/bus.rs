//! Typed event bus for cross-component flows
//!
//! A broadcast channel of [`CoreEvent`] values. Dispatch is fire-and-forget:
//! a slow or dead subscriber lags and drops on its own receiver, it can
//! never block the publisher or its sibling subscribers.

use tokio::sync::broadcast;
use tracing::trace;
use types::CoreEvent;

/// Shared broadcast bus carrying every core event
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Bus retaining up to `capacity` undelivered events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Publishing with no subscribers is not an error; the event is simply
    /// dropped.
    pub fn publish(&self, event: CoreEvent) {
        trace!(?event, "publishing core event");
        let _ = self.tx.send(event);
    }

    /// Subscribe to all events from this point on
    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_every_subscriber() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(CoreEvent::AdapterRegistered {
            game_id: "g1".to_string(),
        });

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await.unwrap() {
                CoreEvent::AdapterRegistered { game_id } => assert_eq!(game_id, "g1"),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        bus.publish(CoreEvent::AdapterUnregistered {
            game_id: "g1".to_string(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
