use common::domain::{CanonicalLocationEvent, LocationBroadcaster};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Fans canonical events out to every live subscriber
///
/// Backed by a `tokio::sync::broadcast` channel: publishing never blocks, a
/// subscriber that falls more than `capacity` events behind skips what it
/// missed, and each subscriber sees events in publish order.
#[derive(Clone)]
pub struct BroadcastLocationPublisher {
    sender: broadcast::Sender<Arc<CanonicalLocationEvent>>,
}

impl BroadcastLocationPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<CanonicalLocationEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl LocationBroadcaster for BroadcastLocationPublisher {
    fn publish(&self, event: &CanonicalLocationEvent) {
        match self.sender.send(Arc::new(event.clone())) {
            Ok(receivers) => debug!(
                operator_id = event.operator_id,
                receivers, "published location update"
            ),
            Err(_) => debug!(
                operator_id = event.operator_id,
                "no subscribers connected, dropping location update"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn event(operator_id: i64, latitude: f64) -> CanonicalLocationEvent {
        CanonicalLocationEvent {
            operator_id,
            name: "Asha Rao".to_string(),
            external_id: Some("E1".to_string()),
            role: "exec".to_string(),
            region: None,
            area: None,
            latitude,
            longitude: 77.6,
            recorded_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            active: true,
            accuracy: None,
            speed: None,
            heading: None,
            altitude: None,
            battery_level: None,
        }
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_events_in_order() {
        let publisher = BroadcastLocationPublisher::new(16);
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        publisher.publish(&event(1, 10.0));
        publisher.publish(&event(1, 11.0));

        for receiver in [&mut first, &mut second] {
            assert_eq!(receiver.recv().await.unwrap().latitude, 10.0);
            assert_eq!(receiver.recv().await.unwrap().latitude, 11.0);
        }
    }

    #[test]
    fn test_publish_without_subscribers_does_not_fail() {
        let publisher = BroadcastLocationPublisher::new(4);
        assert_eq!(publisher.subscriber_count(), 0);

        publisher.publish(&event(1, 10.0));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_missed_events() {
        let publisher = BroadcastLocationPublisher::new(2);
        let mut slow = publisher.subscribe();

        for latitude in [1.0, 2.0, 3.0, 4.0] {
            publisher.publish(&event(1, latitude));
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(2))));
        assert_eq!(slow.recv().await.unwrap().latitude, 3.0);
        assert_eq!(slow.recv().await.unwrap().latitude, 4.0);
        assert!(matches!(slow.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_dropped_subscriber_is_no_longer_counted() {
        let publisher = BroadcastLocationPublisher::new(4);
        let receiver = publisher.subscribe();
        assert_eq!(publisher.subscriber_count(), 1);

        drop(receiver);

        assert_eq!(publisher.subscriber_count(), 0);
    }
}
