//! The [`RideEventSink`] wired into the lifecycle controller.
//!
//! Each committed event is counted, broadcast to live subscribers, and, for
//! each audience it has, turned into a push notification handed to the
//! notifier on a detached task. The controller never waits on push delivery.

use crate::dispatcher::BroadcastDispatcher;
use crate::metrics::RideMetrics;
use crate::notifications::plan_pushes;
use rideshare_core::event::{RideEvent, RideEventSink};
use rideshare_core::notify::Notifier;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Broadcast plus push for every committed event.
#[derive(Clone)]
pub struct EventPipeline {
    dispatcher: Arc<BroadcastDispatcher>,
    notifier: Arc<dyn Notifier>,
}

impl EventPipeline {
    /// Creates a pipeline over `dispatcher` and `notifier`.
    #[must_use]
    pub fn new(dispatcher: Arc<BroadcastDispatcher>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            dispatcher,
            notifier,
        }
    }
}

impl RideEventSink for EventPipeline {
    fn publish(&self, event: RideEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            RideMetrics::record_transition(event.name());
            self.dispatcher.publish(&event).await;

            for push in plan_pushes(&event) {
                let notifier = Arc::clone(&self.notifier);
                tokio::spawn(async move { notifier.push(push).await });
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use crate::registry::ConnectionRegistry;
    use rideshare_core::types::{RideId, RideStatus};
    use rideshare_testing::fixtures::{self, ALICE, HOST};
    use rideshare_testing::mocks::{FixedClock, RecordingNotifier, RecordingTransport};
    use std::time::Duration;

    #[tokio::test]
    async fn confirmed_event_is_broadcast_and_pushed() {
        let clock = Arc::new(FixedClock::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let registry = Arc::new(ConnectionRegistry::new(clock.clone()));
        let dispatcher = Arc::new(BroadcastDispatcher::new(
            registry.clone(),
            notifier.clone(),
            clock,
        ));
        let pipeline = EventPipeline::new(dispatcher, notifier.clone());

        let host = RecordingTransport::new();
        registry.connect(HOST, host.clone()).await;
        registry.subscribe(HOST, RideId::new(1)).await;

        let mut ride = fixtures::ride(RideId::new(1), HOST, 1);
        ride.status = RideStatus::Confirmed;
        pipeline
            .publish(RideEvent::RideConfirmed {
                ride,
                confirmed: vec![ALICE],
                declined: Vec::new(),
            })
            .await;

        let updates = host.of_kind("ride_status_update");
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0]["new_status"], "confirmed");

        let pushes = notifier.wait_for_pushes(1, Duration::from_secs(1)).await;
        assert_eq!(pushes[0].user_ids, vec![ALICE]);
        assert_eq!(pushes[0].title, "Ride Confirmed!");
    }
}
