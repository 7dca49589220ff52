//! Live connections and ride subscriptions.
//!
//! [`ConnectionRegistry`] holds at most one connection per user together with
//! the rides that user subscribed to. [`SubscriptionHub`] is the reverse index
//! (ride → users) used to resolve broadcast targets. Both live behind one
//! `tokio::sync::Mutex`, and delivery happens while that lock is held, so a
//! disconnect can never interleave with target resolution for a broadcast.
//!
//! # Architecture
//!
//! ```text
//! socket task ──connect/subscribe/release──┐
//! socket task ──connect/subscribe/release──┤
//!                                          ▼
//!                         ┌──────── Mutex<RegistryInner> ────────┐
//!                         │ connections: user → Connection        │
//!                         │ hub:         ride → {user}            │
//!                         └───────────────────────────────────────┘
//!                                          ▲
//! dispatcher ───────────broadcast(ride)────┘  (sends are non-blocking)
//! ```

use crate::metrics::RealtimeMetrics;
use rideshare_core::envelope::{Envelope, EnvelopeBody};
use rideshare_core::environment::Clock;
use rideshare_core::transport::{CloseReason, Transport};
use rideshare_core::types::{RideId, UserId};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

// ============================================================================
// Subscription hub
// ============================================================================

/// Reverse index from ride to subscribed users.
///
/// Only reachable through the registry lock; it never references a user that
/// has no live connection.
#[derive(Debug, Default)]
pub struct SubscriptionHub {
    by_ride: HashMap<RideId, BTreeSet<UserId>>,
}

impl SubscriptionHub {
    /// Adds `user` to `ride`'s subscribers. Returns false if already present.
    pub fn add(&mut self, ride: RideId, user: UserId) -> bool {
        self.by_ride.entry(ride).or_default().insert(user)
    }

    /// Removes `user` from `ride`'s subscribers. Returns false if absent.
    pub fn remove(&mut self, ride: RideId, user: UserId) -> bool {
        let Some(users) = self.by_ride.get_mut(&ride) else {
            return false;
        };
        let removed = users.remove(&user);
        if users.is_empty() {
            self.by_ride.remove(&ride);
        }
        removed
    }

    /// Removes `user` from each of `rides`.
    pub fn purge<'a>(&mut self, user: UserId, rides: impl IntoIterator<Item = &'a RideId>) {
        for ride in rides {
            self.remove(*ride, user);
        }
    }

    /// Subscribers of `ride`, in ascending user id order.
    #[must_use]
    pub fn subscribers(&self, ride: RideId) -> Vec<UserId> {
        self.by_ride
            .get(&ride)
            .map(|users| users.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Total (ride, user) pairs.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.by_ride.values().map(BTreeSet::len).sum()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Identifies one registration of a user.
///
/// A socket task keeps its handle so that, when it shuts down, it only
/// removes its own registration and never a newer one that superseded it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionHandle {
    /// Connected user
    pub user: UserId,
    id: u64,
}

/// Result of one fan-out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Transports that accepted the envelope
    pub delivered: usize,
    /// Users disconnected because their transport failed
    pub pruned: Vec<UserId>,
}

/// Registry counters exposed by the status endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    /// Live connections
    pub active_connections: usize,
    /// Total (ride, user) subscriptions
    pub total_subscriptions: usize,
}

struct Connection {
    id: u64,
    transport: Arc<dyn Transport>,
    rides: HashSet<RideId>,
    last_seen: Instant,
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<UserId, Connection>,
    hub: SubscriptionHub,
    next_id: u64,
}

impl RegistryInner {
    fn remove(&mut self, user: UserId) -> Option<Connection> {
        let connection = self.connections.remove(&user)?;
        self.hub.purge(user, &connection.rides);
        RealtimeMetrics::record_active(self.connections.len());
        Some(connection)
    }

    /// Sends to one user. A failed send disconnects them.
    fn send(&mut self, user: UserId, envelope: &Envelope) -> bool {
        let Some(connection) = self.connections.get(&user) else {
            return false;
        };
        match connection.transport.send(envelope) {
            Ok(()) => {
                RealtimeMetrics::record_delivered(1);
                true
            }
            Err(error) => {
                tracing::debug!(user_id = %user, error = %error, "Send failed, dropping connection");
                if let Some(connection) = self.remove(user) {
                    connection.transport.close(CloseReason::SendFailed);
                }
                RealtimeMetrics::record_pruned(1);
                false
            }
        }
    }
}

/// The single authority on who is connected and who listens to which ride.
pub struct ConnectionRegistry {
    inner: Mutex<RegistryInner>,
    clock: Arc<dyn Clock>,
}

impl ConnectionRegistry {
    /// Creates an empty registry stamping envelopes with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            clock,
        }
    }

    fn stamp(&self, body: EnvelopeBody) -> Envelope {
        Envelope::new(body, self.clock.now())
    }

    /// Registers `transport` as the live connection for `user`.
    ///
    /// Any previous connection for the user is closed and its subscriptions
    /// are dropped. The new connection starts with no subscriptions and
    /// receives `connection_established`.
    pub async fn connect(&self, user: UserId, transport: Arc<dyn Transport>) -> ConnectionHandle {
        let mut inner = self.inner.lock().await;

        if let Some(previous) = inner.remove(user) {
            previous.transport.close(CloseReason::Superseded);
            tracing::info!(user_id = %user, "Superseded existing connection");
        }

        inner.next_id += 1;
        let handle = ConnectionHandle {
            user,
            id: inner.next_id,
        };
        inner.connections.insert(
            user,
            Connection {
                id: handle.id,
                transport,
                rides: HashSet::new(),
                last_seen: Instant::now(),
            },
        );
        RealtimeMetrics::record_active(inner.connections.len());

        let greeting = self.stamp(EnvelopeBody::connection_established());
        inner.send(user, &greeting);

        tracing::info!(user_id = %user, connections = inner.connections.len(), "Connection registered");
        handle
    }

    /// Removes the user's connection and every subscription. Idempotent.
    ///
    /// Returns true if a connection was removed.
    pub async fn disconnect(&self, user: UserId) -> bool {
        let removed = self.inner.lock().await.remove(user).is_some();
        if removed {
            tracing::info!(user_id = %user, "Connection removed");
        }
        removed
    }

    /// Disconnects `handle` only if it is still the user's current connection.
    pub async fn release(&self, handle: ConnectionHandle) -> bool {
        let mut inner = self.inner.lock().await;
        let current = inner
            .connections
            .get(&handle.user)
            .is_some_and(|c| c.id == handle.id);
        if current {
            inner.remove(handle.user);
            tracing::info!(user_id = %handle.user, "Connection released");
        }
        current
    }

    /// Records inbound activity on `handle`.
    pub async fn touch(&self, handle: ConnectionHandle) {
        let mut inner = self.inner.lock().await;
        if let Some(connection) = inner.connections.get_mut(&handle.user) {
            if connection.id == handle.id {
                connection.last_seen = Instant::now();
            }
        }
    }

    /// Closes and removes connections with no inbound activity for longer
    /// than `max_idle`. Returns the users removed.
    pub async fn reap_idle(&self, max_idle: Duration) -> Vec<UserId> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let idle: Vec<UserId> = inner
            .connections
            .iter()
            .filter(|(_, c)| now.duration_since(c.last_seen) > max_idle)
            .map(|(user, _)| *user)
            .collect();

        for user in &idle {
            if let Some(connection) = inner.remove(*user) {
                connection.transport.close(CloseReason::Idle);
            }
        }
        if !idle.is_empty() {
            RealtimeMetrics::record_pruned(idle.len());
            tracing::info!(count = idle.len(), "Reaped idle connections");
        }
        idle
    }

    /// Adds `ride` to the user's subscriptions and acknowledges it.
    ///
    /// Repeating a subscription is a no-op that is still acknowledged.
    /// Returns false if the user has no live connection.
    pub async fn subscribe(&self, user: UserId, ride: RideId) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(connection) = inner.connections.get_mut(&user) else {
            return false;
        };
        connection.rides.insert(ride);
        inner.hub.add(ride, user);

        let ack = self.stamp(EnvelopeBody::subscribed(ride));
        inner.send(user, &ack);
        tracing::debug!(user_id = %user, ride_id = %ride, "Subscribed");
        true
    }

    /// Removes `ride` from the user's subscriptions and acknowledges it.
    ///
    /// Unsubscribing from a ride the user never subscribed to is a no-op that
    /// is still acknowledged. Returns false if the user has no live connection.
    pub async fn unsubscribe(&self, user: UserId, ride: RideId) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(connection) = inner.connections.get_mut(&user) else {
            return false;
        };
        connection.rides.remove(&ride);
        inner.hub.remove(ride, user);

        let ack = self.stamp(EnvelopeBody::unsubscribed(ride));
        inner.send(user, &ack);
        tracing::debug!(user_id = %user, ride_id = %ride, "Unsubscribed");
        true
    }

    /// Sends one envelope to one user. A failed send disconnects them.
    pub async fn send_to(&self, user: UserId, body: EnvelopeBody) -> bool {
        let envelope = self.stamp(body);
        self.inner.lock().await.send(user, &envelope)
    }

    /// Delivers one envelope to every current subscriber of `ride`.
    ///
    /// Subscribers whose transport fails are disconnected; delivery to the
    /// others continues.
    pub async fn broadcast(&self, ride: RideId, body: EnvelopeBody) -> DeliveryReport {
        let envelope = self.stamp(body);
        let mut inner = self.inner.lock().await;

        let mut report = DeliveryReport::default();
        for user in inner.hub.subscribers(ride) {
            if inner.send(user, &envelope) {
                report.delivered += 1;
            } else {
                report.pruned.push(user);
            }
        }
        report
    }

    /// Current subscribers of `ride`.
    pub async fn subscribers(&self, ride: RideId) -> Vec<UserId> {
        self.inner.lock().await.hub.subscribers(ride)
    }

    /// Rides `user` is subscribed to, or `None` if not connected.
    pub async fn subscriptions_of(&self, user: UserId) -> Option<BTreeSet<RideId>> {
        self.inner
            .lock()
            .await
            .connections
            .get(&user)
            .map(|c| c.rides.iter().copied().collect())
    }

    /// Returns true if `user` has a live connection.
    pub async fn is_connected(&self, user: UserId) -> bool {
        self.inner.lock().await.connections.contains_key(&user)
    }

    /// Connection and subscription counts.
    pub async fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock().await;
        RegistryStats {
            active_connections: inner.connections.len(),
            total_subscriptions: inner.hub.subscription_count(),
        }
    }

    /// Closes every connection. Used at shutdown.
    pub async fn close_all(&self) {
        let mut inner = self.inner.lock().await;
        let users: Vec<UserId> = inner.connections.keys().copied().collect();
        for user in users {
            if let Some(connection) = inner.remove(user) {
                connection.transport.close(CloseReason::Shutdown);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use rideshare_testing::fixtures::{ALICE, BOB};
    use rideshare_testing::mocks::{FixedClock, RecordingTransport};

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(Arc::new(FixedClock::default()))
    }

    const RIDE: RideId = RideId::new(42);

    #[test]
    fn hub_set_semantics() {
        let mut hub = SubscriptionHub::default();
        assert!(hub.add(RIDE, ALICE));
        assert!(!hub.add(RIDE, ALICE));
        assert_eq!(hub.subscribers(RIDE), vec![ALICE]);

        assert!(hub.remove(RIDE, ALICE));
        assert!(!hub.remove(RIDE, ALICE));
        assert!(hub.subscribers(RIDE).is_empty());
        assert_eq!(hub.subscription_count(), 0);
    }

    #[tokio::test]
    async fn connect_greets_and_starts_empty() {
        let registry = registry();
        let transport = RecordingTransport::new();
        registry.connect(ALICE, transport.clone()).await;

        assert_eq!(transport.kinds(), vec!["connection_established"]);
        assert_eq!(registry.subscriptions_of(ALICE).await, Some(BTreeSet::new()));
    }

    #[tokio::test]
    async fn subscribe_twice_equals_once() {
        let registry = registry();
        let transport = RecordingTransport::new();
        registry.connect(ALICE, transport.clone()).await;

        registry.subscribe(ALICE, RIDE).await;
        registry.subscribe(ALICE, RIDE).await;
        assert_eq!(registry.subscribers(RIDE).await, vec![ALICE]);
        assert_eq!(registry.stats().await.total_subscriptions, 1);

        registry.unsubscribe(ALICE, RIDE).await;
        registry.unsubscribe(ALICE, RIDE).await;
        assert!(registry.subscribers(RIDE).await.is_empty());
        assert_eq!(
            transport.kinds(),
            vec![
                "connection_established",
                "ride_subscription",
                "ride_subscription",
                "ride_unsubscription",
                "ride_unsubscription",
            ]
        );
    }

    #[tokio::test]
    async fn reconnect_supersedes_and_resets_subscriptions() {
        let registry = registry();
        let old = RecordingTransport::new();
        let new = RecordingTransport::new();

        let old_handle = registry.connect(ALICE, old.clone()).await;
        registry.subscribe(ALICE, RIDE).await;
        registry.connect(ALICE, new.clone()).await;

        assert_eq!(old.closed(), Some(CloseReason::Superseded));
        assert!(registry.subscribers(RIDE).await.is_empty());

        // The superseded socket shutting down must not evict its replacement.
        assert!(!registry.release(old_handle).await);
        assert!(registry.is_connected(ALICE).await);

        registry.subscribe(ALICE, RIDE).await;
        let report = registry.broadcast(RIDE, EnvelopeBody::Pong).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(old.kinds(), vec!["connection_established", "ride_subscription"]);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_purges() {
        let registry = registry();
        registry.connect(ALICE, RecordingTransport::new()).await;
        registry.connect(BOB, RecordingTransport::new()).await;
        registry.subscribe(ALICE, RIDE).await;
        registry.subscribe(BOB, RIDE).await;

        assert!(registry.disconnect(ALICE).await);
        assert!(!registry.disconnect(ALICE).await);
        assert_eq!(registry.subscribers(RIDE).await, vec![BOB]);
        assert_eq!(registry.stats().await.active_connections, 1);
    }

    #[tokio::test]
    async fn failed_send_prunes_only_that_user() {
        let registry = registry();
        let alice = RecordingTransport::new();
        let bob = RecordingTransport::new();
        registry.connect(ALICE, alice.clone()).await;
        registry.connect(BOB, bob.clone()).await;
        registry.subscribe(ALICE, RIDE).await;
        registry.subscribe(BOB, RIDE).await;

        bob.fail_sends();
        let report = registry.broadcast(RIDE, EnvelopeBody::Pong).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.pruned, vec![BOB]);
        assert_eq!(bob.closed(), Some(CloseReason::SendFailed));
        assert!(!registry.is_connected(BOB).await);
        assert_eq!(registry.subscribers(RIDE).await, vec![ALICE]);
    }

    #[tokio::test]
    async fn subscribe_without_connection_is_ignored() {
        let registry = registry();
        assert!(!registry.subscribe(ALICE, RIDE).await);
        assert!(registry.subscribers(RIDE).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connections_are_reaped() {
        let registry = registry();
        let alice = RecordingTransport::new();
        let bob = RecordingTransport::new();
        registry.connect(ALICE, alice.clone()).await;
        let bob_handle = registry.connect(BOB, bob.clone()).await;

        tokio::time::advance(Duration::from_secs(200)).await;
        registry.touch(bob_handle).await;
        tokio::time::advance(Duration::from_secs(200)).await;

        let reaped = registry.reap_idle(Duration::from_secs(300)).await;
        assert_eq!(reaped, vec![ALICE]);
        assert_eq!(alice.closed(), Some(CloseReason::Idle));
        assert!(registry.is_connected(BOB).await);
    }
}
