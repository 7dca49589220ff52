//! Mock implementations of the collaborator traits.
//!
//! Every mock records what it was asked to do so tests can assert on it
//! afterwards. Interior state sits behind `std::sync::Mutex`; none of these
//! locks is held across an `.await`.

#![allow(clippy::module_name_repetitions)]

use crate::fixtures;
use chrono::{DateTime, Utc};
use rideshare_core::auth::{AuthFuture, Authenticator, Subject, UserDirectory};
use rideshare_core::envelope::Envelope;
use rideshare_core::environment::Clock;
use rideshare_core::error::RideError;
use rideshare_core::event::{RideEvent, RideEventSink};
use rideshare_core::notify::{EmergencyAlert, Notifier, PushNotification};
use rideshare_core::transport::{CloseReason, Transport, TransportError};
use rideshare_core::types::User;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Clock
// ============================================================================

/// Fixed clock for deterministic tests
///
/// Always returns the same time, making tests reproducible.
///
/// # Example
///
/// ```
/// use rideshare_testing::mocks::FixedClock;
/// use rideshare_core::environment::Clock;
/// use chrono::Utc;
///
/// let clock = FixedClock::new(Utc::now());
/// let time1 = clock.now();
/// let time2 = clock.now();
/// assert_eq!(time1, time2); // Always the same!
/// ```
#[derive(Debug, Clone)]
pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    /// Create a new fixed clock with the given time
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(fixtures::epoch())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
#[must_use]
pub fn test_clock() -> FixedClock {
    FixedClock::default()
}

// ============================================================================
// Transport
// ============================================================================

/// Transport that keeps every envelope it is handed as JSON.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<serde_json::Value>>,
    closed: Mutex<Option<CloseReason>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    /// Creates a healthy transport, ready to hand to a registry.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes every later send fail as if the peer had vanished.
    pub fn fail_sends(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Everything sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<serde_json::Value> {
        lock(&self.sent).clone()
    }

    /// The `type` of every envelope sent so far, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        lock(&self.sent)
            .iter()
            .filter_map(|value| value["type"].as_str().map(ToString::to_string))
            .collect()
    }

    /// Envelopes of one `type`, in order.
    #[must_use]
    pub fn of_kind(&self, kind: &str) -> Vec<serde_json::Value> {
        lock(&self.sent)
            .iter()
            .filter(|value| value["type"] == kind)
            .cloned()
            .collect()
    }

    /// Why the transport was closed, if it was.
    #[must_use]
    pub fn closed(&self) -> Option<CloseReason> {
        *lock(&self.closed)
    }
}

impl Transport for RecordingTransport {
    fn send(&self, envelope: &Envelope) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) || lock(&self.closed).is_some() {
            return Err(TransportError::Closed);
        }
        let value =
            serde_json::to_value(envelope).map_err(|e| TransportError::Encode(e.to_string()))?;
        lock(&self.sent).push(value);
        Ok(())
    }

    fn close(&self, reason: CloseReason) {
        lock(&self.closed).get_or_insert(reason);
    }
}

// ============================================================================
// Notifier
// ============================================================================

/// Notifier that records pushes and emergencies.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pushes: Mutex<Vec<PushNotification>>,
    emergencies: Mutex<Vec<EmergencyAlert>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes received so far.
    #[must_use]
    pub fn pushes(&self) -> Vec<PushNotification> {
        lock(&self.pushes).clone()
    }

    /// Emergencies received so far.
    #[must_use]
    pub fn emergencies(&self) -> Vec<EmergencyAlert> {
        lock(&self.emergencies).clone()
    }

    /// Waits until at least `count` pushes arrived or `timeout` elapsed, then
    /// returns what arrived. Pushes are sent from detached tasks.
    pub async fn wait_for_pushes(&self, count: usize, timeout: Duration) -> Vec<PushNotification> {
        wait_until(timeout, || self.pushes().len() >= count).await;
        self.pushes()
    }

    /// Waits until at least `count` emergencies arrived or `timeout` elapsed.
    pub async fn wait_for_emergencies(
        &self,
        count: usize,
        timeout: Duration,
    ) -> Vec<EmergencyAlert> {
        wait_until(timeout, || self.emergencies().len() >= count).await;
        self.emergencies()
    }
}

async fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) {
    let poll = async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    let _ = tokio::time::timeout(timeout, poll).await;
}

impl Notifier for RecordingNotifier {
    fn push(&self, notification: PushNotification) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move { lock(&self.pushes).push(notification) })
    }

    fn emergency(&self, alert: EmergencyAlert) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move { lock(&self.emergencies).push(alert) })
    }
}

// ============================================================================
// Event sink
// ============================================================================

/// Event sink that keeps every published event.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<RideEvent>>,
}

impl RecordingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events published so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<RideEvent> {
        lock(&self.events).clone()
    }

    /// Names of the events published so far.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        lock(&self.events).iter().map(RideEvent::name).collect()
    }
}

impl RideEventSink for RecordingEventSink {
    fn publish(&self, event: RideEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move { lock(&self.events).push(event) })
    }
}

// ============================================================================
// Identity
// ============================================================================

/// Authenticator backed by a fixed token table.
#[derive(Debug, Default, Clone)]
pub struct StaticAuthenticator {
    tokens: HashMap<String, Subject>,
}

impl StaticAuthenticator {
    /// Creates an authenticator that accepts nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `token` as `subject_id`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, subject_id: impl Into<String>) -> Self {
        self.tokens.insert(
            token.into(),
            Subject {
                subject_id: subject_id.into(),
                email: None,
            },
        );
        self
    }
}

impl Authenticator for StaticAuthenticator {
    fn verify<'a>(&'a self, credential: &'a str) -> AuthFuture<'a, Subject> {
        Box::pin(async move {
            self.tokens
                .get(credential)
                .cloned()
                .ok_or_else(|| RideError::Unauthenticated("invalid token".to_string()))
        })
    }
}

/// User directory backed by a fixed table keyed by subject id.
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserDirectory {
    users: HashMap<String, User>,
}

impl InMemoryUserDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `user` under `subject_id`.
    #[must_use]
    pub fn with_user(mut self, subject_id: impl Into<String>, user: User) -> Self {
        self.users.insert(subject_id.into(), user);
        self
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn resolve<'a>(&'a self, subject: &'a Subject) -> AuthFuture<'a, User> {
        Box::pin(async move {
            self.users.get(&subject.subject_id).cloned().ok_or_else(|| {
                RideError::Unauthenticated(format!("no user for subject {}", subject.subject_id))
            })
        })
    }
}
