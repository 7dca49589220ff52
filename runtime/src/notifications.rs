//! Push planning and the reference notifier.
//!
//! [`plan_pushes`] decides who hears about a lifecycle event outside the app.
//! [`TracingNotifier`] stands in for a mobile push gateway: it resolves
//! device tokens and logs what it would send.

use crate::metrics::PushMetrics;
use rideshare_core::error::RideError;
use rideshare_core::event::RideEvent;
use rideshare_core::notify::{
    DeviceFuture, DeviceRegistry, EmergencyAlert, Notifier, PushNotification,
};
use rideshare_core::types::{Ride, UserId};
use serde_json::json;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Builds the push notifications for `event`, one per audience.
///
/// `RideCreated` has no audience: there is no index of users near a ride.
/// A confirmation tells promoted riders and, separately, the riders turned
/// away because the seats ran out.
#[must_use]
pub fn plan_pushes(event: &RideEvent) -> Vec<PushNotification> {
    let ride = event.ride();
    let planned = match event {
        RideEvent::RideCreated { .. } => Vec::new(),
        RideEvent::ParticipantJoined { .. } => vec![notification(
            ride,
            "ride_request",
            vec![ride.host_id],
            "New Ride Request",
            format!("Someone wants to join your ride '{}'", ride.title),
        )],
        RideEvent::RideConfirmed {
            confirmed, declined, ..
        } => vec![
            notification(
                ride,
                "ride_confirmed",
                confirmed.clone(),
                "Ride Confirmed!",
                format!("Your ride '{}' has been confirmed", ride.title),
            ),
            notification(
                ride,
                "ride_declined",
                declined.clone(),
                "Ride Request Declined",
                format!("The ride '{}' filled up before your request was accepted", ride.title),
            ),
        ],
        RideEvent::RideStarted { riders, .. } => vec![notification(
            ride,
            "ride_started",
            with_host(ride, riders),
            "Ride Started",
            format!("Your ride '{}' has started. Safe journey!", ride.title),
        )],
        RideEvent::RideCompleted { riders, .. } => vec![notification(
            ride,
            "ride_completed",
            with_host(ride, riders),
            "Ride Completed",
            format!(
                "Your ride '{}' is complete. Please rate your experience.",
                ride.title
            ),
        )],
        RideEvent::RideCancelled { riders, .. } => vec![notification(
            ride,
            "ride_cancelled",
            riders.clone(),
            "Ride Cancelled",
            format!("Your ride '{}' has been cancelled", ride.title),
        )],
    };

    planned.into_iter().flatten().collect()
}

fn notification(
    ride: &Ride,
    kind: &str,
    recipients: Vec<UserId>,
    title: &str,
    body: String,
) -> Option<PushNotification> {
    if recipients.is_empty() {
        return None;
    }
    Some(PushNotification {
        user_ids: recipients,
        title: title.to_string(),
        body,
        data: json!({
            "type": kind,
            "ride_id": ride.id,
            "status": ride.status,
        }),
    })
}

fn with_host(ride: &Ride, riders: &[UserId]) -> Vec<UserId> {
    std::iter::once(ride.host_id)
        .chain(riders.iter().copied())
        .collect()
}

// ============================================================================
// Device registry
// ============================================================================

/// Process-local device token table.
#[derive(Debug, Default)]
pub struct InMemoryDeviceRegistry {
    tokens: RwLock<HashMap<UserId, String>>,
}

impl InMemoryDeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceRegistry for InMemoryDeviceRegistry {
    fn register(&self, user: UserId, token: String) -> DeviceFuture<'_, ()> {
        Box::pin(async move {
            if token.trim().is_empty() {
                return Err(RideError::Validation("device token must not be empty".to_string()));
            }
            self.tokens.write().await.insert(user, token);
            Ok(())
        })
    }

    fn unregister(&self, user: UserId) -> DeviceFuture<'_, bool> {
        Box::pin(async move { Ok(self.tokens.write().await.remove(&user).is_some()) })
    }

    fn tokens_for<'a>(&'a self, users: &'a [UserId]) -> DeviceFuture<'a, Vec<(UserId, String)>> {
        Box::pin(async move {
            let tokens = self.tokens.read().await;
            Ok(users
                .iter()
                .filter_map(|user| tokens.get(user).map(|t| (*user, t.clone())))
                .collect())
        })
    }
}

// ============================================================================
// Notifier
// ============================================================================

/// Notifier that logs instead of calling a push gateway.
#[derive(Clone)]
pub struct TracingNotifier {
    devices: Arc<dyn DeviceRegistry>,
}

impl TracingNotifier {
    /// Creates a notifier resolving tokens from `devices`.
    #[must_use]
    pub fn new(devices: Arc<dyn DeviceRegistry>) -> Self {
        Self { devices }
    }
}

impl Notifier for TracingNotifier {
    fn push(&self, notification: PushNotification) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            PushMetrics::record_push("ride");
            let tokens = match self.devices.tokens_for(&notification.user_ids).await {
                Ok(tokens) => tokens,
                Err(error) => {
                    tracing::warn!(error = %error, "Device token lookup failed");
                    return;
                }
            };

            tracing::info!(
                title = %notification.title,
                recipients = notification.user_ids.len(),
                devices = tokens.len(),
                "Push notification queued"
            );
            for (user, _token) in &tokens {
                tracing::debug!(user_id = %user, body = %notification.body, "Push delivered to device");
            }
        })
    }

    fn emergency(&self, alert: EmergencyAlert) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            PushMetrics::record_push("emergency");
            tracing::error!(
                ride_id = %alert.ride_id,
                user_id = %alert.user_id,
                lat = alert.location.lat,
                lng = alert.location.lng,
                raised_at = %alert.raised_at,
                "EMERGENCY: SOS alert triggered"
            );
        })
    }
}
