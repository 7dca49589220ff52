//! Push-notification and emergency collaborators.
//!
//! Delivery to mobile push services is external. The core plans *what* to
//! send and hands it to a [`Notifier`]; nothing waits on the outcome.

use crate::envelope::LocationFix;
use crate::error::RideError;
use crate::types::{RideId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// A push message addressed to a set of users.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushNotification {
    /// Recipients
    pub user_ids: Vec<UserId>,
    /// Notification title
    pub title: String,
    /// Notification body
    pub body: String,
    /// Extra key/value data for the client app
    pub data: serde_json::Value,
}

/// An SOS raised by a user during a ride.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAlert {
    /// Ride the alert concerns
    pub ride_id: RideId,
    /// User who raised it
    pub user_id: UserId,
    /// Reported position
    pub location: LocationFix,
    /// When the server received it
    pub raised_at: DateTime<Utc>,
}

/// Best-effort outbound notifications.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the runtime can hold an
/// `Arc<dyn Notifier>`.
pub trait Notifier: Send + Sync {
    /// Sends a push notification. Failures are the notifier's to log.
    fn push(&self, notification: PushNotification) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Escalates an SOS to the emergency channel.
    fn emergency(&self, alert: EmergencyAlert) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Boxed future returned by [`DeviceRegistry`] operations.
pub type DeviceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RideError>> + Send + 'a>>;

/// Push-token storage, one token per user.
pub trait DeviceRegistry: Send + Sync {
    /// Stores `token` for `user`, replacing any previous token.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Storage`] on backend failure.
    fn register(&self, user: UserId, token: String) -> DeviceFuture<'_, ()>;

    /// Forgets the token for `user`. Returns whether one was stored.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Storage`] on backend failure.
    fn unregister(&self, user: UserId) -> DeviceFuture<'_, bool>;

    /// Tokens for the subset of `users` that registered one.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Storage`] on backend failure.
    fn tokens_for<'a>(&'a self, users: &'a [UserId]) -> DeviceFuture<'a, Vec<(UserId, String)>>;
}
