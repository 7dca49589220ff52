//! Helmet verification before riding.
//!
//! A rider records that they are wearing a helmet for a given ride by
//! submitting a photo reference. One verification exists per (user, ride).
//! Image upload and inspection happen elsewhere; a stored check is marked
//! verified as soon as it is accepted.

use crate::environment::Clock;
use crate::error::RideError;
use crate::store::RideStore;
use crate::types::{RideId, Role, User, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Unique identifier for a helmet check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HelmetCheckId(u64);

impl HelmetCheckId {
    /// Creates a `HelmetCheckId` from its numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HelmetCheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored helmet verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelmetCheck {
    /// Check id
    pub id: HelmetCheckId,
    /// Who submitted it
    pub user_id: UserId,
    /// Ride it applies to
    pub ride_id: RideId,
    /// Where the photo lives
    pub image_url: String,
    /// Whether the photo was accepted
    pub is_verified: bool,
    /// When it was recorded
    pub created_at: DateTime<Utc>,
}

/// Request to record a helmet verification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHelmetCheck {
    /// Ride the check applies to
    pub ride_id: RideId,
    /// Photo reference returned by the upload service
    pub image_url: String,
}

impl NewHelmetCheck {
    /// Rejects a blank image reference.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Validation`].
    pub fn validate(&self) -> Result<(), RideError> {
        if self.image_url.trim().is_empty() {
            return Err(RideError::Validation("image_url must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Boxed future returned by helmet check stores.
pub type HelmetFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RideError>> + Send + 'a>>;

/// Persistence for helmet checks.
///
/// [`insert`](Self::insert) must reject a second check for the same
/// (user, ride) pair atomically with storing the first.
pub trait HelmetCheckStore: Send + Sync {
    /// Stores a verified check for `user`.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateHelmetCheck`] if the user already has a check for
    /// the ride.
    ///
    /// [`DuplicateHelmetCheck`]: crate::error::ConflictReason::DuplicateHelmetCheck
    fn insert(
        &self,
        user: UserId,
        check: NewHelmetCheck,
        now: DateTime<Utc>,
    ) -> HelmetFuture<'_, HelmetCheck>;

    /// The user's check for a ride, if any.
    fn find(&self, user: UserId, ride: RideId) -> HelmetFuture<'_, Option<HelmetCheck>>;

    /// A check by id.
    fn get(&self, id: HelmetCheckId) -> HelmetFuture<'_, Option<HelmetCheck>>;

    /// Every check the user submitted, newest first.
    fn for_user(&self, user: UserId) -> HelmetFuture<'_, Vec<HelmetCheck>>;

    /// Deletes a check. Returns false if it did not exist.
    fn remove(&self, id: HelmetCheckId) -> HelmetFuture<'_, bool>;
}

/// Records and looks up helmet verifications.
#[derive(Clone)]
pub struct HelmetVerifier {
    checks: Arc<dyn HelmetCheckStore>,
    rides: Arc<dyn RideStore>,
    clock: Arc<dyn Clock>,
}

impl HelmetVerifier {
    /// Creates a verifier over the given stores.
    #[must_use]
    pub fn new(
        checks: Arc<dyn HelmetCheckStore>,
        rides: Arc<dyn RideStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            checks,
            rides,
            clock,
        }
    }

    /// Records the actor's helmet verification for a ride.
    ///
    /// # Errors
    ///
    /// - [`RideError::Validation`] for a blank image reference
    /// - [`RideError::NotFound`] if the ride does not exist
    /// - [`RideError::Conflict`] if the actor already verified for this ride
    pub async fn verify(&self, actor: &User, check: NewHelmetCheck) -> Result<HelmetCheck, RideError> {
        check.validate()?;
        if self.rides.get(check.ride_id).await?.is_none() {
            return Err(RideError::NotFound(check.ride_id));
        }

        let stored = self.checks.insert(actor.id, check, self.clock.now()).await?;
        tracing::info!(
            check_id = %stored.id,
            ride_id = %stored.ride_id,
            user_id = %actor.id,
            "Helmet verified"
        );
        Ok(stored)
    }

    /// The actor's verification for a ride.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::RecordNotFound`] if there is none.
    pub async fn check_for(&self, actor: &User, ride: RideId) -> Result<HelmetCheck, RideError> {
        self.checks
            .find(actor.id, ride)
            .await?
            .ok_or_else(|| RideError::RecordNotFound(format!("helmet check for ride {ride}")))
    }

    /// Every verification the actor submitted, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Storage`] on store failure.
    pub async fn checks_of(&self, actor: &User) -> Result<Vec<HelmetCheck>, RideError> {
        self.checks.for_user(actor.id).await
    }

    /// Deletes a verification. Only its owner or an admin may.
    ///
    /// # Errors
    ///
    /// - [`RideError::RecordNotFound`] if the check does not exist
    /// - [`RideError::Forbidden`] for anyone else
    pub async fn delete(&self, actor: &User, id: HelmetCheckId) -> Result<(), RideError> {
        let not_found = || RideError::RecordNotFound(format!("helmet check {id}"));
        let check = self.checks.get(id).await?.ok_or_else(not_found)?;
        if check.user_id != actor.id && !actor.has_role(Role::Admin) {
            return Err(RideError::Forbidden(
                "only the owner or an admin can delete a helmet check".to_string(),
            ));
        }
        if !self.checks.remove(id).await? {
            return Err(not_found());
        }
        tracing::info!(check_id = %id, actor_id = %actor.id, "Helmet check deleted");
        Ok(())
    }
}
