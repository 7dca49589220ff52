//! Domain types for shared-ride coordination.
//!
//! Value objects (identifiers, geographic points, roles) and the two
//! entities the lifecycle controller owns: [`Ride`] and [`Participant`].

use crate::error::RideError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a ride.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RideId(u64);

impl RideId {
    /// Creates a `RideId` from its numeric value.
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

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user (host, rider or admin).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    /// Creates a `UserId` from its numeric value.
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

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Geography
// ============================================================================

/// A latitude/longitude pair in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees, `-90.0..=90.0`
    pub lat: f64,
    /// Longitude in degrees, `-180.0..=180.0`
    pub lng: f64,
}

impl GeoPoint {
    /// Creates a validated point.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Validation`] if either coordinate is not finite or
    /// lies outside its range.
    pub fn new(lat: f64, lng: f64) -> Result<Self, RideError> {
        let point = Self { lat, lng };
        point.validate()?;
        Ok(point)
    }

    /// Checks coordinate ranges on a point built from untrusted input.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Validation`] if a coordinate is out of range.
    pub fn validate(&self) -> Result<(), RideError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(RideError::Validation(format!(
                "latitude {} is outside -90..=90",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(RideError::Validation(format!(
                "longitude {} is outside -180..=180",
                self.lng
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Users
// ============================================================================

/// Capability a user may hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// May join rides
    Rider,
    /// May offer rides
    #[serde(alias = "bike_host")]
    Host,
    /// Operator with elevated rights
    Admin,
}

/// A user as seen by the core: an id and a capability set.
///
/// Profiles live in the external identity store; nothing else is read here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier
    pub id: UserId,
    /// Capabilities held by the user
    pub roles: BTreeSet<Role>,
}

impl User {
    /// Creates a user with the given capabilities.
    #[must_use]
    pub fn new(id: UserId, roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            id,
            roles: roles.into_iter().collect(),
        }
    }

    /// Returns true if the user holds `role`.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Returns true if the user may create rides.
    #[must_use]
    pub fn can_host(&self) -> bool {
        self.has_role(Role::Host) || self.has_role(Role::Admin)
    }
}

// ============================================================================
// Rides
// ============================================================================

/// Lifecycle state of a ride.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RideStatus {
    /// Offered, nobody has asked to join yet
    Created,
    /// At least one rider asked to join
    Requested,
    /// Host accepted the pending riders
    Confirmed,
    /// Ride in progress
    Ongoing,
    /// Ride finished
    Completed,
    /// Ride called off
    Cancelled,
}

impl RideStatus {
    /// Statuses in which riders may still join.
    pub const JOINABLE: [Self; 2] = [Self::Created, Self::Requested];

    /// Returns true if riders may still join.
    #[must_use]
    pub const fn is_joinable(self) -> bool {
        matches!(self, Self::Created | Self::Requested)
    }

    /// Returns true for `Completed` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Requested => "requested",
            Self::Confirmed => "confirmed",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for creating a ride.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewRide {
    /// Short title shown in search results
    pub title: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Pickup point
    pub start: GeoPoint,
    /// Drop-off point
    pub end: GeoPoint,
    /// Human-readable pickup address
    pub start_address: String,
    /// Human-readable drop-off address
    pub end_address: String,
    /// Planned departure
    pub departure_time: DateTime<Utc>,
    /// Seats offered
    #[serde(default = "default_max_passengers")]
    pub max_passengers: u32,
}

const fn default_max_passengers() -> u32 {
    1
}

impl NewRide {
    /// Validates the request before anything touches the store.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Validation`] describing the first bad field.
    pub fn validate(&self) -> Result<(), RideError> {
        if self.title.trim().is_empty() {
            return Err(RideError::Validation("title must not be empty".to_string()));
        }
        if self.start_address.trim().is_empty() || self.end_address.trim().is_empty() {
            return Err(RideError::Validation(
                "start and end addresses must not be empty".to_string(),
            ));
        }
        if self.max_passengers == 0 {
            return Err(RideError::Validation(
                "max_passengers must be at least 1".to_string(),
            ));
        }
        self.start.validate()?;
        self.end.validate()
    }
}

/// A host-offered shared trip.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    /// Ride identifier
    pub id: RideId,
    /// Offering user
    pub host_id: UserId,
    /// Short title
    pub title: String,
    /// Free-form description
    pub description: Option<String>,
    /// Pickup point
    pub start: GeoPoint,
    /// Drop-off point
    pub end: GeoPoint,
    /// Pickup address
    pub start_address: String,
    /// Drop-off address
    pub end_address: String,
    /// Planned departure
    pub departure_time: DateTime<Utc>,
    /// Seats offered (at least 1)
    pub max_passengers: u32,
    /// Lifecycle state
    pub status: RideStatus,
    /// When the ride was created
    pub created_at: DateTime<Utc>,
    /// When the ride last changed
    pub updated_at: DateTime<Utc>,
}

impl Ride {
    /// Builds a freshly created ride from a validated request.
    #[must_use]
    pub fn new(id: RideId, host_id: UserId, spec: NewRide, now: DateTime<Utc>) -> Self {
        Self {
            id,
            host_id,
            title: spec.title,
            description: spec.description,
            start: spec.start,
            end: spec.end,
            start_address: spec.start_address,
            end_address: spec.end_address,
            departure_time: spec.departure_time,
            max_passengers: spec.max_passengers,
            status: RideStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// Participants
// ============================================================================

/// A rider's standing on one ride.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Waiting for the host
    Requested,
    /// Holding a seat
    Confirmed,
    /// No longer riding
    Cancelled,
}

/// A rider's request/acceptance record for one ride.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Ride joined
    pub ride_id: RideId,
    /// Joining rider
    pub rider_id: UserId,
    /// Current standing
    pub status: ParticipantStatus,
    /// When the join request landed
    pub joined_at: DateTime<Utc>,
}

/// A ride together with all of its participant records.
///
/// This is the unit the store locks and mutates atomically.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RideRecord {
    /// The ride
    pub ride: Ride,
    /// Participant records, in join order
    pub participants: Vec<Participant>,
}

impl RideRecord {
    /// Wraps a new ride with no participants.
    #[must_use]
    pub const fn new(ride: Ride) -> Self {
        Self {
            ride,
            participants: Vec::new(),
        }
    }

    /// Number of participants currently holding a seat.
    #[must_use]
    pub fn confirmed_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.status == ParticipantStatus::Confirmed)
            .count()
    }

    /// Looks up the participant record for `rider`.
    #[must_use]
    pub fn participant(&self, rider: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.rider_id == rider)
    }

    /// Riders whose record has the given status.
    #[must_use]
    pub fn riders_with(&self, status: ParticipantStatus) -> Vec<UserId> {
        self.participants
            .iter()
            .filter(|p| p.status == status)
            .map(|p| p.rider_id)
            .collect()
    }

    /// Returns true if `user` hosts the ride or has any participant record.
    #[must_use]
    pub fn involves(&self, user: UserId) -> bool {
        self.ride.host_id == user || self.participant(user).is_some()
    }
}
