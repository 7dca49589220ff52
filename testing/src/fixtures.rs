//! Canonical users, rides and instants shared by tests across the workspace.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rideshare_core::types::{
    GeoPoint, NewRide, Ride, RideId, RideRecord, Role, User, UserId,
};

/// The ride host in most scenarios.
pub const HOST: UserId = UserId::new(1);
/// First rider.
pub const ALICE: UserId = UserId::new(2);
/// Second rider.
pub const BOB: UserId = UserId::new(3);
/// Third rider.
pub const CAROL: UserId = UserId::new(4);
/// An administrator.
pub const ADMIN: UserId = UserId::new(99);

/// Pickup point used by [`new_ride`] (HSR Layout, Bengaluru).
pub const PICKUP: GeoPoint = GeoPoint {
    lat: 12.9116,
    lng: 77.6389,
};

/// Drop-off point used by [`new_ride`] (Kempegowda airport).
pub const DROP_OFF: GeoPoint = GeoPoint {
    lat: 13.1986,
    lng: 77.7066,
};

/// The instant every fixture is stamped with: 2025-01-01 00:00:00 UTC.
#[must_use]
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

/// A host-capable user.
#[must_use]
pub fn host(id: UserId) -> User {
    User::new(id, [Role::Rider, Role::Host])
}

/// A plain rider.
#[must_use]
pub fn rider(id: UserId) -> User {
    User::new(id, [Role::Rider])
}

/// An administrator.
#[must_use]
pub fn admin(id: UserId) -> User {
    User::new(id, [Role::Admin])
}

/// A valid creation request offering `seats` seats, departing an hour after
/// [`epoch`].
#[must_use]
pub fn new_ride(seats: u32) -> NewRide {
    new_ride_at(PICKUP, seats)
}

/// Like [`new_ride`], starting at `start`.
#[must_use]
pub fn new_ride_at(start: GeoPoint, seats: u32) -> NewRide {
    NewRide {
        title: "Airport run".to_string(),
        description: Some("Two bags max".to_string()),
        start,
        end: DROP_OFF,
        start_address: "HSR Layout".to_string(),
        end_address: "Kempegowda International Airport".to_string(),
        departure_time: epoch() + Duration::hours(1),
        max_passengers: seats,
    }
}

/// A freshly created ride.
#[must_use]
pub fn ride(id: RideId, host: UserId, seats: u32) -> Ride {
    Ride::new(id, host, new_ride(seats), epoch())
}

/// A freshly created ride hosted by [`HOST`], with no participants.
#[must_use]
pub fn record(id: RideId, seats: u32) -> RideRecord {
    RideRecord::new(ride(id, HOST, seats))
}
