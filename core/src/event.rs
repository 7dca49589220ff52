//! Lifecycle events and the sink they are emitted into.
//!
//! Every successful mutating lifecycle operation produces exactly one
//! [`RideEvent`]. The controller hands it to a [`RideEventSink`] after the
//! store has committed, so sinks never observe state that was rolled back.

use crate::types::{Participant, Ride, RideId, RideStatus, UserId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// A fact about a ride that subscribers are told about.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RideEvent {
    /// A host offered a new ride
    RideCreated {
        /// The new ride
        ride: Ride,
    },
    /// A rider asked to join
    ParticipantJoined {
        /// Ride after the join (status may have moved to `Requested`)
        ride: Ride,
        /// The new participant record
        participant: Participant,
    },
    /// The host accepted pending riders
    RideConfirmed {
        /// Ride after confirmation
        ride: Ride,
        /// Riders promoted to `Confirmed`
        confirmed: Vec<UserId>,
        /// Pending riders turned away because seats ran out
        declined: Vec<UserId>,
    },
    /// The ride began
    RideStarted {
        /// Ride after the transition
        ride: Ride,
        /// Riders holding a seat
        riders: Vec<UserId>,
    },
    /// The ride finished
    RideCompleted {
        /// Ride after the transition
        ride: Ride,
        /// Riders holding a seat
        riders: Vec<UserId>,
    },
    /// The ride was called off
    RideCancelled {
        /// Ride after cancellation
        ride: Ride,
        /// Riders whose records were cancelled
        riders: Vec<UserId>,
    },
}

impl RideEvent {
    /// The ride this event is about.
    #[must_use]
    pub const fn ride(&self) -> &Ride {
        match self {
            Self::RideCreated { ride }
            | Self::ParticipantJoined { ride, .. }
            | Self::RideConfirmed { ride, .. }
            | Self::RideStarted { ride, .. }
            | Self::RideCompleted { ride, .. }
            | Self::RideCancelled { ride, .. } => ride,
        }
    }

    /// Shorthand for `self.ride().id`.
    #[must_use]
    pub const fn ride_id(&self) -> RideId {
        self.ride().id
    }

    /// Ride status after the event.
    #[must_use]
    pub const fn status(&self) -> RideStatus {
        self.ride().status
    }

    /// Event name, used for logging and metrics labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RideCreated { .. } => "ride_created",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::RideConfirmed { .. } => "ride_confirmed",
            Self::RideStarted { .. } => "ride_started",
            Self::RideCompleted { .. } => "ride_completed",
            Self::RideCancelled { .. } => "ride_cancelled",
        }
    }
}

/// Receiver of committed lifecycle events.
///
/// Publishing is fire-and-forget from the controller's point of view: a sink
/// has no way to fail the operation that produced the event.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the controller can hold an
/// `Arc<dyn RideEventSink>`.
pub trait RideEventSink: Send + Sync {
    /// Deliver one event.
    fn publish(&self, event: RideEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardEvents;

impl RideEventSink for DiscardEvents {
    fn publish(&self, _event: RideEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async {})
    }
}
