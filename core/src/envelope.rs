//! Real-time channel vocabulary.
//!
//! Outbound frames are [`Envelope`]s: a `type` tag, the variant's fields and a
//! `timestamp`, flattened into one JSON object. Inbound frames are parsed into
//! the exhaustive [`ClientMessage`] enum; anything that does not parse is
//! reported back to the sender as an [`InboundError`] and never closes the
//! connection.
//!
//! # Example
//!
//! ```
//! use rideshare_core::envelope::{ClientMessage, parse_client_message};
//! use rideshare_core::types::RideId;
//!
//! let msg = parse_client_message(r#"{"type":"subscribe_ride","ride_id":42}"#);
//! assert_eq!(msg, Ok(ClientMessage::SubscribeRide { ride_id: RideId::new(42) }));
//! ```

use crate::error::RideError;
use crate::event::RideEvent;
use crate::types::{GeoPoint, Ride, RideId, RideStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Payloads
// ============================================================================

/// A position report sent by a client during a ride.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lng: f64,
    /// Course over ground in degrees
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Ground speed in m/s
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Horizontal accuracy in metres
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl LocationFix {
    /// The fix as a bare point.
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }

    /// Checks coordinate ranges.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Validation`] for out-of-range coordinates.
    pub fn validate(&self) -> Result<(), RideError> {
        self.point().validate()
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Message body, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EnvelopeBody {
    /// Greeting sent right after a connection is registered
    ConnectionEstablished {
        /// Human-readable greeting
        message: String,
    },
    /// Subscribe acknowledgement
    RideSubscription {
        /// Ride subscribed to
        ride_id: RideId,
        /// Human-readable acknowledgement
        message: String,
    },
    /// Unsubscribe acknowledgement
    RideUnsubscription {
        /// Ride unsubscribed from
        ride_id: RideId,
        /// Human-readable acknowledgement
        message: String,
    },
    /// A ride changed status
    RideStatusUpdate {
        /// Ride that changed
        ride_id: RideId,
        /// Status after the change
        new_status: RideStatus,
        /// Full ride after the change
        ride_data: Ride,
        /// Riders affected by the change
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        riders: Vec<UserId>,
    },
    /// A rider asked to join
    NewRideRequest {
        /// Ride joined
        ride_id: RideId,
        /// Joining rider
        requester: UserId,
        /// Ride status after the join
        ride_status: RideStatus,
    },
    /// Relayed position report
    LocationUpdate {
        /// Ride the report is about
        ride_id: RideId,
        /// Reporting user
        user_id: UserId,
        /// Reported position
        location: LocationFix,
    },
    /// Relayed SOS
    EmergencyAlert {
        /// Ride the alert is about
        ride_id: RideId,
        /// User who raised the alert
        user_id: UserId,
        /// Where the alert was raised
        location: LocationFix,
        /// Human-readable alert text
        message: String,
    },
    /// Reply to an inbound frame that could not be handled
    Error {
        /// What went wrong
        message: String,
    },
    /// Heartbeat reply
    Pong,
}

impl EnvelopeBody {
    /// Greeting for a freshly registered connection.
    #[must_use]
    pub fn connection_established() -> Self {
        Self::ConnectionEstablished {
            message: "Connected to real-time ride updates".to_string(),
        }
    }

    /// Subscribe acknowledgement for `ride_id`.
    #[must_use]
    pub fn subscribed(ride_id: RideId) -> Self {
        Self::RideSubscription {
            ride_id,
            message: format!("Subscribed to ride {ride_id} updates"),
        }
    }

    /// Unsubscribe acknowledgement for `ride_id`.
    #[must_use]
    pub fn unsubscribed(ride_id: RideId) -> Self {
        Self::RideUnsubscription {
            ride_id,
            message: format!("Unsubscribed from ride {ride_id} updates"),
        }
    }

    /// Error reply with the given text.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Maps a lifecycle event to the body subscribers see.
    #[must_use]
    pub fn from_event(event: &RideEvent) -> Self {
        match event {
            RideEvent::ParticipantJoined { ride, participant } => Self::NewRideRequest {
                ride_id: ride.id,
                requester: participant.rider_id,
                ride_status: ride.status,
            },
            RideEvent::RideCreated { ride } => Self::status_update(ride, Vec::new()),
            RideEvent::RideConfirmed { ride, confirmed, .. } => {
                Self::status_update(ride, confirmed.clone())
            }
            RideEvent::RideStarted { ride, riders }
            | RideEvent::RideCompleted { ride, riders }
            | RideEvent::RideCancelled { ride, riders } => Self::status_update(ride, riders.clone()),
        }
    }

    fn status_update(ride: &Ride, riders: Vec<UserId>) -> Self {
        Self::RideStatusUpdate {
            ride_id: ride.id,
            new_status: ride.status,
            ride_data: ride.clone(),
            riders,
        }
    }

    /// The `type` tag as it appears on the wire.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::RideSubscription { .. } => "ride_subscription",
            Self::RideUnsubscription { .. } => "ride_unsubscription",
            Self::RideStatusUpdate { .. } => "ride_status_update",
            Self::NewRideRequest { .. } => "new_ride_request",
            Self::LocationUpdate { .. } => "location_update",
            Self::EmergencyAlert { .. } => "emergency_alert",
            Self::Error { .. } => "error",
            Self::Pong => "pong",
        }
    }
}

/// A timestamped outbound frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Tagged body
    #[serde(flatten)]
    pub body: EnvelopeBody,
    /// When the envelope was stamped
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Stamps `body` with `timestamp`.
    #[must_use]
    pub const fn new(body: EnvelopeBody, timestamp: DateTime<Utc>) -> Self {
        Self { body, timestamp }
    }

    /// Serializes to the JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; only possible for non-finite floats in a
    /// relayed location.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Inbound
// ============================================================================

/// Inbound message kinds accepted on the real-time channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving events for a ride
    SubscribeRide {
        /// Target ride
        ride_id: RideId,
    },
    /// Stop receiving events for a ride
    UnsubscribeRide {
        /// Target ride
        ride_id: RideId,
    },
    /// Relay a position report to ride subscribers
    LocationUpdate {
        /// Target ride
        ride_id: RideId,
        /// Reported position
        location: LocationFix,
    },
    /// Relay an SOS to ride subscribers and the emergency notifier
    EmergencyAlert {
        /// Target ride
        ride_id: RideId,
        /// Where the alert was raised
        location: LocationFix,
    },
    /// Heartbeat
    Ping,
}

const KNOWN_KINDS: [&str; 5] = [
    "subscribe_ride",
    "unsubscribe_ride",
    "location_update",
    "emergency_alert",
    "ping",
];

/// Why an inbound frame was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InboundError {
    /// Frame is not JSON
    #[error("Invalid JSON format")]
    InvalidJson,

    /// Frame is JSON but has no string `type`
    #[error("Missing message type")]
    MissingType,

    /// `type` names nothing we handle
    #[error("Unknown message type: {0}")]
    UnknownType(String),

    /// Known `type` with missing or ill-typed fields
    #[error("Malformed {kind} message: {reason}")]
    Malformed {
        /// The `type` tag
        kind: String,
        /// Field-level detail
        reason: String,
    },
}

/// Parses one inbound text frame.
///
/// # Errors
///
/// Returns an [`InboundError`] describing the first problem found. Location
/// payloads must carry in-range coordinates.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, InboundError> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|_| InboundError::InvalidJson)?;

    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(InboundError::MissingType)?
        .to_string();

    if !KNOWN_KINDS.contains(&kind.as_str()) {
        return Err(InboundError::UnknownType(kind));
    }

    let message: ClientMessage =
        serde_json::from_value(value).map_err(|e| InboundError::Malformed {
            kind: kind.clone(),
            reason: e.to_string(),
        })?;

    match &message {
        ClientMessage::LocationUpdate { location, .. }
        | ClientMessage::EmergencyAlert { location, .. } => {
            location.validate().map_err(|e| InboundError::Malformed {
                kind,
                reason: e.to_string(),
            })?;
        }
        ClientMessage::SubscribeRide { .. }
        | ClientMessage::UnsubscribeRide { .. }
        | ClientMessage::Ping => {}
    }

    Ok(message)
}
