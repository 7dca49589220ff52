//! Error taxonomy shared by the control plane and the real-time channel.

use crate::types::{RideId, RideStatus};
use thiserror::Error;

/// Why a request conflicts with the current ride state.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The ride no longer accepts riders
    #[error("ride is {status} and no longer accepts riders")]
    NotJoinable {
        /// Status at the time of the request
        status: RideStatus,
    },

    /// The host tried to join their own ride
    #[error("host cannot join their own ride")]
    SelfJoin,

    /// The rider already has a record on this ride
    #[error("rider has already joined this ride")]
    DuplicateJoin,

    /// Every seat is taken
    #[error("ride is full ({max_passengers} seats confirmed)")]
    RideFull {
        /// Seats offered
        max_passengers: u32,
    },

    /// The requested transition is not allowed from the current status
    #[error("cannot {action} a ride that is {from}")]
    InvalidTransition {
        /// Status at the time of the request
        from: RideStatus,
        /// Attempted operation
        action: &'static str,
    },

    /// The user already has a helmet verification for this ride
    #[error("helmet verification already exists for this ride")]
    DuplicateHelmetCheck,
}

/// Errors returned by lifecycle operations and collaborators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RideError {
    /// Ride does not exist
    #[error("ride {0} not found")]
    NotFound(RideId),

    /// A record other than a ride does not exist
    #[error("{0} not found")]
    RecordNotFound(String),

    /// Actor lacks the role or ownership for the operation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Request conflicts with the ride state
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictReason),

    /// Malformed input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Credential missing or invalid
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// A collaborator (store, directory) failed
    #[error("storage failure: {0}")]
    Storage(String),
}

impl RideError {
    /// Stable machine-readable code for clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) | Self::RecordNotFound(_) => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unauthenticated(_) => "UNAUTHORIZED",
            Self::Storage(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Returns the conflict reason, if this is a conflict.
    #[must_use]
    pub const fn conflict_reason(&self) -> Option<ConflictReason> {
        match self {
            Self::Conflict(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Result alias for ride operations.
pub type Result<T> = std::result::Result<T, RideError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_messages_name_the_reason() {
        let err = RideError::from(ConflictReason::RideFull { max_passengers: 2 });
        assert_eq!(err.to_string(), "conflict: ride is full (2 seats confirmed)");
        assert_eq!(err.code(), "CONFLICT");

        let err = RideError::from(ConflictReason::InvalidTransition {
            from: RideStatus::Created,
            action: "start",
        });
        assert_eq!(err.to_string(), "conflict: cannot start a ride that is created");
    }

    #[test]
    fn codes_cover_taxonomy() {
        assert_eq!(RideError::NotFound(RideId::new(1)).code(), "NOT_FOUND");
        assert_eq!(
            RideError::RecordNotFound("helmet check 3".into()).code(),
            "NOT_FOUND"
        );
        assert_eq!(RideError::Forbidden(String::new()).code(), "FORBIDDEN");
        assert_eq!(RideError::Validation(String::new()).code(), "VALIDATION_ERROR");
        assert_eq!(RideError::Unauthenticated(String::new()).code(), "UNAUTHORIZED");
    }
}
