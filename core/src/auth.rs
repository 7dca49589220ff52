//! Identity collaborators.
//!
//! Credential verification and user lookup live outside the core. The
//! real-time endpoint and the control plane both run a credential through
//! [`Authenticator::verify`] and then [`UserDirectory::resolve`] before
//! touching any registry.

use crate::error::RideError;
use crate::types::User;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Identity asserted by a verified credential.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    /// Identity-provider subject (e.g. the `sub` claim)
    pub subject_id: String,
    /// Email on record with the identity provider
    pub email: Option<String>,
}

/// Boxed future returned by identity collaborators.
pub type AuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RideError>> + Send + 'a>>;

/// Turns an opaque bearer credential into a subject.
pub trait Authenticator: Send + Sync {
    /// Verifies `credential`.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Unauthenticated`] for a missing, malformed,
    /// expired or unknown credential.
    fn verify<'a>(&'a self, credential: &'a str) -> AuthFuture<'a, Subject>;
}

/// Maps a verified subject to the user record the core reasons about.
pub trait UserDirectory: Send + Sync {
    /// Looks up the user behind `subject`.
    ///
    /// # Errors
    ///
    /// - [`RideError::Unauthenticated`] if no user is registered for the subject
    /// - [`RideError::Storage`] on directory failure
    fn resolve<'a>(&'a self, subject: &'a Subject) -> AuthFuture<'a, User>;
}
