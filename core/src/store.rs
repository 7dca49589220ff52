//! Ride registry contract.
//!
//! The registry is owned by an external store. The core only relies on the
//! guarantees spelled out on [`RideStore::atomic`]: a mutation runs with
//! exclusive access to one ride record and is committed only if it returns
//! `Ok`. That single primitive is what keeps the capacity check and the
//! participant insert in `join` (and the batch promotion in `confirm`) from
//! interleaving with other writers on the same ride.

use crate::error::RideError;
use crate::event::RideEvent;
use crate::types::{Ride, RideId, RideRecord, RideStatus, UserId};
use std::future::Future;
use std::pin::Pin;

/// A conditional change to one ride record.
///
/// Receives a working copy of the record. Returning `Err` discards every
/// change made to the copy.
pub type Mutation = Box<dyn FnOnce(&mut RideRecord) -> Result<RideEvent, RideError> + Send>;

/// Builds a ride once the store has allocated its id.
pub type RideFactory = Box<dyn FnOnce(RideId) -> Ride + Send>;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RideError>> + Send + 'a>>;

/// Persistence for rides and their participants.
///
/// # Atomicity contract
///
/// - [`atomic`](Self::atomic) is linearizable per ride: two mutations on the
///   same ride never observe each other's intermediate state, and a failed
///   mutation leaves the stored record untouched.
/// - Mutations on different rides may run in parallel.
/// - Reads return committed state only.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so handlers can share an
/// `Arc<dyn RideStore>`.
pub trait RideStore: Send + Sync {
    /// Allocates an id and stores the ride built by `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Storage`] if the store cannot persist the ride.
    fn insert(&self, factory: RideFactory) -> StoreFuture<'_, Ride>;

    /// Loads a ride with its participants.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Storage`] on collaborator failure. A missing ride
    /// is `Ok(None)`.
    fn get(&self, id: RideId) -> StoreFuture<'_, Option<RideRecord>>;

    /// Runs `mutation` against ride `id` with exclusive access and commits the
    /// result only on success.
    ///
    /// Returns the committed record alongside the event the mutation produced.
    ///
    /// # Errors
    ///
    /// - [`RideError::NotFound`] if the ride does not exist
    /// - whatever the mutation returns, with nothing committed
    fn atomic(&self, id: RideId, mutation: Mutation) -> StoreFuture<'_, (RideRecord, RideEvent)>;

    /// Lists rides whose status is one of `statuses`.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Storage`] on collaborator failure.
    fn rides_with_status<'a>(&'a self, statuses: &'a [RideStatus]) -> StoreFuture<'a, Vec<Ride>>;

    /// Lists rides the user hosts or has a participant record on.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Storage`] on collaborator failure.
    fn rides_for_user(&self, user: UserId) -> StoreFuture<'_, Vec<RideRecord>>;
}
