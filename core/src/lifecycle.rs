//! Ride lifecycle state machine.
//!
//! [`LifecycleController`] is the only writer of rides and participants. Each
//! mutating operation is a pure transition function over a [`RideRecord`]
//! (`join_ride`, `confirm_ride`, ...) run through [`RideStore::atomic`], so
//! the guard checks and the writes they protect land as one unit. On success
//! the controller publishes exactly one [`RideEvent`].
//!
//! # State machine
//!
//! ```text
//! Created --join--> Requested --confirm--> Confirmed --start--> Ongoing --complete--> Completed
//!    \                  \                      \                   \
//!     `------------------`----------------------`-------------------`--cancel--> Cancelled
//! ```
//!
//! # Example
//!
//! ```ignore
//! let controller = LifecycleController::new(store, sink, Arc::new(SystemClock));
//! let ride = controller.create(&host, new_ride).await?;
//! let record = controller.join(&rider, ride.id).await?;
//! assert_eq!(record.ride.status, RideStatus::Requested);
//! ```

use crate::environment::Clock;
use crate::error::{ConflictReason, RideError};
use crate::event::{RideEvent, RideEventSink};
use crate::store::RideStore;
use crate::types::{
    NewRide, Participant, ParticipantStatus, Ride, RideId, RideRecord, RideStatus, Role, User,
    UserId,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{oneshot, Mutex as AsyncMutex, OwnedMutexGuard};

// ============================================================================
// Cancellation policy
// ============================================================================

/// Decides who may cancel a ride.
///
/// Cancellation is reachable from every non-terminal status; the policy only
/// answers the authorization question.
pub trait CancellationPolicy: Send + Sync {
    /// Returns `Ok` if `actor` may cancel `ride`.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Forbidden`] to refuse.
    fn authorize(&self, actor: &User, ride: &Ride) -> Result<(), RideError>;
}

/// The ride's host or any admin may cancel.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostOrAdminCancellation;

impl CancellationPolicy for HostOrAdminCancellation {
    fn authorize(&self, actor: &User, ride: &Ride) -> Result<(), RideError> {
        if actor.id == ride.host_id || actor.has_role(Role::Admin) {
            Ok(())
        } else {
            Err(RideError::Forbidden(
                "only the host or an admin can cancel this ride".to_string(),
            ))
        }
    }
}

// ============================================================================
// Transitions
// ============================================================================

fn require_host(record: &RideRecord, actor: UserId, action: &str) -> Result<(), RideError> {
    if record.ride.host_id == actor {
        Ok(())
    } else {
        Err(RideError::Forbidden(format!(
            "only the host can {action} ride {}",
            record.ride.id
        )))
    }
}

fn require_status(
    record: &RideRecord,
    expected: RideStatus,
    action: &'static str,
) -> Result<(), RideError> {
    if record.ride.status == expected {
        Ok(())
    } else {
        Err(ConflictReason::InvalidTransition {
            from: record.ride.status,
            action,
        }
        .into())
    }
}

fn set_status(record: &mut RideRecord, status: RideStatus, now: DateTime<Utc>) {
    record.ride.status = status;
    record.ride.updated_at = now;
}

/// Adds `rider` as a pending participant.
///
/// Guards run in a fixed order: self-join, duplicate, full, not joinable.
///
/// # Errors
///
/// Returns [`RideError::Conflict`] naming the first guard that failed.
pub fn join_ride(
    record: &mut RideRecord,
    rider: UserId,
    now: DateTime<Utc>,
) -> Result<RideEvent, RideError> {
    if record.ride.host_id == rider {
        return Err(ConflictReason::SelfJoin.into());
    }
    if record.participant(rider).is_some() {
        return Err(ConflictReason::DuplicateJoin.into());
    }
    let seats = usize::try_from(record.ride.max_passengers).unwrap_or(usize::MAX);
    if record.confirmed_count() >= seats {
        return Err(ConflictReason::RideFull {
            max_passengers: record.ride.max_passengers,
        }
        .into());
    }
    if !record.ride.status.is_joinable() {
        return Err(ConflictReason::NotJoinable {
            status: record.ride.status,
        }
        .into());
    }

    let participant = Participant {
        ride_id: record.ride.id,
        rider_id: rider,
        status: ParticipantStatus::Requested,
        joined_at: now,
    };
    record.participants.push(participant.clone());
    if record.ride.status == RideStatus::Created {
        set_status(record, RideStatus::Requested, now);
    }

    Ok(RideEvent::ParticipantJoined {
        ride: record.ride.clone(),
        participant,
    })
}

/// Accepts pending riders, oldest request first, while seats remain.
///
/// Pending riders beyond the seat count are moved to `Cancelled` in the same
/// step, so the confirmed count never exceeds `max_passengers`.
///
/// # Errors
///
/// - [`RideError::Forbidden`] if `actor` is not the host
/// - [`RideError::Conflict`] unless the ride is `Requested`
pub fn confirm_ride(
    record: &mut RideRecord,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<RideEvent, RideError> {
    require_host(record, actor, "confirm")?;
    require_status(record, RideStatus::Requested, "confirm")?;

    let capacity = usize::try_from(record.ride.max_passengers).unwrap_or(usize::MAX);
    let mut seats = capacity.saturating_sub(record.confirmed_count());

    let mut pending: Vec<usize> = record
        .participants
        .iter()
        .enumerate()
        .filter(|(_, p)| p.status == ParticipantStatus::Requested)
        .map(|(i, _)| i)
        .collect();
    pending.sort_by_key(|&i| record.participants[i].joined_at);

    let mut confirmed = Vec::new();
    let mut declined = Vec::new();
    for i in pending {
        let participant = &mut record.participants[i];
        if seats > 0 {
            participant.status = ParticipantStatus::Confirmed;
            confirmed.push(participant.rider_id);
            seats -= 1;
        } else {
            participant.status = ParticipantStatus::Cancelled;
            declined.push(participant.rider_id);
        }
    }
    set_status(record, RideStatus::Confirmed, now);

    Ok(RideEvent::RideConfirmed {
        ride: record.ride.clone(),
        confirmed,
        declined,
    })
}

/// Moves a confirmed ride to `Ongoing`.
///
/// # Errors
///
/// - [`RideError::Forbidden`] if `actor` is not the host
/// - [`RideError::Conflict`] unless the ride is `Confirmed`
pub fn start_ride(
    record: &mut RideRecord,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<RideEvent, RideError> {
    require_host(record, actor, "start")?;
    require_status(record, RideStatus::Confirmed, "start")?;
    set_status(record, RideStatus::Ongoing, now);

    Ok(RideEvent::RideStarted {
        ride: record.ride.clone(),
        riders: record.riders_with(ParticipantStatus::Confirmed),
    })
}

/// Moves an ongoing ride to `Completed`.
///
/// # Errors
///
/// - [`RideError::Forbidden`] if `actor` is not the host
/// - [`RideError::Conflict`] unless the ride is `Ongoing`
pub fn complete_ride(
    record: &mut RideRecord,
    actor: UserId,
    now: DateTime<Utc>,
) -> Result<RideEvent, RideError> {
    require_host(record, actor, "complete")?;
    require_status(record, RideStatus::Ongoing, "complete")?;
    set_status(record, RideStatus::Completed, now);

    Ok(RideEvent::RideCompleted {
        ride: record.ride.clone(),
        riders: record.riders_with(ParticipantStatus::Confirmed),
    })
}

/// Calls off a ride and cancels every active participant record.
///
/// # Errors
///
/// - whatever `policy` refuses with
/// - [`RideError::Conflict`] if the ride is already terminal
pub fn cancel_ride(
    record: &mut RideRecord,
    actor: &User,
    policy: &dyn CancellationPolicy,
    now: DateTime<Utc>,
) -> Result<RideEvent, RideError> {
    policy.authorize(actor, &record.ride)?;
    if record.ride.status.is_terminal() {
        return Err(ConflictReason::InvalidTransition {
            from: record.ride.status,
            action: "cancel",
        }
        .into());
    }

    let mut riders = Vec::new();
    for participant in &mut record.participants {
        if participant.status != ParticipantStatus::Cancelled {
            participant.status = ParticipantStatus::Cancelled;
            riders.push(participant.rider_id);
        }
    }
    set_status(record, RideStatus::Cancelled, now);

    Ok(RideEvent::RideCancelled {
        ride: record.ride.clone(),
        riders,
    })
}

// ============================================================================
// Publish ordering
// ============================================================================

/// Per-ride gates held from commit through publish, so subscribers see a
/// ride's events in the order they were committed.
#[derive(Default)]
struct PublishOrder {
    gates: Mutex<HashMap<RideId, Arc<AsyncMutex<()>>>>,
}

/// A held gate; dropping it lets the next writer of the ride proceed.
struct PublishTurn {
    order: Arc<PublishOrder>,
    ride: RideId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PublishOrder {
    fn gate(&self, ride: RideId) -> Arc<AsyncMutex<()>> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(ride).or_default())
    }

    async fn enter(self: &Arc<Self>, ride: RideId) -> PublishTurn {
        let guard = self.gate(ride).lock_owned().await;
        PublishTurn {
            order: Arc::clone(self),
            ride,
            guard: Some(guard),
        }
    }

    /// Claims the gate of a ride nobody else can see yet.
    fn claim(self: &Arc<Self>, ride: RideId) -> Option<PublishTurn> {
        let guard = self.gate(ride).try_lock_owned().ok()?;
        Some(PublishTurn {
            order: Arc::clone(self),
            ride,
            guard: Some(guard),
        })
    }

    /// Drops the gate once no writer holds or awaits it.
    fn release(&self, ride: RideId) {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        if gates.get(&ride).is_some_and(|gate| Arc::strong_count(gate) == 1) {
            gates.remove(&ride);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Drop for PublishTurn {
    fn drop(&mut self) {
        self.guard.take();
        self.order.release(self.ride);
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Validates and applies lifecycle operations, then publishes their events.
#[derive(Clone)]
pub struct LifecycleController {
    store: Arc<dyn RideStore>,
    events: Arc<dyn RideEventSink>,
    clock: Arc<dyn Clock>,
    cancellation: Arc<dyn CancellationPolicy>,
    order: Arc<PublishOrder>,
}

impl LifecycleController {
    /// Creates a controller with [`HostOrAdminCancellation`].
    #[must_use]
    pub fn new(
        store: Arc<dyn RideStore>,
        events: Arc<dyn RideEventSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            events,
            clock,
            cancellation: Arc::new(HostOrAdminCancellation),
            order: Arc::new(PublishOrder::default()),
        }
    }

    /// Replaces the cancellation policy.
    #[must_use]
    pub fn with_cancellation_policy(mut self, policy: Arc<dyn CancellationPolicy>) -> Self {
        self.cancellation = policy;
        self
    }

    /// The store this controller writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RideStore> {
        &self.store
    }

    /// Offers a new ride.
    ///
    /// # Errors
    ///
    /// - [`RideError::Forbidden`] unless `actor` is a host or admin
    /// - [`RideError::Validation`] for a bad ride spec
    /// - [`RideError::Storage`] on store failure
    pub async fn create(&self, actor: &User, spec: NewRide) -> Result<Ride, RideError> {
        if !actor.can_host() {
            return Err(RideError::Forbidden(
                "only hosts and admins can create rides".to_string(),
            ));
        }
        spec.validate()?;

        let host = actor.id;
        let now = self.clock.now();
        let order = Arc::clone(&self.order);
        let (claim_tx, mut claim_rx) = oneshot::channel();
        let ride = self
            .store
            .insert(Box::new(move |id| {
                let _ = claim_tx.send(order.claim(id));
                Ride::new(id, host, spec, now)
            }))
            .await?;
        let _turn = claim_rx.try_recv().ok().flatten();

        tracing::info!(ride_id = %ride.id, host_id = %host, "Ride created");
        self.events
            .publish(RideEvent::RideCreated { ride: ride.clone() })
            .await;
        Ok(ride)
    }

    /// Asks to join a ride as a rider.
    ///
    /// # Errors
    ///
    /// - [`RideError::NotFound`] if the ride does not exist
    /// - [`RideError::Conflict`] for self-join, duplicate, full or not joinable
    pub async fn join(&self, actor: &User, ride_id: RideId) -> Result<RideRecord, RideError> {
        let rider = actor.id;
        let now = self.clock.now();
        self.apply(
            "join",
            ride_id,
            actor.id,
            Box::new(move |record| join_ride(record, rider, now)),
        )
        .await
    }

    /// Confirms pending riders (host only).
    ///
    /// # Errors
    ///
    /// - [`RideError::NotFound`] if the ride does not exist
    /// - [`RideError::Forbidden`] if `actor` is not the host
    /// - [`RideError::Conflict`] unless the ride is `Requested`
    pub async fn confirm(&self, actor: &User, ride_id: RideId) -> Result<RideRecord, RideError> {
        let host = actor.id;
        let now = self.clock.now();
        self.apply(
            "confirm",
            ride_id,
            actor.id,
            Box::new(move |record| confirm_ride(record, host, now)),
        )
        .await
    }

    /// Starts a confirmed ride (host only).
    ///
    /// # Errors
    ///
    /// - [`RideError::NotFound`] if the ride does not exist
    /// - [`RideError::Forbidden`] if `actor` is not the host
    /// - [`RideError::Conflict`] unless the ride is `Confirmed`
    pub async fn start(&self, actor: &User, ride_id: RideId) -> Result<RideRecord, RideError> {
        let host = actor.id;
        let now = self.clock.now();
        self.apply(
            "start",
            ride_id,
            actor.id,
            Box::new(move |record| start_ride(record, host, now)),
        )
        .await
    }

    /// Completes an ongoing ride (host only).
    ///
    /// # Errors
    ///
    /// - [`RideError::NotFound`] if the ride does not exist
    /// - [`RideError::Forbidden`] if `actor` is not the host
    /// - [`RideError::Conflict`] unless the ride is `Ongoing`
    pub async fn complete(&self, actor: &User, ride_id: RideId) -> Result<RideRecord, RideError> {
        let host = actor.id;
        let now = self.clock.now();
        self.apply(
            "complete",
            ride_id,
            actor.id,
            Box::new(move |record| complete_ride(record, host, now)),
        )
        .await
    }

    /// Cancels a ride under the configured [`CancellationPolicy`].
    ///
    /// # Errors
    ///
    /// - [`RideError::NotFound`] if the ride does not exist
    /// - [`RideError::Forbidden`] if the policy refuses
    /// - [`RideError::Conflict`] if the ride is already terminal
    pub async fn cancel(&self, actor: &User, ride_id: RideId) -> Result<RideRecord, RideError> {
        let canceller = actor.clone();
        let policy = Arc::clone(&self.cancellation);
        let now = self.clock.now();
        self.apply(
            "cancel",
            ride_id,
            actor.id,
            Box::new(move |record| cancel_ride(record, &canceller, policy.as_ref(), now)),
        )
        .await
    }

    /// Loads a ride with its participants.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::NotFound`] if the ride does not exist.
    pub async fn get(&self, ride_id: RideId) -> Result<RideRecord, RideError> {
        self.store
            .get(ride_id)
            .await?
            .ok_or(RideError::NotFound(ride_id))
    }

    /// Rides `actor` hosts or has joined.
    ///
    /// # Errors
    ///
    /// Returns [`RideError::Storage`] on store failure.
    pub async fn rides_for(&self, actor: &User) -> Result<Vec<RideRecord>, RideError> {
        self.store.rides_for_user(actor.id).await
    }

    async fn apply(
        &self,
        action: &'static str,
        ride_id: RideId,
        actor: UserId,
        mutation: crate::store::Mutation,
    ) -> Result<RideRecord, RideError> {
        let turn = self.order.enter(ride_id).await;
        match self.store.atomic(ride_id, mutation).await {
            Ok((record, event)) => {
                tracing::info!(
                    ride_id = %ride_id,
                    actor_id = %actor,
                    action,
                    status = %record.ride.status,
                    "Ride updated"
                );
                self.events.publish(event).await;
                drop(turn);
                Ok(record)
            }
            Err(error) => {
                tracing::debug!(
                    ride_id = %ride_id,
                    actor_id = %actor,
                    action,
                    error = %error,
                    "Ride operation rejected"
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use crate::types::GeoPoint;
    use chrono::Duration;

    const HOST: UserId = UserId::new(1);
    const ALICE: UserId = UserId::new(2);
    const BOB: UserId = UserId::new(3);
    const CAROL: UserId = UserId::new(4);

    fn record(max_passengers: u32) -> RideRecord {
        let spec = NewRide {
            title: "Airport run".to_string(),
            description: None,
            start: GeoPoint { lat: 12.90, lng: 77.60 },
            end: GeoPoint { lat: 13.19, lng: 77.70 },
            start_address: "HSR Layout".to_string(),
            end_address: "KIA".to_string(),
            departure_time: Utc::now(),
            max_passengers,
        };
        RideRecord::new(Ride::new(RideId::new(42), HOST, spec, Utc::now()))
    }

    fn conflict(result: Result<RideEvent, RideError>) -> ConflictReason {
        result.unwrap_err().conflict_reason().unwrap()
    }

    #[test]
    fn first_join_moves_ride_to_requested() {
        let mut record = record(1);
        let event = join_ride(&mut record, ALICE, Utc::now()).unwrap();

        assert_eq!(record.ride.status, RideStatus::Requested);
        assert_eq!(record.participants.len(), 1);
        assert_eq!(record.participants[0].status, ParticipantStatus::Requested);
        assert_eq!(event.name(), "participant_joined");
    }

    #[test]
    fn host_cannot_join_own_ride() {
        let mut record = record(2);
        assert_eq!(conflict(join_ride(&mut record, HOST, Utc::now())), ConflictReason::SelfJoin);
        assert!(record.participants.is_empty());
    }

    #[test]
    fn duplicate_join_rejected_after_state_changes() {
        let mut record = record(2);
        join_ride(&mut record, ALICE, Utc::now()).unwrap();
        join_ride(&mut record, BOB, Utc::now()).unwrap();
        confirm_ride(&mut record, HOST, Utc::now()).unwrap();

        assert_eq!(
            conflict(join_ride(&mut record, ALICE, Utc::now())),
            ConflictReason::DuplicateJoin
        );
    }

    #[test]
    fn join_on_full_ride_reports_full() {
        let mut record = record(1);
        join_ride(&mut record, ALICE, Utc::now()).unwrap();
        confirm_ride(&mut record, HOST, Utc::now()).unwrap();

        assert_eq!(
            conflict(join_ride(&mut record, BOB, Utc::now())),
            ConflictReason::RideFull { max_passengers: 1 }
        );
    }

    #[test]
    fn join_on_confirmed_ride_with_seats_is_not_joinable() {
        let mut record = record(3);
        join_ride(&mut record, ALICE, Utc::now()).unwrap();
        confirm_ride(&mut record, HOST, Utc::now()).unwrap();

        assert_eq!(
            conflict(join_ride(&mut record, BOB, Utc::now())),
            ConflictReason::NotJoinable {
                status: RideStatus::Confirmed
            }
        );
    }

    #[test]
    fn confirm_promotes_oldest_requests_and_declines_overflow() {
        let mut record = record(2);
        let t0 = Utc::now();
        join_ride(&mut record, CAROL, t0 + Duration::seconds(2)).unwrap();
        join_ride(&mut record, ALICE, t0).unwrap();
        join_ride(&mut record, BOB, t0 + Duration::seconds(1)).unwrap();

        let event = confirm_ride(&mut record, HOST, t0 + Duration::seconds(3)).unwrap();
        let RideEvent::RideConfirmed {
            confirmed,
            declined,
            ride,
        } = event
        else {
            unreachable!("confirm emits RideConfirmed");
        };

        assert_eq!(ride.status, RideStatus::Confirmed);
        assert_eq!(confirmed, vec![ALICE, BOB]);
        assert_eq!(declined, vec![CAROL]);
        assert_eq!(record.confirmed_count(), 2);
        assert_eq!(
            record.participant(CAROL).unwrap().status,
            ParticipantStatus::Cancelled
        );
    }

    #[test]
    fn only_host_confirms() {
        let mut record = record(1);
        join_ride(&mut record, ALICE, Utc::now()).unwrap();
        let err = confirm_ride(&mut record, ALICE, Utc::now()).unwrap_err();

        assert!(matches!(err, RideError::Forbidden(_)));
        assert_eq!(record.ride.status, RideStatus::Requested);
    }

    #[test]
    fn confirm_requires_pending_riders() {
        let mut record = record(1);
        assert_eq!(
            conflict(confirm_ride(&mut record, HOST, Utc::now())),
            ConflictReason::InvalidTransition {
                from: RideStatus::Created,
                action: "confirm"
            }
        );
    }

    #[test]
    fn start_before_confirm_and_complete_before_start_conflict() {
        let mut record = record(1);
        join_ride(&mut record, ALICE, Utc::now()).unwrap();

        assert!(matches!(
            conflict(start_ride(&mut record, HOST, Utc::now())),
            ConflictReason::InvalidTransition { action: "start", .. }
        ));
        assert!(matches!(
            conflict(complete_ride(&mut record, HOST, Utc::now())),
            ConflictReason::InvalidTransition { action: "complete", .. }
        ));
    }

    #[test]
    fn full_happy_path() {
        let mut record = record(1);
        join_ride(&mut record, ALICE, Utc::now()).unwrap();
        confirm_ride(&mut record, HOST, Utc::now()).unwrap();

        let started = start_ride(&mut record, HOST, Utc::now()).unwrap();
        assert_eq!(started.status(), RideStatus::Ongoing);
        assert!(matches!(started, RideEvent::RideStarted { ref riders, .. } if riders == &[ALICE]));

        let completed = complete_ride(&mut record, HOST, Utc::now()).unwrap();
        assert_eq!(completed.status(), RideStatus::Completed);
    }

    #[test]
    fn cancel_by_host_cancels_active_participants() {
        let mut record = record(1);
        join_ride(&mut record, ALICE, Utc::now()).unwrap();
        confirm_ride(&mut record, HOST, Utc::now()).unwrap();

        let host = User::new(HOST, [Role::Host]);
        let event = cancel_ride(&mut record, &host, &HostOrAdminCancellation, Utc::now()).unwrap();

        assert_eq!(record.ride.status, RideStatus::Cancelled);
        assert!(matches!(event, RideEvent::RideCancelled { ref riders, .. } if riders == &[ALICE]));
        assert_eq!(record.riders_with(ParticipantStatus::Cancelled), vec![ALICE]);
    }

    #[test]
    fn cancel_policy_and_terminal_guard() {
        let mut record = record(1);
        let rider = User::new(ALICE, [Role::Rider]);
        let admin = User::new(UserId::new(99), [Role::Admin]);

        assert!(matches!(
            cancel_ride(&mut record, &rider, &HostOrAdminCancellation, Utc::now()),
            Err(RideError::Forbidden(_))
        ));
        cancel_ride(&mut record, &admin, &HostOrAdminCancellation, Utc::now()).unwrap();
        assert!(matches!(
            conflict(cancel_ride(&mut record, &admin, &HostOrAdminCancellation, Utc::now())),
            ConflictReason::InvalidTransition { action: "cancel", .. }
        ));
    }

    #[test]
    fn publish_gate_is_exclusive_and_dropped_when_idle() {
        let order = Arc::new(PublishOrder::default());
        let ride = RideId::new(1);

        let turn = order.claim(ride).unwrap();
        assert!(order.claim(ride).is_none());
        assert!(order.claim(RideId::new(2)).is_some());
        assert_eq!(order.len(), 1);

        drop(turn);
        assert_eq!(order.len(), 0);
    }
}
