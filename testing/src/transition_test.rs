//! Given-When-Then harness for pure lifecycle transitions
//!
//! A transition is any `FnOnce(&mut RideRecord) -> Result<RideEvent, RideError>`,
//! the same shape the store applies atomically. The harness also checks
//! that a rejected transition leaves the record exactly as it found it.

#![allow(clippy::module_name_repetitions)] // TransitionTest is the natural name

use rideshare_core::error::{ConflictReason, RideError};
use rideshare_core::event::RideEvent;
use rideshare_core::types::RideRecord;

type Transition = Box<dyn FnOnce(&mut RideRecord) -> Result<RideEvent, RideError>>;
type RecordAssertion = Box<dyn FnOnce(&RideRecord)>;
type OutcomeAssertion = Box<dyn FnOnce(&Result<RideEvent, RideError>)>;

/// Fluent API for testing transitions
///
/// # Example
///
/// ```ignore
/// TransitionTest::given(fixtures::record(RideId::new(1), 1))
///     .when(|record| join_ride(record, fixtures::HOST, fixtures::epoch()))
///     .then_conflict(ConflictReason::SelfJoin)
///     .run();
/// ```
pub struct TransitionTest {
    record: RideRecord,
    transition: Option<Transition>,
    record_assertions: Vec<RecordAssertion>,
    outcome_assertions: Vec<OutcomeAssertion>,
}

impl TransitionTest {
    /// Starts from `record` (Given)
    #[must_use]
    pub fn given(record: RideRecord) -> Self {
        Self {
            record,
            transition: None,
            record_assertions: Vec::new(),
            outcome_assertions: Vec::new(),
        }
    }

    /// Sets the transition under test (When)
    #[must_use]
    pub fn when<F>(mut self, transition: F) -> Self
    where
        F: FnOnce(&mut RideRecord) -> Result<RideEvent, RideError> + 'static,
    {
        self.transition = Some(Box::new(transition));
        self
    }

    /// Adds an assertion about the record after the transition (Then)
    #[must_use]
    pub fn then_record<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&RideRecord) + 'static,
    {
        self.record_assertions.push(Box::new(assertion));
        self
    }

    /// Asserts the transition succeeded and inspects its event (Then)
    #[must_use]
    #[allow(clippy::panic)] // Test assertion
    pub fn then_event<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&RideEvent) + 'static,
    {
        self.outcome_assertions.push(Box::new(move |outcome| match outcome {
            Ok(event) => assertion(event),
            Err(error) => panic!("Expected an event, but the transition failed: {error}"),
        }));
        self
    }

    /// Asserts the transition was rejected with `expected` (Then)
    #[must_use]
    #[allow(clippy::panic)] // Test assertion
    pub fn then_conflict(mut self, expected: ConflictReason) -> Self {
        self.outcome_assertions.push(Box::new(move |outcome| {
            match outcome.as_ref().map_err(RideError::conflict_reason) {
                Err(Some(reason)) => assert_eq!(reason, expected),
                other => panic!("Expected conflict {expected:?}, got {other:?}"),
            }
        }));
        self
    }

    /// Asserts the transition failed with the given error code (Then)
    #[must_use]
    #[allow(clippy::panic)] // Test assertion
    pub fn then_error_code(mut self, expected: &'static str) -> Self {
        self.outcome_assertions.push(Box::new(move |outcome| match outcome {
            Err(error) => assert_eq!(error.code(), expected, "unexpected error: {error}"),
            Ok(event) => panic!("Expected {expected}, but got event {}", event.name()),
        }));
        self
    }

    /// Runs the transition and every assertion
    ///
    /// # Panics
    ///
    /// Panics if no transition was set, if a rejected transition mutated the
    /// record, or if any assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let transition = self.transition.expect("Transition must be set with when()");
        let before = self.record.clone();
        let mut record = self.record;

        let outcome = transition(&mut record);
        if outcome.is_err() {
            assert_eq!(record, before, "Rejected transition must not modify the record");
        }

        for assertion in self.outcome_assertions {
            assertion(&outcome);
        }
        for assertion in self.record_assertions {
            assertion(&record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{self, ALICE, HOST};
    use rideshare_core::lifecycle::{join_ride, start_ride};
    use rideshare_core::types::{RideId, RideStatus};

    #[test]
    fn join_moves_ride_to_requested() {
        TransitionTest::given(fixtures::record(RideId::new(1), 2))
            .when(|record| join_ride(record, ALICE, fixtures::epoch()))
            .then_event(|event| assert_eq!(event.name(), "participant_joined"))
            .then_record(|record| {
                assert_eq!(record.ride.status, RideStatus::Requested);
                assert_eq!(record.participants.len(), 1);
            })
            .run();
    }

    #[test]
    fn self_join_is_a_conflict() {
        TransitionTest::given(fixtures::record(RideId::new(1), 2))
            .when(|record| join_ride(record, HOST, fixtures::epoch()))
            .then_conflict(ConflictReason::SelfJoin)
            .run();
    }

    #[test]
    fn non_host_start_is_forbidden() {
        TransitionTest::given(fixtures::record(RideId::new(1), 2))
            .when(|record| start_ride(record, ALICE, fixtures::epoch()))
            .then_error_code("FORBIDDEN")
            .run();
    }
}
