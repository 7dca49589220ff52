//! In-memory [`HelmetCheckStore`].

use rideshare_core::error::{ConflictReason, RideError};
use rideshare_core::helmet::{
    HelmetCheck, HelmetCheckId, HelmetCheckStore, HelmetFuture, NewHelmetCheck,
};
use rideshare_core::types::{RideId, UserId};
use rideshare_core::{DateTime, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Checks {
    by_id: BTreeMap<HelmetCheckId, HelmetCheck>,
    last_id: u64,
}

/// Process-local helmet check store. Check ids start at 1.
#[derive(Debug, Default)]
pub struct InMemoryHelmetCheckStore {
    checks: RwLock<Checks>,
}

impl InMemoryHelmetCheckStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl HelmetCheckStore for InMemoryHelmetCheckStore {
    fn insert(
        &self,
        user: UserId,
        check: NewHelmetCheck,
        now: DateTime<Utc>,
    ) -> HelmetFuture<'_, HelmetCheck> {
        Box::pin(async move {
            let mut checks = self.checks.write().await;
            let duplicate = checks
                .by_id
                .values()
                .any(|c| c.user_id == user && c.ride_id == check.ride_id);
            if duplicate {
                return Err(RideError::from(ConflictReason::DuplicateHelmetCheck));
            }

            checks.last_id += 1;
            let stored = HelmetCheck {
                id: HelmetCheckId::new(checks.last_id),
                user_id: user,
                ride_id: check.ride_id,
                image_url: check.image_url,
                is_verified: true,
                created_at: now,
            };
            checks.by_id.insert(stored.id, stored.clone());
            Ok(stored)
        })
    }

    fn find(&self, user: UserId, ride: RideId) -> HelmetFuture<'_, Option<HelmetCheck>> {
        Box::pin(async move {
            let checks = self.checks.read().await;
            Ok(checks
                .by_id
                .values()
                .find(|c| c.user_id == user && c.ride_id == ride)
                .cloned())
        })
    }

    fn get(&self, id: HelmetCheckId) -> HelmetFuture<'_, Option<HelmetCheck>> {
        Box::pin(async move { Ok(self.checks.read().await.by_id.get(&id).cloned()) })
    }

    fn for_user(&self, user: UserId) -> HelmetFuture<'_, Vec<HelmetCheck>> {
        Box::pin(async move {
            let checks = self.checks.read().await;
            let mut mine: Vec<HelmetCheck> = checks
                .by_id
                .values()
                .filter(|c| c.user_id == user)
                .cloned()
                .collect();
            mine.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(mine)
        })
    }

    fn remove(&self, id: HelmetCheckId) -> HelmetFuture<'_, bool> {
        Box::pin(async move { Ok(self.checks.write().await.by_id.remove(&id).is_some()) })
    }
}
