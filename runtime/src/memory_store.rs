//! In-memory [`RideStore`].
//!
//! Each ride record sits behind its own `tokio::sync::Mutex`, so mutations on
//! one ride serialize while different rides proceed in parallel. The outer
//! map lock is held only long enough to find (or insert) a ride's cell.
//!
//! Contents do not survive a restart; production deployments put a durable
//! store behind the same trait.

use rideshare_core::error::RideError;
use rideshare_core::event::RideEvent;
use rideshare_core::store::{Mutation, RideFactory, RideStore, StoreFuture};
use rideshare_core::types::{Ride, RideId, RideRecord, RideStatus, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

type RideCell = Arc<Mutex<RideRecord>>;

/// Process-local ride store.
#[derive(Debug, Default)]
pub struct InMemoryRideStore {
    rides: RwLock<HashMap<RideId, RideCell>>,
    next_id: AtomicU64,
}

impl InMemoryRideStore {
    /// Creates an empty store. Ride ids start at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rides held.
    pub async fn len(&self) -> usize {
        self.rides.read().await.len()
    }

    /// Returns true if no ride has been created.
    pub async fn is_empty(&self) -> bool {
        self.rides.read().await.is_empty()
    }

    async fn cell(&self, id: RideId) -> Option<RideCell> {
        self.rides.read().await.get(&id).cloned()
    }

    /// Snapshot of every ride cell, ordered by id.
    async fn cells(&self) -> Vec<RideCell> {
        let rides = self.rides.read().await;
        let mut ids: Vec<&RideId> = rides.keys().collect();
        ids.sort();
        ids.into_iter()
            .filter_map(|id| rides.get(id).cloned())
            .collect()
    }
}

impl RideStore for InMemoryRideStore {
    fn insert(&self, factory: RideFactory) -> StoreFuture<'_, Ride> {
        Box::pin(async move {
            let id = RideId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            let ride = factory(id);
            let cell = Arc::new(Mutex::new(RideRecord::new(ride.clone())));
            self.rides.write().await.insert(id, cell);
            Ok(ride)
        })
    }

    fn get(&self, id: RideId) -> StoreFuture<'_, Option<RideRecord>> {
        Box::pin(async move {
            match self.cell(id).await {
                Some(cell) => Ok(Some(cell.lock().await.clone())),
                None => Ok(None),
            }
        })
    }

    fn atomic(&self, id: RideId, mutation: Mutation) -> StoreFuture<'_, (RideRecord, RideEvent)> {
        Box::pin(async move {
            let cell = self.cell(id).await.ok_or(RideError::NotFound(id))?;
            let mut committed = cell.lock().await;

            let mut working = committed.clone();
            let event = mutation(&mut working)?;
            *committed = working;

            Ok((committed.clone(), event))
        })
    }

    fn rides_with_status<'a>(&'a self, statuses: &'a [RideStatus]) -> StoreFuture<'a, Vec<Ride>> {
        Box::pin(async move {
            let mut rides = Vec::new();
            for cell in self.cells().await {
                let record = cell.lock().await;
                if statuses.contains(&record.ride.status) {
                    rides.push(record.ride.clone());
                }
            }
            Ok(rides)
        })
    }

    fn rides_for_user(&self, user: UserId) -> StoreFuture<'_, Vec<RideRecord>> {
        Box::pin(async move {
            let mut records = Vec::new();
            for cell in self.cells().await {
                let record = cell.lock().await;
                if record.involves(user) {
                    records.push(record.clone());
                }
            }
            Ok(records)
        })
    }
}
