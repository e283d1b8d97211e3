use async_trait::async_trait;
use chrono::Duration;
use marquee_core::{Clock, CoreResult, ReleaseOutcome, ReservationBackend, SeatLockService};
use marquee_shared::{HolderId, Lease, SeatKey, SeatSnapshot, SeatStatusReport, Showtime};
use std::sync::Arc;
use uuid::Uuid;

use crate::inventory::SeatInventory;
use crate::lock::LockCoordinator;

/// Single-process reservation backend: a [`SeatInventory`] plus the
/// [`LockCoordinator`] granting leases over it.
pub struct InMemoryBackend {
    coordinator: LockCoordinator,
}

impl InMemoryBackend {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let inventory = Arc::new(SeatInventory::new(clock));
        Self {
            coordinator: LockCoordinator::new(inventory),
        }
    }

    pub fn register(&self, showtime: Showtime) -> CoreResult<()> {
        self.inventory().register(showtime)
    }

    pub fn inventory(&self) -> &Arc<SeatInventory> {
        self.coordinator.inventory()
    }

    pub fn coordinator(&self) -> &LockCoordinator {
        &self.coordinator
    }

    pub fn snapshot(&self, showtime_id: Uuid) -> CoreResult<SeatSnapshot> {
        self.inventory().snapshot(showtime_id)
    }
}

#[async_trait]
impl SeatLockService for InMemoryBackend {
    async fn acquire(&self, showtime_id: Uuid, seat: SeatKey, holder: &HolderId, ttl: Duration) -> CoreResult<Lease> {
        self.coordinator.acquire(showtime_id, seat, holder, ttl)
    }

    async fn release(&self, showtime_id: Uuid, seat: SeatKey, holder: &HolderId) -> CoreResult<ReleaseOutcome> {
        self.coordinator.release(showtime_id, seat, holder)
    }

    async fn lease(&self, showtime_id: Uuid, seat: SeatKey) -> CoreResult<Option<Lease>> {
        self.coordinator.lease(showtime_id, seat)
    }
}

#[async_trait]
impl ReservationBackend for InMemoryBackend {
    async fn showtime(&self, showtime_id: Uuid) -> CoreResult<Option<Showtime>> {
        Ok(self.inventory().showtime(showtime_id))
    }

    async fn seat_status(&self, showtime_id: Uuid) -> CoreResult<SeatStatusReport> {
        self.inventory().seat_status(showtime_id)
    }

    async fn confirm_booking(&self, showtime_id: Uuid, seats: &[SeatKey], holder: &HolderId) -> CoreResult<Vec<SeatKey>> {
        self.inventory().confirm_booking(showtime_id, seats, holder)
    }

    async fn sweep_expired(&self) -> CoreResult<Vec<Lease>> {
        Ok(self.coordinator.sweep_expired())
    }
}
