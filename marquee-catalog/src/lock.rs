use chrono::Duration;
use marquee_core::{CoreResult, ReleaseOutcome, ReservationError};
use marquee_shared::{HolderId, Lease, SeatKey};
use std::sync::{Arc, PoisonError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::inventory::SeatInventory;

/// Grants short-lived, renewable, exclusive leases on individual seats.
///
/// Every operation runs inside the target seat's critical section. Expiry is
/// checked at access time, so a lease is never honored at or past
/// `expires_at` even if [`LockCoordinator::sweep_expired`] never runs.
pub struct LockCoordinator {
    inventory: Arc<SeatInventory>,
}

impl LockCoordinator {
    pub fn new(inventory: Arc<SeatInventory>) -> Self {
        Self { inventory }
    }

    pub fn inventory(&self) -> &Arc<SeatInventory> {
        &self.inventory
    }

    /// Lease `seat` to `holder` for `ttl`.
    ///
    /// Fails with `SeatUnavailable` if the seat is booked or actively leased by
    /// someone else. A repeat call by the current holder refreshes the expiry
    /// instead of creating a second lease.
    pub fn acquire(&self, showtime_id: Uuid, seat: SeatKey, holder: &HolderId, ttl: Duration) -> CoreResult<Lease> {
        if ttl <= Duration::zero() {
            return Err(ReservationError::Validation("Lease TTL must be positive".to_string()));
        }
        let table = self.inventory.table(showtime_id)?;
        let mut cell = table.lock_seat(&seat)?;
        let now = self.inventory.clock().now();

        if cell.booked {
            debug!("Acquire of booked seat {} on showtime {} by {}", seat, showtime_id, holder);
            return Err(ReservationError::SeatUnavailable(seat));
        }

        if let Some(lease) = cell.lease.as_mut().filter(|lease| lease.is_active(now)) {
            if &lease.holder != holder {
                warn!("Seat {} on showtime {} already held, rejecting {}", seat, showtime_id, holder);
                return Err(ReservationError::SeatUnavailable(seat));
            }
            lease.expires_at = now + ttl;
            debug!("Lease on {} renewed for {} until {}", seat, holder, lease.expires_at);
            return Ok(lease.clone());
        }

        let lease = Lease {
            showtime_id,
            seat,
            holder: holder.clone(),
            acquired_at: now,
            expires_at: now + ttl,
        };
        cell.lease = Some(lease.clone());
        info!("Seat {} on showtime {} leased to {} until {}", seat, showtime_id, holder, lease.expires_at);
        Ok(lease)
    }

    /// Drop `holder`'s lease on `seat`.
    ///
    /// Anything other than an active lease of `holder` yields `NotHolder` and
    /// leaves another holder's lease untouched.
    pub fn release(&self, showtime_id: Uuid, seat: SeatKey, holder: &HolderId) -> CoreResult<ReleaseOutcome> {
        let table = self.inventory.table(showtime_id)?;
        let mut cell = table.lock_seat(&seat)?;
        let now = self.inventory.clock().now();

        let own = cell
            .lease
            .as_ref()
            .filter(|lease| &lease.holder == holder)
            .map(|lease| lease.is_active(now));

        match own {
            Some(active) => {
                cell.lease = None;
                if active {
                    info!("Seat {} on showtime {} released by {}", seat, showtime_id, holder);
                    Ok(ReleaseOutcome::Released)
                } else {
                    Ok(ReleaseOutcome::NotHolder)
                }
            }
            None => {
                debug!("Release of {} by non-holder {} ignored", seat, holder);
                Ok(ReleaseOutcome::NotHolder)
            }
        }
    }

    /// Active lease on `seat`, if any
    pub fn lease(&self, showtime_id: Uuid, seat: SeatKey) -> CoreResult<Option<Lease>> {
        let table = self.inventory.table(showtime_id)?;
        let cell = table.lock_seat(&seat)?;
        let now = self.inventory.clock().now();
        Ok(cell.lease.clone().filter(|lease| lease.is_active(now)))
    }

    /// Remove every lease whose TTL has run out and return them.
    pub fn sweep_expired(&self) -> Vec<Lease> {
        let now = self.inventory.clock().now();
        let mut expired = Vec::new();

        for table in self.inventory.tables() {
            for (_, cell) in table.cells() {
                let mut cell = cell.lock().unwrap_or_else(PoisonError::into_inner);
                if cell.lease.as_ref().is_some_and(|lease| !lease.is_active(now)) {
                    expired.extend(cell.lease.take());
                }
            }
        }

        if !expired.is_empty() {
            debug!("Swept {} expired lease(s)", expired.len());
        }
        expired
    }
}
