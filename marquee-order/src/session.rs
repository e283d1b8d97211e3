use chrono::{DateTime, Duration, Utc};
use marquee_core::{CoreResult, ReleaseOutcome, ReservationError, SeatLockService};
use marquee_shared::{HolderId, Lease, SeatKey, Showtime};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reported after a successful toggle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectionChanged {
    pub seat: SeatKey,
    pub selected: bool,
    pub total_cents: i64,
}

/// One holder's in-progress seat selection for one showtime.
///
/// Owned by the caller and never shared. Seats enter the selection only after
/// the lock service has granted a lease, and leave it only once the lease is
/// gone. If the session is dropped without [`ReservationSession::release_all`]
/// its leases simply run out their TTL.
pub struct ReservationSession {
    showtime: Showtime,
    holder: HolderId,
    ttl: Duration,
    locks: Arc<dyn SeatLockService>,
    selected: BTreeMap<SeatKey, Lease>,
}

impl ReservationSession {
    pub fn new(showtime: Showtime, holder: HolderId, locks: Arc<dyn SeatLockService>, ttl: Duration) -> Self {
        Self {
            showtime,
            holder,
            ttl,
            locks,
            selected: BTreeMap::new(),
        }
    }

    pub fn showtime(&self) -> &Showtime {
        &self.showtime
    }

    pub fn holder(&self) -> &HolderId {
        &self.holder
    }

    pub fn price_per_seat(&self) -> i64 {
        self.showtime.price_cents
    }

    /// Selected seats in row/number order
    pub fn selection(&self) -> Vec<SeatKey> {
        self.selected.keys().copied().collect()
    }

    pub fn leases(&self) -> impl Iterator<Item = &Lease> {
        self.selected.values()
    }

    pub fn contains(&self, seat: &SeatKey) -> bool {
        self.selected.contains_key(seat)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn total(&self) -> i64 {
        self.selected.len() as i64 * self.showtime.price_cents
    }

    /// Earliest lease expiry among the selected seats
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.selected.values().map(|lease| lease.expires_at).min()
    }

    /// True once every selected lease has lapsed. An empty session never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !self.selected.is_empty() && self.selected.values().all(|lease| !lease.is_active(now))
    }

    /// Select an unselected seat or deselect a selected one.
    ///
    /// On a failed acquire the selection is unchanged. On a failed release the
    /// seat stays selected and the error is returned so the caller can retry.
    pub async fn toggle(&mut self, seat: SeatKey) -> CoreResult<SelectionChanged> {
        if self.showtime.seat_index(&seat).is_none() {
            return Err(ReservationError::InvalidSeat(format!(
                "{} is not part of showtime {}",
                seat, self.showtime.id
            )));
        }

        let selected = if self.selected.contains_key(&seat) {
            match self.locks.release(self.showtime.id, seat, &self.holder).await {
                Ok(outcome) => {
                    if outcome == ReleaseOutcome::NotHolder {
                        debug!("Lease on {} for {} had already lapsed", seat, self.holder);
                    }
                    self.selected.remove(&seat);
                    false
                }
                Err(err) => {
                    warn!("Keeping {} selected for {}: release failed: {}", seat, self.holder, err);
                    return Err(err);
                }
            }
        } else {
            let lease = self
                .locks
                .acquire(self.showtime.id, seat, &self.holder, self.ttl)
                .await
                .inspect_err(|err| debug!("Toggle of {} for {} rejected: {}", seat, self.holder, err))?;
            self.selected.insert(seat, lease);
            true
        };

        Ok(SelectionChanged {
            seat,
            selected,
            total_cents: self.total(),
        })
    }

    /// Add a seat `holder` already holds under an active lease, e.g. one
    /// granted by an earlier request.
    ///
    /// Never acquires. A seat that is free, leased to someone else or whose
    /// lease lapsed fails with `SeatNoLongerAvailable` and the selection is
    /// unchanged.
    pub async fn adopt(&mut self, seat: SeatKey) -> CoreResult<()> {
        if self.showtime.seat_index(&seat).is_none() {
            return Err(ReservationError::InvalidSeat(format!(
                "{} is not part of showtime {}",
                seat, self.showtime.id
            )));
        }

        match self.locks.lease(self.showtime.id, seat).await? {
            Some(lease) if lease.holder == self.holder => {
                self.selected.insert(seat, lease);
                Ok(())
            }
            _ => {
                debug!("{} holds no active lease on {}", self.holder, seat);
                Err(ReservationError::SeatNoLongerAvailable(seat))
            }
        }
    }

    /// Re-acquire every selected seat to push its expiry out by the session TTL.
    ///
    /// Seats that another holder took over after a lapse are dropped and
    /// returned. A transient error aborts the renewal with the selection intact.
    pub async fn renew(&mut self) -> CoreResult<Vec<SeatKey>> {
        let mut lost = Vec::new();

        for seat in self.selection() {
            match self.locks.acquire(self.showtime.id, seat, &self.holder, self.ttl).await {
                Ok(lease) => {
                    self.selected.insert(seat, lease);
                }
                Err(ReservationError::SeatUnavailable(_)) => {
                    warn!("Lost seat {} for {} before renewal", seat, self.holder);
                    self.selected.remove(&seat);
                    lost.push(seat);
                }
                Err(err) => return Err(err),
            }
        }

        Ok(lost)
    }

    /// Best-effort release of every held seat. Seats whose release failed stay
    /// selected and are returned.
    pub async fn release_all(&mut self) -> Vec<SeatKey> {
        let mut kept = Vec::new();

        for seat in self.selection() {
            match self.locks.release(self.showtime.id, seat, &self.holder).await {
                Ok(_) => {
                    self.selected.remove(&seat);
                }
                Err(err) => {
                    warn!("Release of {} for {} failed: {}", seat, self.holder, err);
                    kept.push(seat);
                }
            }
        }

        info!("Session for {} on showtime {} released", self.holder, self.showtime.id);
        kept
    }
}
