use async_trait::async_trait;
use chrono::Duration;
use marquee_shared::{HolderId, Lease, SeatKey, SeatStatusReport, Showtime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::CoreResult;

/// Result of a release request. Releasing something the caller does not hold
/// is a benign no-op, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseOutcome {
    Released,
    NotHolder,
}

/// Lease operations a reservation session needs.
#[async_trait]
pub trait SeatLockService: Send + Sync {
    /// Grant (or refresh, for the current holder) an exclusive lease on `seat`.
    async fn acquire(
        &self,
        showtime_id: Uuid,
        seat: SeatKey,
        holder: &HolderId,
        ttl: Duration,
    ) -> CoreResult<Lease>;

    /// Drop `holder`'s lease on `seat`. Never touches another holder's lease.
    async fn release(
        &self,
        showtime_id: Uuid,
        seat: SeatKey,
        holder: &HolderId,
    ) -> CoreResult<ReleaseOutcome>;

    /// Active lease on `seat`, if any. Read only: never grants or refreshes.
    async fn lease(&self, showtime_id: Uuid, seat: SeatKey) -> CoreResult<Option<Lease>>;
}

/// Full seat reservation protocol: showtime lookup, status reads, leases and
/// terminal booking.
#[async_trait]
pub trait ReservationBackend: SeatLockService {
    async fn showtime(&self, showtime_id: Uuid) -> CoreResult<Option<Showtime>>;

    /// Booked seats plus seats under an active lease.
    async fn seat_status(&self, showtime_id: Uuid) -> CoreResult<SeatStatusReport>;

    /// Atomically turn `holder`'s leased seats into booked seats; all or nothing.
    async fn confirm_booking(
        &self,
        showtime_id: Uuid,
        seats: &[SeatKey],
        holder: &HolderId,
    ) -> CoreResult<Vec<SeatKey>>;

    /// Remove leases that have run past their TTL and report them. Stores that
    /// expire keys natively return nothing.
    async fn sweep_expired(&self) -> CoreResult<Vec<Lease>>;
}
