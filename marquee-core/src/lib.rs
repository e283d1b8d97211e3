pub mod clock;
pub mod payment;
pub mod repository;

use marquee_shared::{SeatKey, SeatKeyError};
use uuid::Uuid;

pub use clock::{Clock, ManualClock, SystemClock};
pub use repository::{ReleaseOutcome, ReservationBackend, SeatLockService};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReservationError {
    /// Booked, or leased by another holder. Not retried automatically.
    #[error("Seat {0} is unavailable")]
    SeatUnavailable(SeatKey),

    /// Raised at confirm time when a lease lapsed or was never held.
    #[error("Seat {0} is no longer available")]
    SeatNoLongerAvailable(SeatKey),

    #[error("No seats selected")]
    EmptySelection,

    #[error("Showtime unavailable: {0}")]
    ShowtimeUnavailable(Uuid),

    #[error("Invalid seat: {0}")]
    InvalidSeat(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Payment declined: {0}")]
    PaymentDeclined(String),

    /// Transient I/O failure talking to a lock store or collaborator.
    #[error("Backend unavailable: {0}")]
    Backend(String),
}

impl ReservationError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ReservationError::Backend(_))
    }
}

impl From<SeatKeyError> for ReservationError {
    fn from(err: SeatKeyError) -> Self {
        ReservationError::InvalidSeat(err.to_string())
    }
}

pub type CoreResult<T> = Result<T, ReservationError>;
