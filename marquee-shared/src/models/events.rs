use uuid::Uuid;

use super::seat::SeatKey;

/// Seat state change, fanned out to clients watching a showtime.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SeatEvent {
    Locked {
        showtime_id: Uuid,
        seats: Vec<SeatKey>,
        at: i64,
    },
    Released {
        showtime_id: Uuid,
        seats: Vec<SeatKey>,
        at: i64,
    },
    Expired {
        showtime_id: Uuid,
        seats: Vec<SeatKey>,
        at: i64,
    },
    Booked {
        showtime_id: Uuid,
        seats: Vec<SeatKey>,
        at: i64,
    },
}

impl SeatEvent {
    pub fn showtime_id(&self) -> Uuid {
        match self {
            SeatEvent::Locked { showtime_id, .. }
            | SeatEvent::Released { showtime_id, .. }
            | SeatEvent::Expired { showtime_id, .. }
            | SeatEvent::Booked { showtime_id, .. } => *showtime_id,
        }
    }

    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            SeatEvent::Locked { .. } => "seat_locked",
            SeatEvent::Released { .. } => "seat_released",
            SeatEvent::Expired { .. } => "seat_expired",
            SeatEvent::Booked { .. } => "seat_booked",
        }
    }
}
