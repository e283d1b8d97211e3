pub mod models;

pub use models::{
    HolderId, Lease, Seat, SeatEvent, SeatKey, SeatKeyError, SeatSnapshot, SeatStatus,
    SeatStatusReport, Showtime,
};
