pub mod events;
pub mod lease;
pub mod seat;
pub mod showtime;

pub use events::SeatEvent;
pub use lease::{HolderId, Lease};
pub use seat::{Seat, SeatKey, SeatKeyError, SeatSnapshot, SeatStatus, SeatStatusReport};
pub use showtime::Showtime;
