use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::seat::{SeatKey, MAX_ROW};

/// One screening of a movie. Immutable once registered with an inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Showtime {
    pub id: Uuid,
    pub theater: String,
    pub screen: String,
    pub movie: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Price of a single seat in minor currency units
    pub price_cents: i64,
    pub rows: u8,
    pub seats_per_row: u16,
}

impl Showtime {
    pub fn capacity(&self) -> usize {
        self.rows as usize * self.seats_per_row as usize
    }

    /// Row-major slot of `key` in this showtime's seat table, if the seat exists.
    pub fn seat_index(&self, key: &SeatKey) -> Option<usize> {
        let row = key.row_index();
        let number = key.number() as usize;
        if row >= self.rows as usize || number > self.seats_per_row as usize {
            return None;
        }
        Some(row * self.seats_per_row as usize + (number - 1))
    }

    /// Inverse of [`Showtime::seat_index`].
    pub fn seat_at(&self, index: usize) -> Option<SeatKey> {
        if index >= self.capacity() {
            return None;
        }
        let per_row = self.seats_per_row as usize;
        let row = (b'A' + (index / per_row) as u8) as char;
        SeatKey::new(row, (index % per_row + 1) as u16).ok()
    }

    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        now >= self.start_time
    }

    /// Check the grid and schedule before a showtime is accepted by a store.
    pub fn validate(&self) -> Result<(), String> {
        let max_rows = MAX_ROW as u8 - b'A' + 1;
        if self.rows == 0 || self.rows > max_rows {
            return Err(format!("Showtime must have between 1 and {} rows", max_rows));
        }
        if self.seats_per_row == 0 {
            return Err("Showtime must have at least one seat per row".to_string());
        }
        if self.price_cents < 0 {
            return Err("Seat price cannot be negative".to_string());
        }
        if self.end_time <= self.start_time {
            return Err("Showtime must end after it starts".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn showtime(rows: u8, seats_per_row: u16) -> Showtime {
        let start = Utc::now() + Duration::hours(2);
        Showtime {
            id: Uuid::new_v4(),
            theater: "Odeon Central".to_string(),
            screen: "3".to_string(),
            movie: "Heat".to_string(),
            start_time: start,
            end_time: start + Duration::minutes(170),
            price_cents: 1250,
            rows,
            seats_per_row,
        }
    }

    #[test]
    fn test_seat_index_round_trip_corners() {
        let show = showtime(5, 8);
        assert_eq!(show.capacity(), 40);

        let first: SeatKey = "A1".parse().unwrap();
        let last: SeatKey = "E8".parse().unwrap();
        assert_eq!(show.seat_index(&first), Some(0));
        assert_eq!(show.seat_index(&last), Some(39));
        assert_eq!(show.seat_at(39), Some(last));
        assert_eq!(show.seat_at(40), None);
    }

    #[test]
    fn test_validate() {
        assert!(showtime(26, 30).validate().is_ok());
        assert!(showtime(0, 30).validate().is_err());
        assert!(showtime(27, 30).validate().is_err());
        assert!(showtime(5, 0).validate().is_err());

        let mut show = showtime(5, 5);
        show.end_time = show.start_time;
        assert!(show.validate().is_err());
    }

    #[test]
    fn test_seat_outside_grid() {
        let show = showtime(5, 8);
        assert_eq!(show.seat_index(&"F1".parse().unwrap()), None);
        assert_eq!(show.seat_index(&"A9".parse().unwrap()), None);
    }
}
