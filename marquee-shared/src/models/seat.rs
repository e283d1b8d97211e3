use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Highest row letter a seat map can have.
pub const MAX_ROW: char = 'Z';

/// Identifies a seat within a showtime's seat map, e.g. `B5`.
///
/// Rows are ASCII uppercase letters and numbers start at 1. On the wire a key
/// travels as `{"row": "B", "seat": 5}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawSeatKey")]
pub struct SeatKey {
    row: char,
    #[serde(rename = "seat")]
    number: u16,
}

#[derive(Deserialize)]
struct RawSeatKey {
    row: String,
    seat: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SeatKeyError {
    #[error("Invalid seat row: {0:?}")]
    InvalidRow(String),

    #[error("Invalid seat number: {0}")]
    InvalidNumber(i64),

    #[error("Malformed seat label: {0:?}")]
    Malformed(String),
}

impl SeatKey {
    pub fn new(row: char, number: u16) -> Result<Self, SeatKeyError> {
        if !row.is_ascii_uppercase() {
            return Err(SeatKeyError::InvalidRow(row.to_string()));
        }
        if number == 0 {
            return Err(SeatKeyError::InvalidNumber(0));
        }
        Ok(Self { row, number })
    }

    pub fn row(&self) -> char {
        self.row
    }

    pub fn number(&self) -> u16 {
        self.number
    }

    /// Zero-based row position (`A` is 0).
    pub fn row_index(&self) -> usize {
        (self.row as u8 - b'A') as usize
    }
}

impl TryFrom<RawSeatKey> for SeatKey {
    type Error = SeatKeyError;

    fn try_from(raw: RawSeatKey) -> Result<Self, Self::Error> {
        let mut chars = raw.row.chars();
        let row = match (chars.next(), chars.next()) {
            (Some(c), None) => c.to_ascii_uppercase(),
            _ => return Err(SeatKeyError::InvalidRow(raw.row)),
        };
        let number = u16::try_from(raw.seat).map_err(|_| SeatKeyError::InvalidNumber(raw.seat))?;
        SeatKey::new(row, number)
    }
}

impl FromStr for SeatKey {
    type Err = SeatKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let row = chars
            .next()
            .ok_or_else(|| SeatKeyError::Malformed(s.to_string()))?
            .to_ascii_uppercase();
        let number: u16 = chars
            .as_str()
            .parse()
            .map_err(|_| SeatKeyError::Malformed(s.to_string()))?;
        SeatKey::new(row, number)
    }
}

impl fmt::Display for SeatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.number)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Locked,
    Booked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seat {
    #[serde(flatten)]
    pub key: SeatKey,
    pub status: SeatStatus,
}

/// Booked and locked seats of one showtime, as served by `seatStatus`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatStatusReport {
    pub booked_seats: Vec<SeatKey>,
    pub locked_seats: Vec<SeatKey>,
}

/// Point-in-time status of every seat of a showtime, row-major.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatSnapshot {
    pub showtime_id: Uuid,
    pub taken_at: DateTime<Utc>,
    pub rows: Vec<Vec<Seat>>,
}

impl SeatSnapshot {
    pub fn status(&self, key: &SeatKey) -> Option<SeatStatus> {
        self.rows
            .get(key.row_index())?
            .get(key.number() as usize - 1)
            .map(|seat| seat.status)
    }

    pub fn count(&self, status: SeatStatus) -> usize {
        self.rows
            .iter()
            .flatten()
            .filter(|seat| seat.status == status)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_key_parsing() {
        let key: SeatKey = "b5".parse().unwrap();
        assert_eq!(key.row(), 'B');
        assert_eq!(key.number(), 5);
        assert_eq!(key.to_string(), "B5");

        assert!("5B".parse::<SeatKey>().is_err());
        assert!("A0".parse::<SeatKey>().is_err());
        assert!("".parse::<SeatKey>().is_err());
        assert!("Ä1".parse::<SeatKey>().is_err());
    }

    #[test]
    fn test_seat_key_wire_format() {
        let key = SeatKey::new('C', 12).unwrap();
        let json = serde_json::to_value(key).unwrap();
        assert_eq!(json, serde_json::json!({ "row": "C", "seat": 12 }));

        let back: SeatKey = serde_json::from_value(json).unwrap();
        assert_eq!(back, key);

        // Malformed payloads are rejected at the boundary
        assert!(serde_json::from_value::<SeatKey>(serde_json::json!({ "row": "AB", "seat": 1 })).is_err());
        assert!(serde_json::from_value::<SeatKey>(serde_json::json!({ "row": "A", "seat": -3 })).is_err());
        assert!(serde_json::from_value::<SeatKey>(serde_json::json!({ "row": "7", "seat": 1 })).is_err());
    }

    #[test]
    fn test_seat_key_ordering() {
        let mut keys: Vec<SeatKey> = ["B2", "A10", "A2", "B1"].iter().map(|s| s.parse().unwrap()).collect();
        keys.sort();
        let labels: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        assert_eq!(labels, vec!["A2", "A10", "B1", "B2"]);
    }
}
