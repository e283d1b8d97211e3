use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::seat::SeatKey;

/// Identity of the session/user holding leases (the JWT subject on the HTTP surface).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HolderId(String);

impl HolderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HolderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A time-bounded exclusive claim on one seat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lease {
    pub showtime_id: Uuid,
    pub seat: SeatKey,
    pub holder: HolderId,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// A lease is never honored at or past `expires_at`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_held_by(&self, holder: &HolderId, now: DateTime<Utc>) -> bool {
        self.is_active(now) && &self.holder == holder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_lease_expiry_boundary() {
        let now = Utc::now();
        let lease = Lease {
            showtime_id: Uuid::new_v4(),
            seat: "C1".parse().unwrap(),
            holder: HolderId::new("guest-1"),
            acquired_at: now,
            expires_at: now + Duration::seconds(60),
        };

        assert!(lease.is_active(now + Duration::seconds(59)));
        assert!(!lease.is_active(now + Duration::seconds(60)));
        assert!(lease.is_held_by(&"guest-1".into(), now));
        assert!(!lease.is_held_by(&"guest-2".into(), now));
    }
}
