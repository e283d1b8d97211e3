use chrono::{DateTime, Utc};
use marquee_core::{Clock, CoreResult, ReservationBackend, ReservationError};
use marquee_shared::{HolderId, SeatKey, Showtime};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::session::ReservationSession;

/// Immutable bundle handed to the payment/booking collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutPayload {
    showtime: Showtime,
    holder: HolderId,
    seats: Vec<SeatKey>,
    price_per_seat_cents: i64,
    total_amount_cents: i64,
    prepared_at: DateTime<Utc>,
}

impl CheckoutPayload {
    pub fn showtime(&self) -> &Showtime {
        &self.showtime
    }

    pub fn holder(&self) -> &HolderId {
        &self.holder
    }

    pub fn seats(&self) -> &[SeatKey] {
        &self.seats
    }

    pub fn price_per_seat_cents(&self) -> i64 {
        self.price_per_seat_cents
    }

    pub fn total_amount_cents(&self) -> i64 {
        self.total_amount_cents
    }

    pub fn prepared_at(&self) -> DateTime<Utc> {
        self.prepared_at
    }
}

/// Gate between "selecting" and "paying". Never confirms a booking itself.
pub struct CheckoutHandoff {
    backend: Arc<dyn ReservationBackend>,
    clock: Arc<dyn Clock>,
}

impl CheckoutHandoff {
    pub fn new(backend: Arc<dyn ReservationBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    pub async fn prepare(&self, session: &ReservationSession) -> CoreResult<CheckoutPayload> {
        if session.is_empty() {
            return Err(ReservationError::EmptySelection);
        }

        let showtime_id = session.showtime().id;
        let showtime = self
            .backend
            .showtime(showtime_id)
            .await?
            .ok_or(ReservationError::ShowtimeUnavailable(showtime_id))?;

        let now = self.clock.now();
        if showtime.has_started(now) {
            return Err(ReservationError::ShowtimeUnavailable(showtime_id));
        }

        let seats = session.selection();
        let price_per_seat_cents = showtime.price_cents;
        let total_amount_cents = seats.len() as i64 * price_per_seat_cents;

        info!(
            "Checkout prepared for {} on showtime {}: {} seat(s), {} cents",
            session.holder(),
            showtime_id,
            seats.len(),
            total_amount_cents
        );

        Ok(CheckoutPayload {
            showtime,
            holder: session.holder().clone(),
            seats,
            price_per_seat_cents,
            total_amount_cents,
            prepared_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{backend, PRICE};
    use chrono::Duration;
    use marquee_catalog::InMemoryBackend;
    use marquee_core::ManualClock;

    fn key(label: &str) -> SeatKey {
        label.parse().unwrap()
    }

    #[tokio::test]
    async fn test_prepare_packages_selection() {
        let (backend, clock, show) = backend();
        let handoff = CheckoutHandoff::new(backend.clone(), clock.clone());
        let mut session = ReservationSession::new(show.clone(), "guest-1".into(), backend.clone(), Duration::seconds(60));

        assert_eq!(handoff.prepare(&session).await.unwrap_err(), ReservationError::EmptySelection);

        session.toggle(key("D4")).await.unwrap();
        let payload = handoff.prepare(&session).await.unwrap();
        assert_eq!(payload.seats(), &[key("D4")]);
        assert_eq!(payload.total_amount_cents(), PRICE);
        assert_eq!(payload.showtime().id, show.id);
        assert_eq!(payload.holder().as_str(), "guest-1");

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["seats"], serde_json::json!([{ "row": "D", "seat": 4 }]));

        // Preparing has no side effects on the leases
        assert!(backend.coordinator().lease(show.id, key("D4")).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_prepare_requires_known_upcoming_showtime() {
        let clock = Arc::new(ManualClock::default());
        let (backend, _, show) = backend();
        let mut session = ReservationSession::new(show.clone(), "guest-1".into(), backend.clone(), Duration::seconds(60));
        session.toggle(key("A1")).await.unwrap();

        // A backend that has never heard of the showtime
        let empty = Arc::new(InMemoryBackend::new(clock.clone()));
        let handoff = CheckoutHandoff::new(empty, clock.clone());
        assert_eq!(
            handoff.prepare(&session).await.unwrap_err(),
            ReservationError::ShowtimeUnavailable(show.id)
        );

        // The screening has already begun
        let handoff = CheckoutHandoff::new(backend, clock.clone());
        clock.set(show.start_time + Duration::minutes(1));
        assert_eq!(
            handoff.prepare(&session).await.unwrap_err(),
            ReservationError::ShowtimeUnavailable(show.id)
        );
    }
}
