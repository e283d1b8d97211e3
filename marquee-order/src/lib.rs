pub mod checkout;
pub mod orchestrator;
pub mod session;

pub use checkout::{CheckoutHandoff, CheckoutPayload};
pub use orchestrator::{BookingReceipt, CheckoutOrchestrator, MockPaymentAdapter};
pub use session::{ReservationSession, SelectionChanged};

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{Duration, Utc};
    use marquee_catalog::InMemoryBackend;
    use marquee_core::ManualClock;
    use marquee_shared::Showtime;
    use std::sync::Arc;
    use uuid::Uuid;

    pub const PRICE: i64 = 950;

    pub fn showtime() -> Showtime {
        let start = Utc::now() + Duration::hours(3);
        Showtime {
            id: Uuid::new_v4(),
            theater: "Cinema Paradiso".to_string(),
            screen: "2".to_string(),
            movie: "Vertigo".to_string(),
            start_time: start,
            end_time: start + Duration::minutes(128),
            price_cents: PRICE,
            rows: 5,
            seats_per_row: 8,
        }
    }

    pub fn backend() -> (Arc<InMemoryBackend>, Arc<ManualClock>, Showtime) {
        let clock = Arc::new(ManualClock::default());
        let backend = Arc::new(InMemoryBackend::new(clock.clone()));
        let show = showtime();
        backend.register(show.clone()).unwrap();
        (backend, clock, show)
    }
}
