use chrono::{DateTime, Utc};
use marquee_core::payment::{PaymentAdapter, PaymentIntent, PaymentStatus};
use marquee_core::{Clock, CoreResult, ReservationBackend, ReservationError};
use marquee_shared::{HolderId, SeatKey};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::checkout::CheckoutPayload;

#[derive(Debug, Clone, Serialize)]
pub struct BookingReceipt {
    pub booking_id: Uuid,
    pub showtime_id: Uuid,
    pub holder: HolderId,
    pub seats: Vec<SeatKey>,
    pub total_amount_cents: i64,
    pub payment_id: Uuid,
    pub confirmed_at: DateTime<Utc>,
}

/// Drives a prepared checkout through payment, then either confirms the
/// seats or hands them back.
pub struct CheckoutOrchestrator {
    payments: Arc<dyn PaymentAdapter>,
    backend: Arc<dyn ReservationBackend>,
    clock: Arc<dyn Clock>,
}

impl CheckoutOrchestrator {
    pub fn new(payments: Arc<dyn PaymentAdapter>, backend: Arc<dyn ReservationBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            payments,
            backend,
            clock,
        }
    }

    /// Charge the payload and confirm its seats.
    ///
    /// A declined or failed charge releases every seat. A charge that
    /// succeeds after a lease lapsed is refunded and the seats are released.
    pub async fn complete(&self, payload: &CheckoutPayload, payment_reference: &str) -> CoreResult<BookingReceipt> {
        let showtime_id = payload.showtime().id;
        let intent = PaymentIntent {
            id: Uuid::new_v4(),
            showtime_id,
            amount_cents: payload.total_amount_cents(),
            reference: payment_reference.to_string(),
            created_at: self.clock.now(),
        };

        let status = match self.payments.process_payment(&intent).await {
            Ok(status) => status,
            Err(e) => {
                error!("Payment {} for showtime {} failed: {}", intent.id, showtime_id, e);
                self.release_seats(payload).await;
                return Err(ReservationError::Backend(e.to_string()));
            }
        };

        if status != PaymentStatus::Succeeded {
            warn!("Payment {} ended as {:?}, releasing seats", intent.id, status);
            self.release_seats(payload).await;
            return Err(ReservationError::PaymentDeclined(format!("{:?}", status)));
        }

        let seats = match self
            .backend
            .confirm_booking(showtime_id, payload.seats(), payload.holder())
            .await
        {
            Ok(seats) => seats,
            Err(err) => {
                warn!("Confirmation after payment {} failed: {}", intent.id, err);
                if let Err(e) = self.payments.refund_payment(&intent).await {
                    error!("Refund of payment {} failed: {}", intent.id, e);
                }
                self.release_seats(payload).await;
                return Err(err);
            }
        };

        let receipt = BookingReceipt {
            booking_id: Uuid::new_v4(),
            showtime_id,
            holder: payload.holder().clone(),
            seats,
            total_amount_cents: payload.total_amount_cents(),
            payment_id: intent.id,
            confirmed_at: self.clock.now(),
        };
        info!("Booking {} confirmed for {}", receipt.booking_id, receipt.holder);
        Ok(receipt)
    }

    async fn release_seats(&self, payload: &CheckoutPayload) {
        let showtime_id = payload.showtime().id;
        for seat in payload.seats() {
            if let Err(e) = self.backend.release(showtime_id, *seat, payload.holder()).await {
                warn!("Release of {} on showtime {} failed: {}", seat, showtime_id, e);
            }
        }
    }
}

/// Payment adapter for local runs and tests.
///
/// References `"decline"` and `"error"` simulate a declined card and an
/// unreachable gateway; anything else succeeds.
#[derive(Default)]
pub struct MockPaymentAdapter {
    refunds: Mutex<Vec<Uuid>>,
}

impl MockPaymentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refunds(&self) -> Vec<Uuid> {
        self.refunds.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait::async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn process_payment(&self, payment: &PaymentIntent) -> Result<PaymentStatus, Box<dyn std::error::Error + Send + Sync>> {
        match payment.reference.as_str() {
            "error" => Err("Simulated payment gateway failure".into()),
            "decline" => Ok(PaymentStatus::Failed),
            _ => Ok(PaymentStatus::Succeeded),
        }
    }

    async fn refund_payment(&self, payment: &PaymentIntent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.refunds.lock().unwrap_or_else(PoisonError::into_inner).push(payment.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkout::CheckoutHandoff;
    use crate::fixtures::{backend, PRICE};
    use crate::session::ReservationSession;
    use chrono::Duration;
    use marquee_shared::SeatStatus;

    fn key(label: &str) -> SeatKey {
        label.parse().unwrap()
    }

    #[tokio::test]
    async fn test_successful_payment_books_seats() {
        let (backend, clock, show) = backend();
        let payments = Arc::new(MockPaymentAdapter::new());
        let orchestrator = CheckoutOrchestrator::new(payments.clone(), backend.clone(), clock.clone());
        let handoff = CheckoutHandoff::new(backend.clone(), clock.clone());

        let mut session = ReservationSession::new(show.clone(), "guest-1".into(), backend.clone(), Duration::seconds(60));
        session.toggle(key("C4")).await.unwrap();
        session.toggle(key("C5")).await.unwrap();
        let payload = handoff.prepare(&session).await.unwrap();

        let receipt = orchestrator.complete(&payload, "tok_visa").await.unwrap();
        assert_eq!(receipt.seats, vec![key("C4"), key("C5")]);
        assert_eq!(receipt.total_amount_cents, 2 * PRICE);

        let snapshot = backend.snapshot(show.id).unwrap();
        assert_eq!(snapshot.status(&key("C4")), Some(SeatStatus::Booked));
        assert_eq!(snapshot.status(&key("C5")), Some(SeatStatus::Booked));
        assert!(payments.refunds().is_empty());
    }

    #[tokio::test]
    async fn test_declined_payment_releases_seats() {
        let (backend, clock, show) = backend();
        let orchestrator = CheckoutOrchestrator::new(Arc::new(MockPaymentAdapter::new()), backend.clone(), clock.clone());
        let handoff = CheckoutHandoff::new(backend.clone(), clock.clone());

        for reference in ["decline", "error"] {
            let mut session = ReservationSession::new(show.clone(), "guest-1".into(), backend.clone(), Duration::seconds(60));
            session.toggle(key("A1")).await.unwrap();
            let payload = handoff.prepare(&session).await.unwrap();

            let err = orchestrator.complete(&payload, reference).await.unwrap_err();
            assert!(matches!(err, ReservationError::PaymentDeclined(_) | ReservationError::Backend(_)));
            assert_eq!(backend.snapshot(show.id).unwrap().status(&key("A1")), Some(SeatStatus::Available));
        }
    }

    #[tokio::test]
    async fn test_lapsed_lease_refunds_charge() {
        let (backend, clock, show) = backend();
        let payments = Arc::new(MockPaymentAdapter::new());
        let orchestrator = CheckoutOrchestrator::new(payments.clone(), backend.clone(), clock.clone());
        let handoff = CheckoutHandoff::new(backend.clone(), clock.clone());

        let mut session = ReservationSession::new(show.clone(), "guest-1".into(), backend.clone(), Duration::seconds(60));
        session.toggle(key("E1")).await.unwrap();
        let payload = handoff.prepare(&session).await.unwrap();

        clock.advance(Duration::seconds(90));
        let err = orchestrator.complete(&payload, "tok_visa").await.unwrap_err();
        assert_eq!(err, ReservationError::SeatNoLongerAvailable(key("E1")));
        assert_eq!(payments.refunds().len(), 1);
        assert_eq!(backend.snapshot(show.id).unwrap().count(SeatStatus::Booked), 0);
    }
}
