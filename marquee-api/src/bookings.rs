use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Extension, Json, Router,
};
use marquee_core::ReservationError;
use marquee_order::{BookingReceipt, CheckoutHandoff, CheckoutOrchestrator, ReservationSession};
use marquee_shared::{SeatEvent, SeatKey};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::showtimes::load_showtime;
use crate::{error::AppError, middleware::HolderClaims, state::AppState};

#[derive(Debug, Deserialize)]
struct ConfirmRequest {
    seats: Vec<SeatKey>,
    payment_ref: String,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/showtimes/{id}/confirm", post(confirm_seats))
}

/// Pay for and book seats the caller currently holds.
///
/// Every seat must be under an active lease of the caller. Seats held by
/// someone else, booked, or whose lease lapsed fail the whole request with
/// 409, and the booking itself re-checks the leases atomically.
async fn confirm_seats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<HolderClaims>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Json<BookingReceipt>, AppError> {
    let Json(mut req) = payload?;
    if req.seats.is_empty() {
        return Err(ReservationError::EmptySelection.into());
    }
    req.seats.sort();
    req.seats.dedup();

    let showtime = load_showtime(&state, id).await?;
    let holder = claims.holder();

    // Take over the caller's live leases. Nothing here acquires, so a seat
    // the caller does not hold can never enter the booking.
    let mut session = ReservationSession::new(
        showtime,
        holder.clone(),
        state.locks.clone(),
        state.business_rules.seat_hold(),
    );
    for seat in &req.seats {
        session.adopt(*seat).await?;
    }

    let checkout = CheckoutHandoff::new(state.backend.clone(), state.clock.clone())
        .prepare(&session)
        .await?;
    let orchestrator = CheckoutOrchestrator::new(state.payments.clone(), state.backend.clone(), state.clock.clone());

    match orchestrator.complete(&checkout, &req.payment_ref).await {
        Ok(receipt) => {
            info!("Booking {} for {} on showtime {}", receipt.booking_id, holder, id);
            state.publish(SeatEvent::Booked {
                showtime_id: id,
                seats: receipt.seats.clone(),
                at: receipt.confirmed_at.timestamp(),
            });
            Ok(Json(receipt))
        }
        Err(err) => {
            // The orchestrator hands the seats back on every failure
            warn!("Checkout for {} on showtime {} failed: {}", holder, id, err);
            state.publish(SeatEvent::Released {
                showtime_id: id,
                seats: checkout.seats().to_vec(),
                at: state.clock.now().timestamp(),
            });
            Err(err.into())
        }
    }
}
