use axum::{
    extract::{rejection::JsonRejection, Path, State},
    routing::post,
    Extension, Json, Router,
};
use marquee_core::ReleaseOutcome;
use marquee_shared::{Lease, SeatEvent, SeatKey};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::{error::AppError, middleware::HolderClaims, state::AppState};

#[derive(Debug, Serialize)]
struct UnlockResponse {
    status: &'static str,
}

/// Lock routes. Callers layer the holder auth middleware on top.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/showtimes/{id}/lock", post(lock_seat))
        .route("/v1/showtimes/{id}/unlock", post(unlock_seat))
}

async fn lock_seat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<HolderClaims>,
    payload: Result<Json<SeatKey>, JsonRejection>,
) -> Result<Json<Lease>, AppError> {
    let Json(seat) = payload?;
    let holder = claims.holder();

    let lease = state
        .locks
        .acquire(id, seat, &holder, state.business_rules.seat_hold())
        .await?;
    info!("Seat {} on showtime {} held by {} until {}", seat, id, holder, lease.expires_at);

    state.publish(SeatEvent::Locked {
        showtime_id: id,
        seats: vec![seat],
        at: state.clock.now().timestamp(),
    });

    Ok(Json(lease))
}

async fn unlock_seat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<HolderClaims>,
    payload: Result<Json<SeatKey>, JsonRejection>,
) -> Result<Json<UnlockResponse>, AppError> {
    let Json(seat) = payload?;

    let status = match state.locks.release(id, seat, &claims.holder()).await? {
        ReleaseOutcome::Released => {
            state.publish(SeatEvent::Released {
                showtime_id: id,
                seats: vec![seat],
                at: state.clock.now().timestamp(),
            });
            "released"
        }
        ReleaseOutcome::NotHolder => "not_holder",
    };

    Ok(Json(UnlockResponse { status }))
}
