use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures_util::stream::{Stream, StreamExt};
use marquee_catalog::merge_snapshot;
use marquee_shared::{SeatSnapshot, SeatStatusReport, Showtime};
use std::convert::Infallible;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/showtimes/{id}", get(get_showtime))
        .route("/v1/showtimes/{id}/seats", get(get_seat_status))
        .route("/v1/showtimes/{id}/snapshot", get(get_snapshot))
        .route("/v1/showtimes/{id}/stream", get(stream_seat_events))
}

pub(crate) async fn load_showtime(state: &AppState, showtime_id: Uuid) -> Result<Showtime, AppError> {
    state
        .backend
        .showtime(showtime_id)
        .await?
        .ok_or_else(|| AppError::NotFoundError(format!("Showtime {} not found", showtime_id)))
}

async fn get_showtime(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Showtime>, AppError> {
    Ok(Json(load_showtime(&state, id).await?))
}

async fn get_seat_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SeatStatusReport>, AppError> {
    Ok(Json(state.backend.seat_status(id).await?))
}

async fn get_snapshot(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<SeatSnapshot>, AppError> {
    let showtime = load_showtime(&state, id).await?;
    let report = state.backend.seat_status(id).await?;
    Ok(Json(merge_snapshot(&showtime, &report, state.clock.now())))
}

/// Seat changes for one showtime as server-sent events. Purely advisory:
/// clients still re-check on every lock attempt.
async fn stream_seat_events(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    load_showtime(&state, id).await?;

    let rx = state.sse_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.showtime_id() == id => {
                Event::default().event(event.name()).json_data(&event).ok().map(Ok)
            }
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!("SSE subscriber for showtime {} lagged, skipped {} events", id, skipped);
                None
            }
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
