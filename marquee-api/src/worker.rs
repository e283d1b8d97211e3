use anyhow::Context;
use marquee_shared::{SeatEvent, SeatKey};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::state::AppState;

/// Periodically drop lapsed leases and tell SSE subscribers about them.
/// Lock decisions never wait on this; expiry is also checked lazily.
pub async fn start_lease_sweeper(state: AppState, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    info!("Lease sweeper started, running every {:?}", every);

    loop {
        ticker.tick().await;
        if let Err(e) = sweep_once(&state).await {
            error!("Lease sweep failed: {:#}", e);
        }
    }
}

pub async fn sweep_once(state: &AppState) -> anyhow::Result<usize> {
    let expired = state
        .backend
        .sweep_expired()
        .await
        .context("Backend refused the sweep")?;

    let mut by_showtime: BTreeMap<Uuid, Vec<SeatKey>> = BTreeMap::new();
    for lease in &expired {
        by_showtime.entry(lease.showtime_id).or_default().push(lease.seat);
    }

    let at = state.clock.now().timestamp();
    for (showtime_id, seats) in by_showtime {
        debug!("Expired {} lease(s) on showtime {}", seats.len(), showtime_id);
        state.publish(SeatEvent::Expired { showtime_id, seats, at });
    }

    Ok(expired.len())
}
