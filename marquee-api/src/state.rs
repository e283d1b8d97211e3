use marquee_core::payment::PaymentAdapter;
use marquee_core::{Clock, ReservationBackend, SeatLockService};
use marquee_shared::SeatEvent;
use marquee_store::app_config::BusinessRules;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn ReservationBackend>,
    /// Same store as `backend`, seen through the narrower lock interface
    pub locks: Arc<dyn SeatLockService>,
    pub payments: Arc<dyn PaymentAdapter>,
    pub clock: Arc<dyn Clock>,
    pub sse_tx: broadcast::Sender<SeatEvent>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

impl AppState {
    pub fn new<B>(
        backend: Arc<B>,
        payments: Arc<dyn PaymentAdapter>,
        clock: Arc<dyn Clock>,
        auth: AuthConfig,
        business_rules: BusinessRules,
    ) -> Self
    where
        B: ReservationBackend + 'static,
    {
        let (sse_tx, _) = broadcast::channel(business_rules.event_buffer.max(1));
        Self {
            backend: backend.clone(),
            locks: backend,
            payments,
            clock,
            sse_tx,
            auth,
            business_rules,
        }
    }

    /// Fan a seat change out to SSE subscribers. Nobody listening is fine.
    pub fn publish(&self, event: SeatEvent) {
        if self.sse_tx.send(event).is_err() {
            tracing::trace!("No SSE subscribers for seat event");
        }
    }
}
