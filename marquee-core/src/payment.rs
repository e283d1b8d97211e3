use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

/// A charge request for one checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: Uuid,
    pub showtime_id: Uuid,
    pub amount_cents: i64,
    /// Caller-supplied payment method token / reference
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

/// External payment collaborator. Capture internals are out of scope here.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Charge the intent and report the final status
    async fn process_payment(
        &self,
        payment: &PaymentIntent,
    ) -> Result<PaymentStatus, Box<dyn std::error::Error + Send + Sync>>;

    /// Undo a charge whose booking could not be confirmed
    async fn refund_payment(
        &self,
        payment: &PaymentIntent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
