use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const SUBSCRIPTION_STATUS_ACTIVE: &str = "active";
pub const SUBSCRIPTION_STATUS_CANCELLED: &str = "cancelled";

/// Current subscription state for one user. Upserted by `user_id`; status is
/// set to "cancelled" on explicit cancellation, never hard-deleted.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub status: String,
    pub current_period_start: time::OffsetDateTime,
    pub current_period_end: Option<time::OffsetDateTime>,
    /// Opaque customer code assigned by the payment provider, if known.
    pub provider_customer_code: Option<String>,
    /// Opaque subscription code assigned by the payment provider, if known.
    pub provider_subscription_code: Option<String>,
    pub created_at: time::OffsetDateTime,
    pub updated_at: time::OffsetDateTime,
}

impl UserSubscription {
    pub fn is_active(&self) -> bool {
        self.status == SUBSCRIPTION_STATUS_ACTIVE
    }
}

/// Append-only audit record of one successful payment. `payment_reference`
/// is unique, which is what makes webhook redelivery a no-op.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionTransaction {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub payment_reference: String,
    /// Amount in the currency's major unit, converted from the provider's
    /// minor-unit value.
    pub amount: i64,
    pub status: String,
    pub paid_at: time::OffsetDateTime,
}
