use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A purchasable subscription tier. Read-only reference data; clients never
/// write plans.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionPlan {
    pub id: Uuid,
    pub name: String,
    /// Price in the currency's minor unit (kobo, cents, ...).
    pub price: i64,
    /// Virtual-currency credits granted per successful monthly payment.
    pub monthly_credits: i64,
    pub features: serde_json::Value,
    pub is_active: bool,
    pub created_at: time::OffsetDateTime,
}
