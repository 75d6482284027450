use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Billing subset of a user profile: a denormalized mirror of subscription
/// state for fast reads, plus the virtual-currency balance.
///
/// `subscription_expires_at` is copied from the subscription's period end in
/// the same database transaction, so the two cannot drift.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub subscription_status: String,
    pub subscription_plan_id: Option<Uuid>,
    pub subscription_expires_at: Option<time::OffsetDateTime>,
    pub credits_balance: i64,
}
