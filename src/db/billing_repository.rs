use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::{
    plan::SubscriptionPlan, profile::UserProfile, subscription::UserSubscription,
};

/// Everything the reconciliation step needs to persist for one successful
/// charge. Built once by the webhook handler so period end and profile expiry
/// come from the same computed value.
#[derive(Debug, Clone)]
pub struct ChargeApplication {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub payment_reference: String,
    /// Major-unit amount, already converted from the provider's minor unit.
    pub amount: i64,
    pub customer_code: Option<String>,
    pub subscription_code: Option<String>,
    pub paid_at: OffsetDateTime,
    pub period_start: OffsetDateTime,
    pub period_end: OffsetDateTime,
    /// Credits granted by the plan for this billing period.
    pub credits: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// All four writes committed.
    Applied,
    /// The payment reference was seen before; nothing was changed.
    AlreadyProcessed,
}

#[async_trait]
pub trait BillingRepository: Send + Sync {
    async fn find_active_plan(
        &self,
        plan_id: Uuid,
    ) -> Result<Option<SubscriptionPlan>, sqlx::Error>;

    async fn list_active_plans(&self) -> Result<Vec<SubscriptionPlan>, sqlx::Error>;

    async fn find_subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserSubscription>, sqlx::Error>;

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, sqlx::Error>;

    /// Applies one successful charge atomically: subscription upsert,
    /// transaction audit row, profile mirror, credit grant. Keyed on the
    /// payment reference so at-least-once webhook delivery cannot apply a
    /// charge twice.
    async fn apply_successful_charge(
        &self,
        charge: &ChargeApplication,
    ) -> Result<ChargeOutcome, sqlx::Error>;

    /// Marks the user's subscription cancelled and mirrors the status to the
    /// profile. Returns false when the user has no subscription row.
    async fn cancel_subscription(&self, user_id: Uuid) -> Result<bool, sqlx::Error>;
}
