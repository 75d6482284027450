use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::billing_repository::{BillingRepository, ChargeApplication, ChargeOutcome};
use crate::models::{
    plan::SubscriptionPlan,
    profile::UserProfile,
    subscription::{UserSubscription, SUBSCRIPTION_STATUS_ACTIVE, SUBSCRIPTION_STATUS_CANCELLED},
};

pub struct PostgresBillingRepository {
    pub pool: PgPool,
}

#[async_trait]
impl BillingRepository for PostgresBillingRepository {
    async fn find_active_plan(
        &self,
        plan_id: Uuid,
    ) -> Result<Option<SubscriptionPlan>, sqlx::Error> {
        sqlx::query_as::<_, SubscriptionPlan>(
            r#"
            SELECT id, name, price, monthly_credits, features, is_active, created_at
            FROM subscription_plans
            WHERE id = $1 AND is_active
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_active_plans(&self) -> Result<Vec<SubscriptionPlan>, sqlx::Error> {
        sqlx::query_as::<_, SubscriptionPlan>(
            r#"
            SELECT id, name, price, monthly_credits, features, is_active, created_at
            FROM subscription_plans
            WHERE is_active
            ORDER BY price
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    async fn find_subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserSubscription>, sqlx::Error> {
        sqlx::query_as::<_, UserSubscription>(
            r#"
            SELECT id, user_id, plan_id, status, current_period_start, current_period_end,
                   provider_customer_code, provider_subscription_code, created_at, updated_at
            FROM user_subscriptions
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT user_id, subscription_status, subscription_plan_id,
                   subscription_expires_at, credits_balance
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn apply_successful_charge(
        &self,
        charge: &ChargeApplication,
    ) -> Result<ChargeOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Upsert keyed on user_id: renewal extends the period and reactivates
        // a cancelled subscription. Provider codes are kept if the provider
        // omitted them on this event.
        let subscription_id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO user_subscriptions
                (id, user_id, plan_id, status, current_period_start, current_period_end,
                 provider_customer_code, provider_subscription_code, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            ON CONFLICT (user_id) DO UPDATE
            SET plan_id = EXCLUDED.plan_id,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                provider_customer_code =
                    COALESCE(EXCLUDED.provider_customer_code, user_subscriptions.provider_customer_code),
                provider_subscription_code =
                    COALESCE(EXCLUDED.provider_subscription_code, user_subscriptions.provider_subscription_code),
                updated_at = EXCLUDED.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(charge.user_id)
        .bind(charge.plan_id)
        .bind(SUBSCRIPTION_STATUS_ACTIVE)
        .bind(charge.period_start)
        .bind(charge.period_end)
        .bind(charge.customer_code.as_deref())
        .bind(charge.subscription_code.as_deref())
        .bind(charge.paid_at)
        .fetch_one(&mut *tx)
        .await?;

        // The unique payment reference is the idempotency key. A conflict
        // means this delivery was already applied; roll everything back so
        // the upsert above leaves no trace either.
        let inserted = sqlx::query(
            r#"
            INSERT INTO subscription_transactions
                (id, subscription_id, payment_reference, amount, status, paid_at)
            VALUES ($1, $2, $3, $4, 'success', $5)
            ON CONFLICT (payment_reference) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(subscription_id)
        .bind(&charge.payment_reference)
        .bind(charge.amount)
        .bind(charge.paid_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            return Ok(ChargeOutcome::AlreadyProcessed);
        }

        // Profile mirror and credit grant in one statement: the expiry is the
        // period end computed by the caller, and the balance is incremented
        // in SQL rather than read back and rewritten.
        sqlx::query(
            r#"
            INSERT INTO user_profiles
                (user_id, subscription_status, subscription_plan_id,
                 subscription_expires_at, credits_balance)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO UPDATE
            SET subscription_status = EXCLUDED.subscription_status,
                subscription_plan_id = EXCLUDED.subscription_plan_id,
                subscription_expires_at = EXCLUDED.subscription_expires_at,
                credits_balance = user_profiles.credits_balance + EXCLUDED.credits_balance
            "#,
        )
        .bind(charge.user_id)
        .bind(SUBSCRIPTION_STATUS_ACTIVE)
        .bind(charge.plan_id)
        .bind(charge.period_end)
        .bind(charge.credits)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ChargeOutcome::Applied)
    }

    async fn cancel_subscription(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE user_subscriptions
            SET status = $2, updated_at = $3
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(SUBSCRIPTION_STATUS_CANCELLED)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            r#"
            UPDATE user_profiles
            SET subscription_status = $2
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .bind(SUBSCRIPTION_STATUS_CANCELLED)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }
}
