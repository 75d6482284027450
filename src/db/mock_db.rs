#![allow(dead_code)]
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::billing_repository::{
    BillingRepository, ChargeApplication, ChargeOutcome,
};
use crate::models::{
    plan::SubscriptionPlan,
    profile::UserProfile,
    subscription::{
        SubscriptionTransaction, UserSubscription, SUBSCRIPTION_STATUS_ACTIVE,
        SUBSCRIPTION_STATUS_CANCELLED,
    },
};

/// In-memory stand-in for the Postgres repository. Applies the same
/// all-or-nothing semantics so handler tests observe realistic state.
#[derive(Clone, Default)]
pub struct MockBillingRepository {
    pub plans: Arc<Mutex<Vec<SubscriptionPlan>>>,
    pub subscriptions: Arc<Mutex<HashMap<Uuid, UserSubscription>>>,
    pub transactions: Arc<Mutex<Vec<SubscriptionTransaction>>>,
    pub profiles: Arc<Mutex<HashMap<Uuid, UserProfile>>>,
    pub apply_calls: Arc<Mutex<usize>>,
    /// When set, apply_successful_charge fails with a database error.
    pub fail_apply: Arc<Mutex<bool>>,
}

impl MockBillingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plan(self, plan: SubscriptionPlan) -> Self {
        self.plans.lock().unwrap().push(plan);
        self
    }

    pub fn test_plan(id: Uuid, price: i64, monthly_credits: i64) -> SubscriptionPlan {
        SubscriptionPlan {
            id,
            name: "Premium".into(),
            price,
            monthly_credits,
            features: serde_json::json!(["premium-games", "no-ads"]),
            is_active: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[async_trait]
impl BillingRepository for MockBillingRepository {
    async fn find_active_plan(
        &self,
        plan_id: Uuid,
    ) -> Result<Option<SubscriptionPlan>, sqlx::Error> {
        Ok(self
            .plans
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == plan_id && p.is_active)
            .cloned())
    }

    async fn list_active_plans(&self) -> Result<Vec<SubscriptionPlan>, sqlx::Error> {
        let mut plans: Vec<SubscriptionPlan> = self
            .plans
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        plans.sort_by_key(|p| p.price);
        Ok(plans)
    }

    async fn find_subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserSubscription>, sqlx::Error> {
        Ok(self.subscriptions.lock().unwrap().get(&user_id).cloned())
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>, sqlx::Error> {
        Ok(self.profiles.lock().unwrap().get(&user_id).cloned())
    }

    async fn apply_successful_charge(
        &self,
        charge: &ChargeApplication,
    ) -> Result<ChargeOutcome, sqlx::Error> {
        *self.apply_calls.lock().unwrap() += 1;

        if *self.fail_apply.lock().unwrap() {
            return Err(sqlx::Error::PoolClosed);
        }

        // Duplicate reference: nothing may change, mirroring the rollback.
        {
            let transactions = self.transactions.lock().unwrap();
            if transactions
                .iter()
                .any(|t| t.payment_reference == charge.payment_reference)
            {
                return Ok(ChargeOutcome::AlreadyProcessed);
            }
        }

        let subscription_id = {
            let mut subs = self.subscriptions.lock().unwrap();
            match subs.get_mut(&charge.user_id) {
                Some(sub) => {
                    sub.plan_id = charge.plan_id;
                    sub.status = SUBSCRIPTION_STATUS_ACTIVE.into();
                    sub.current_period_start = charge.period_start;
                    sub.current_period_end = Some(charge.period_end);
                    if charge.customer_code.is_some() {
                        sub.provider_customer_code = charge.customer_code.clone();
                    }
                    if charge.subscription_code.is_some() {
                        sub.provider_subscription_code = charge.subscription_code.clone();
                    }
                    sub.updated_at = charge.paid_at;
                    sub.id
                }
                None => {
                    let id = Uuid::new_v4();
                    subs.insert(
                        charge.user_id,
                        UserSubscription {
                            id,
                            user_id: charge.user_id,
                            plan_id: charge.plan_id,
                            status: SUBSCRIPTION_STATUS_ACTIVE.into(),
                            current_period_start: charge.period_start,
                            current_period_end: Some(charge.period_end),
                            provider_customer_code: charge.customer_code.clone(),
                            provider_subscription_code: charge.subscription_code.clone(),
                            created_at: charge.paid_at,
                            updated_at: charge.paid_at,
                        },
                    );
                    id
                }
            }
        };

        self.transactions
            .lock()
            .unwrap()
            .push(SubscriptionTransaction {
                id: Uuid::new_v4(),
                subscription_id,
                payment_reference: charge.payment_reference.clone(),
                amount: charge.amount,
                status: "success".into(),
                paid_at: charge.paid_at,
            });

        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .entry(charge.user_id)
            .or_insert_with(|| UserProfile {
                user_id: charge.user_id,
                subscription_status: SUBSCRIPTION_STATUS_ACTIVE.into(),
                subscription_plan_id: None,
                subscription_expires_at: None,
                credits_balance: 0,
            });
        profile.subscription_status = SUBSCRIPTION_STATUS_ACTIVE.into();
        profile.subscription_plan_id = Some(charge.plan_id);
        profile.subscription_expires_at = Some(charge.period_end);
        profile.credits_balance += charge.credits;

        Ok(ChargeOutcome::Applied)
    }

    async fn cancel_subscription(&self, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let mut subs = self.subscriptions.lock().unwrap();
        let Some(sub) = subs.get_mut(&user_id) else {
            return Ok(false);
        };
        sub.status = SUBSCRIPTION_STATUS_CANCELLED.into();
        sub.updated_at = OffsetDateTime::now_utc();

        if let Some(profile) = self.profiles.lock().unwrap().get_mut(&user_id) {
            profile.subscription_status = SUBSCRIPTION_STATUS_CANCELLED.into();
        }
        Ok(true)
    }
}
