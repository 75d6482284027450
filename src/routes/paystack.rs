use axum::Json;
use axum::{extract::State, http::HeaderMap, response::IntoResponse};
use axum::{http::StatusCode, response::Response};
use serde_json::json;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::billing_repository::{ChargeApplication, ChargeOutcome};
use crate::responses::JsonResponse;
use crate::state::AppState;

/// Fixed renewal window applied on every successful charge, regardless of
/// the plan's billing cadence.
pub const RENEWAL_PERIOD_DAYS: i64 = 30;

// Small helper: nested json lookup
fn jget<'a>(val: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    let mut cur = val;
    for key in path {
        cur = cur.get(*key)?;
    }
    Some(cur)
}

fn extract_str<'a>(val: &'a serde_json::Value, path: &[&str]) -> Option<&'a str> {
    jget(val, path)?.as_str()
}

fn extract_i64(val: &serde_json::Value, path: &[&str]) -> Option<i64> {
    jget(val, path)?.as_i64()
}

fn extract_uuid(val: &serde_json::Value, path: &[&str]) -> Option<Uuid> {
    Uuid::parse_str(extract_str(val, path)?).ok()
}

// metadata.subscription arrives as "true" from checkout metadata, but accept
// a bare boolean too.
fn is_subscription_charge(payload: &serde_json::Value) -> bool {
    match jget(payload, &["data", "metadata", "subscription"]) {
        Some(v) => v.as_bool() == Some(true) || v.as_str() == Some("true"),
        None => false,
    }
}

fn acknowledged() -> Response {
    (StatusCode::OK, "OK").into_response()
}

// POST /api/paystack/webhook
//
// Unauthenticated except for the body signature; Paystack delivers events
// at least once, so everything past plan validation must be idempotent.
pub async fn webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let sig = match headers
        .get("x-paystack-signature")
        .and_then(|h| h.to_str().ok())
    {
        Some(s) => s,
        None => return JsonResponse::bad_request("Missing x-paystack-signature").into_response(),
    };

    let evt = match app_state.paystack.verify_webhook(&body, sig) {
        Ok(e) => e,
        Err(err) => {
            warn!(?err, "paystack webhook verification failed");
            return (StatusCode::BAD_REQUEST, "invalid webhook").into_response();
        }
    };

    if evt.event != "charge.success" {
        info!(event = %evt.event, "unhandled paystack event acknowledged");
        return acknowledged();
    }

    let payload = &evt.payload;

    // Not every charge is a subscription payment; those are acknowledged
    // without touching any state.
    let reference = extract_str(payload, &["data", "reference"]).map(|s| s.to_string());
    let user_id = extract_uuid(payload, &["data", "metadata", "user_id"]);
    let plan_id = extract_uuid(payload, &["data", "metadata", "plan_id"]);

    let (reference, user_id, plan_id) = match (
        is_subscription_charge(payload),
        reference,
        user_id,
        plan_id,
    ) {
        (true, Some(reference), Some(user_id), Some(plan_id)) => (reference, user_id, plan_id),
        _ => {
            info!("charge.success without subscription metadata ignored");
            return acknowledged();
        }
    };

    // An unknown plan is the one hard failure: returning non-2xx makes the
    // provider redeliver, which is safe now that application is idempotent.
    let plan = match app_state.db.find_active_plan(plan_id).await {
        Ok(Some(plan)) => plan,
        Ok(None) => {
            warn!(%plan_id, %user_id, "charge references unknown or inactive plan");
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "plan not found" })),
            )
                .into_response();
        }
        Err(err) => {
            error!(?err, %plan_id, "failed to load plan for charge");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "plan lookup failed" })),
            )
                .into_response();
        }
    };

    let amount_minor = match extract_i64(payload, &["data", "amount"]) {
        Some(amount) => amount,
        None => {
            warn!(%reference, price = plan.price, "charge envelope missing amount; auditing plan price");
            plan.price
        }
    };
    let customer_code =
        extract_str(payload, &["data", "customer", "customer_code"]).map(|s| s.to_string());
    let subscription_code =
        extract_str(payload, &["data", "subscription_code"]).map(|s| s.to_string());

    let now = OffsetDateTime::now_utc();
    let period_end = now + time::Duration::days(RENEWAL_PERIOD_DAYS);
    let charge = ChargeApplication {
        user_id,
        plan_id: plan.id,
        payment_reference: reference.clone(),
        amount: amount_minor / 100,
        customer_code,
        subscription_code,
        paid_at: now,
        period_start: now,
        period_end,
        credits: plan.monthly_credits,
    };

    match app_state.db.apply_successful_charge(&charge).await {
        Ok(ChargeOutcome::Applied) => {
            info!(%user_id, %reference, plan = %plan.name, "applied subscription charge");
            acknowledged()
        }
        Ok(ChargeOutcome::AlreadyProcessed) => {
            info!(%user_id, %reference, "duplicate charge delivery ignored");
            acknowledged()
        }
        Err(err) => {
            error!(?err, %user_id, %reference, "failed to apply subscription charge");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "reconciliation failed" })),
            )
                .into_response()
        }
    }
}

// GET /api/paystack/webhook
pub async fn webhook_liveness() -> Response {
    Json(json!({ "status": "ok", "service": "playhub-billing" })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::billing_repository::BillingRepository;
    use crate::db::mock_db::MockBillingRepository;
    use crate::services::paystack::MockPaystackService;
    use crate::state::test_support::test_state;
    use axum::extract::State as AxumState;
    use axum::http::{HeaderMap, HeaderValue};
    use std::sync::Arc;

    fn signed_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-paystack-signature", HeaderValue::from_static("stub"));
        headers
    }

    fn charge_body(user_id: Uuid, plan_id: Uuid, reference: &str, amount: i64) -> axum::body::Bytes {
        let body = json!({
            "event": "charge.success",
            "data": {
                "reference": reference,
                "status": "success",
                "amount": amount,
                "subscription_code": "SUB_xyz789",
                "metadata": {
                    "user_id": user_id.to_string(),
                    "plan_id": plan_id.to_string(),
                    "subscription": "true"
                },
                "customer": { "customer_code": "CUS_abc123" }
            }
        });
        axum::body::Bytes::from(serde_json::to_vec(&body).unwrap())
    }

    #[tokio::test]
    async fn single_charge_applies_all_four_writes_consistently() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let db = Arc::new(
            MockBillingRepository::new()
                .with_plan(MockBillingRepository::test_plan(plan_id, 250_000, 500)),
        );
        let state = test_state(db.clone(), Arc::new(MockPaystackService::new()));

        let resp = webhook(
            AxumState(state),
            signed_headers(),
            charge_body(user_id, plan_id, "ref_1", 250_000),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"OK");

        let subs = db.subscriptions.lock().unwrap();
        let sub = subs.get(&user_id).expect("subscription row created");
        assert!(sub.is_active());
        assert_eq!(sub.plan_id, plan_id);
        assert_eq!(sub.provider_customer_code.as_deref(), Some("CUS_abc123"));
        assert_eq!(sub.provider_subscription_code.as_deref(), Some("SUB_xyz789"));
        let period_end = sub.current_period_end.expect("period end set");

        let transactions = db.transactions.lock().unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].payment_reference, "ref_1");
        assert_eq!(transactions[0].amount, 2_500); // minor units converted

        let profiles = db.profiles.lock().unwrap();
        let profile = profiles.get(&user_id).expect("profile mirror updated");
        assert_eq!(profile.subscription_expires_at, Some(period_end));
        assert_eq!(profile.subscription_plan_id, Some(plan_id));
        assert_eq!(profile.credits_balance, 500);
    }

    #[tokio::test]
    async fn duplicate_delivery_neither_double_credits_nor_duplicates_audit() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let db = Arc::new(
            MockBillingRepository::new()
                .with_plan(MockBillingRepository::test_plan(plan_id, 250_000, 500)),
        );
        let state = test_state(db.clone(), Arc::new(MockPaystackService::new()));

        for _ in 0..2 {
            let resp = webhook(
                AxumState(state.clone()),
                signed_headers(),
                charge_body(user_id, plan_id, "ref_dup", 250_000),
            )
            .await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        assert_eq!(db.transactions.lock().unwrap().len(), 1);
        assert_eq!(
            db.profiles.lock().unwrap().get(&user_id).unwrap().credits_balance,
            500
        );
    }

    #[tokio::test]
    async fn renewal_charge_reactivates_cancelled_subscription() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let db = Arc::new(
            MockBillingRepository::new()
                .with_plan(MockBillingRepository::test_plan(plan_id, 250_000, 500)),
        );
        let state = test_state(db.clone(), Arc::new(MockPaystackService::new()));

        let resp = webhook(
            AxumState(state.clone()),
            signed_headers(),
            charge_body(user_id, plan_id, "ref_first", 250_000),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let first_period_end = db
            .subscriptions
            .lock()
            .unwrap()
            .get(&user_id)
            .unwrap()
            .current_period_end
            .unwrap();

        assert!(db.cancel_subscription(user_id).await.unwrap());
        assert!(!db.subscriptions.lock().unwrap().get(&user_id).unwrap().is_active());

        // A later renewal arrives with a fresh reference.
        let resp = webhook(
            AxumState(state),
            signed_headers(),
            charge_body(user_id, plan_id, "ref_renewal", 250_000),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let subs = db.subscriptions.lock().unwrap();
        let sub = subs.get(&user_id).unwrap();
        assert!(sub.is_active());
        assert!(sub.current_period_end.unwrap() >= first_period_end);

        assert_eq!(db.transactions.lock().unwrap().len(), 2);
        let profiles = db.profiles.lock().unwrap();
        let profile = profiles.get(&user_id).unwrap();
        assert_eq!(profile.subscription_status, "active");
        assert_eq!(profile.credits_balance, 1_000);
    }

    #[tokio::test]
    async fn charge_without_amount_audits_plan_price() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let db = Arc::new(
            MockBillingRepository::new()
                .with_plan(MockBillingRepository::test_plan(plan_id, 250_000, 500)),
        );
        let state = test_state(db.clone(), Arc::new(MockPaystackService::new()));

        let body = json!({
            "event": "charge.success",
            "data": {
                "reference": "ref_no_amount",
                "metadata": {
                    "user_id": user_id.to_string(),
                    "plan_id": plan_id.to_string(),
                    "subscription": "true"
                }
            }
        });
        let resp = webhook(
            AxumState(state),
            signed_headers(),
            axum::body::Bytes::from(serde_json::to_vec(&body).unwrap()),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::OK);
        let transactions = db.transactions.lock().unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].amount, 2_500);
    }

    #[tokio::test]
    async fn charge_missing_user_metadata_is_acknowledged_noop() {
        let plan_id = Uuid::new_v4();
        let db = Arc::new(
            MockBillingRepository::new()
                .with_plan(MockBillingRepository::test_plan(plan_id, 250_000, 500)),
        );
        let state = test_state(db.clone(), Arc::new(MockPaystackService::new()));

        let body = json!({
            "event": "charge.success",
            "data": {
                "reference": "ref_no_user",
                "amount": 250_000,
                "metadata": { "plan_id": plan_id.to_string(), "subscription": "true" }
            }
        });
        let resp = webhook(
            AxumState(state),
            signed_headers(),
            axum::body::Bytes::from(serde_json::to_vec(&body).unwrap()),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(*db.apply_calls.lock().unwrap(), 0);
        assert!(db.subscriptions.lock().unwrap().is_empty());
        assert!(db.transactions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_plan_is_a_hard_failure_with_no_writes() {
        let db = Arc::new(MockBillingRepository::new());
        let state = test_state(db.clone(), Arc::new(MockPaystackService::new()));

        let resp = webhook(
            AxumState(state),
            signed_headers(),
            charge_body(Uuid::new_v4(), Uuid::new_v4(), "ref_bad_plan", 250_000),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(*db.apply_calls.lock().unwrap(), 0);
        assert!(db.subscriptions.lock().unwrap().is_empty());
        assert!(db.transactions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_signature_header_is_rejected() {
        let db = Arc::new(MockBillingRepository::new());
        let state = test_state(db, Arc::new(MockPaystackService::new()));

        let resp = webhook(
            AxumState(state),
            HeaderMap::new(),
            charge_body(Uuid::new_v4(), Uuid::new_v4(), "ref_unsigned", 1),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_charge_events_are_acknowledged_without_writes() {
        let db = Arc::new(MockBillingRepository::new());
        let state = test_state(db.clone(), Arc::new(MockPaystackService::new()));

        let body = json!({ "event": "transfer.success", "data": { "reference": "tr_1" } });
        let resp = webhook(
            AxumState(state),
            signed_headers(),
            axum::body::Bytes::from(serde_json::to_vec(&body).unwrap()),
        )
        .await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(*db.apply_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn database_failure_returns_500_so_provider_redelivers() {
        let user_id = Uuid::new_v4();
        let plan_id = Uuid::new_v4();
        let db = Arc::new(
            MockBillingRepository::new()
                .with_plan(MockBillingRepository::test_plan(plan_id, 250_000, 500)),
        );
        *db.fail_apply.lock().unwrap() = true;
        let state = test_state(db.clone(), Arc::new(MockPaystackService::new()));

        let resp = webhook(
            AxumState(state),
            signed_headers(),
            charge_body(user_id, plan_id, "ref_err", 250_000),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn liveness_endpoint_reports_ok() {
        let resp = webhook_liveness().await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }
}
