use axum::Json;
use axum::{extract::State, response::IntoResponse};
use axum::response::Response;
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::responses::JsonResponse;
use crate::services::paystack::InitializeTransactionRequest;
use crate::state::AppState;
use crate::utils::jwt::{decode_jwt, Claims};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_id: Uuid,
    pub email: String,
}

// Tokens are minted by the platform's auth service; this service only
// verifies issuer, audience and expiry.
fn authenticate(
    state: &AppState,
    bearer: Option<&TypedHeader<Authorization<Bearer>>>,
) -> Result<Claims, Response> {
    let token = match bearer {
        Some(TypedHeader(Authorization(bearer))) => bearer.token(),
        None => return Err(JsonResponse::unauthorized("Missing bearer token").into_response()),
    };

    decode_jwt(
        token,
        &state.jwt_keys,
        &state.config.jwt_issuer,
        &state.config.jwt_audience,
    )
    .map(|data| data.claims)
    .map_err(|_| JsonResponse::unauthorized("Invalid or expired token").into_response())
}

// POST /api/billing/checkout
//
// Asks the provider for a hosted checkout session. Nothing is persisted
// here; the subscription only materializes when the charge webhook lands.
pub async fn start_checkout(
    State(app_state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    Json(req): Json<CheckoutRequest>,
) -> Response {
    let claims = match authenticate(&app_state, bearer.as_ref()) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };

    if req.email.trim().is_empty() {
        return JsonResponse::bad_request("Email is required").into_response();
    }

    let plan = match app_state.db.find_active_plan(req.plan_id).await {
        Ok(Some(plan)) => plan,
        Ok(None) => return JsonResponse::not_found("Plan not found").into_response(),
        Err(err) => {
            error!(?err, plan_id = %req.plan_id, "failed to load plan for checkout");
            return JsonResponse::server_error("Failed to load plan").into_response();
        }
    };

    let init = InitializeTransactionRequest {
        email: req.email.clone(),
        amount: plan.price,
        callback_url: format!(
            "{}/subscriptions?payment=success",
            app_state.config.frontend_origin
        ),
        metadata: json!({
            "user_id": claims.sub,
            "plan_id": plan.id,
            "subscription": "true"
        }),
    };

    match app_state.paystack.initialize_transaction(init).await {
        Ok(session) => {
            info!(user_id = %claims.sub, plan = %plan.name, reference = %session.reference, "checkout session created");
            Json(json!({
                "authorization_url": session.authorization_url,
                "reference": session.reference
            }))
            .into_response()
        }
        Err(err) => {
            warn!(?err, user_id = %claims.sub, "provider rejected checkout initialization");
            JsonResponse::bad_gateway("Payment provider rejected the checkout request")
                .into_response()
        }
    }
}

// GET /api/billing/subscription
pub async fn get_subscription(
    State(app_state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Response {
    let claims = match authenticate(&app_state, bearer.as_ref()) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };

    let subscription = match app_state.db.find_subscription_for_user(claims.sub).await {
        Ok(sub) => sub,
        Err(err) => {
            error!(?err, user_id = %claims.sub, "failed to load subscription");
            return JsonResponse::server_error("Failed to load subscription").into_response();
        }
    };

    let profile = match app_state.db.find_profile(claims.sub).await {
        Ok(profile) => profile,
        Err(err) => {
            error!(?err, user_id = %claims.sub, "failed to load profile");
            return JsonResponse::server_error("Failed to load profile").into_response();
        }
    };

    Json(json!({ "subscription": subscription, "profile": profile })).into_response()
}

// POST /api/billing/cancel
pub async fn cancel_subscription(
    State(app_state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Response {
    let claims = match authenticate(&app_state, bearer.as_ref()) {
        Ok(claims) => claims,
        Err(resp) => return resp,
    };

    match app_state.db.cancel_subscription(claims.sub).await {
        Ok(true) => {
            info!(user_id = %claims.sub, "subscription cancelled");
            JsonResponse::success("Subscription cancelled").into_response()
        }
        Ok(false) => JsonResponse::not_found("No subscription found").into_response(),
        Err(err) => {
            error!(?err, user_id = %claims.sub, "failed to cancel subscription");
            JsonResponse::server_error("Failed to cancel subscription").into_response()
        }
    }
}

// GET /api/billing/plans
pub async fn list_plans(State(app_state): State<AppState>) -> Response {
    match app_state.db.list_active_plans().await {
        Ok(plans) => Json(plans).into_response(),
        Err(err) => {
            error!(?err, "failed to list plans");
            JsonResponse::server_error("Failed to load plans").into_response()
        }
    }
}
