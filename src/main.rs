use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::http::Method;
use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use playhub_billing::config::Config;
use playhub_billing::db::billing_repository::BillingRepository;
use playhub_billing::db::postgres_billing_repository::PostgresBillingRepository;
use playhub_billing::responses::JsonResponse;
use playhub_billing::routes::billing::{
    cancel_subscription, get_subscription, list_plans, start_checkout,
};
use playhub_billing::routes::paystack::{webhook, webhook_liveness};
use playhub_billing::services::paystack::{LivePaystackService, PaystackService};
use playhub_billing::utils::jwt::JwtKeys;
use playhub_billing::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rate_limit_ms: u64 = std::env::var("RATE_LIMITER_MILLISECONDS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(200);
    let rate_limit_burst: u32 = std::env::var("RATE_LIMITER_BURST")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(20);
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_millisecond(rate_limit_ms)
            .burst_size(rate_limit_burst)
            .use_headers()
            .error_handler(|_err| {
                JsonResponse::too_many_requests(
                    "Too many requests. Please wait a moment and try again.",
                )
                .into_response()
            })
            .finish()
            .unwrap(),
    );

    // Periodically drop idle IPs from the limiter map.
    let governor_limiter = governor_conf.limiter().clone();
    std::thread::spawn(move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            governor_limiter.retain_recent();
        }
    });

    let config = Arc::new(Config::from_env());

    let pg_pool = establish_connection(&config.database_url).await;
    let db = Arc::new(PostgresBillingRepository {
        pool: pg_pool.clone(),
    }) as Arc<dyn BillingRepository>;

    let paystack =
        Arc::new(LivePaystackService::from_settings(&config.paystack)) as Arc<dyn PaystackService>;

    let jwt_keys = Arc::new(JwtKeys::from_env().expect("JWT_SECRET must be set and strong"));

    let state = AppState {
        db,
        paystack,
        config: config.clone(),
        jwt_keys,
    };

    let cors = CorsLayer::new()
        .allow_origin(config.frontend_origin.parse::<HeaderValue>().unwrap())
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true);

    let billing_routes = Router::new()
        .route("/plans", get(list_plans))
        .route("/checkout", post(start_checkout))
        .route("/subscription", get(get_subscription))
        .route("/cancel", post(cancel_subscription));

    let app = Router::new()
        .route("/", get(root))
        .route("/api/paystack/webhook", post(webhook).get(webhook_liveness))
        .nest("/api/billing", billing_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(cors);

    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));

    let listener = TcpListener::bind(addr).await.unwrap();
    info!("billing service listening at http://{}", addr);
    axum::serve(listener, make_service).await.unwrap();
}

async fn root() -> Response {
    JsonResponse::success("playhub billing").into_response()
}

/// Establish a connection to the database and verify it.
async fn establish_connection(database_url: &str) -> PgPool {
    let pool = PgPool::connect(database_url)
        .await
        .expect("Failed to connect to the database");

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .expect("Failed to verify database connection");

    info!("connected to the database");
    pool
}
