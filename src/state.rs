use crate::config::Config;
use crate::db::billing_repository::BillingRepository;
use crate::services::paystack::PaystackService;
use crate::utils::jwt::JwtKeys;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn BillingRepository>,
    pub paystack: Arc<dyn PaystackService>,
    pub config: Arc<Config>,
    pub jwt_keys: Arc<JwtKeys>,
}
