use std::env;

/// Paystack API credentials and endpoint.
#[derive(Clone)]
pub struct PaystackSettings {
    pub secret_key: String,
    pub base_url: String,
}

pub struct Config {
    pub database_url: String,
    pub frontend_origin: String,
    pub paystack: PaystackSettings,
    pub jwt_issuer: String,
    pub jwt_audience: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok(); // Load .env file

        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let frontend_origin = env::var("FRONTEND_ORIGIN").expect("FRONTEND_ORIGIN must be set");

        let paystack = PaystackSettings {
            secret_key: env::var("PAYSTACK_SECRET_KEY").expect("PAYSTACK_SECRET_KEY must be set"),
            base_url: env::var("PAYSTACK_BASE_URL")
                .unwrap_or_else(|_| "https://api.paystack.co".to_string()),
        };

        let jwt_issuer = env::var("JWT_ISSUER").unwrap_or_else(|_| "playhub".to_string());
        let jwt_audience = env::var("JWT_AUDIENCE").unwrap_or_else(|_| "playhub-app".to_string());

        Config {
            database_url,
            frontend_origin,
            paystack,
            jwt_issuer,
            jwt_audience,
        }
    }
}
