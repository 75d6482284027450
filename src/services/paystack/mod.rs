use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum PaystackServiceError {
    #[error("paystack api error: {0}")]
    Api(String),
    #[error("webhook signature verification failed: {0}")]
    Signature(String),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("other error: {0}")]
    Other(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitializeTransactionRequest {
    pub email: String,
    /// Charge amount in the currency's minor unit, as Paystack expects.
    pub amount: i64,
    pub callback_url: String,
    pub metadata: serde_json::Value,
}

/// Hosted checkout session handle returned by `/transaction/initialize`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionInit {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// A verified webhook delivery: the event name plus the full envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaystackEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait PaystackService: Send + Sync {
    async fn initialize_transaction(
        &self,
        req: InitializeTransactionRequest,
    ) -> Result<TransactionInit, PaystackServiceError>;

    /// Checks the `x-paystack-signature` header (HMAC-SHA512 of the raw body
    /// keyed with the secret key) before the payload is parsed at all.
    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<PaystackEvent, PaystackServiceError>;
}

mod live;
mod mock;

pub use live::LivePaystackService;
pub use mock::MockPaystackService;
