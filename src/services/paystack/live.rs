use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;
use subtle::ConstantTimeEq;

use super::{
    InitializeTransactionRequest, PaystackEvent, PaystackService, PaystackServiceError,
    TransactionInit,
};

type HmacSha512 = Hmac<Sha512>;

pub struct LivePaystackService {
    client: reqwest::Client,
    secret_key: String,
    base_url: String,
}

#[derive(Deserialize)]
struct ApiEnvelope<T> {
    status: bool,
    message: Option<String>,
    data: Option<T>,
}

impl LivePaystackService {
    pub fn new(secret_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: secret_key.into(),
            base_url: base_url.into(),
        }
    }

    pub fn from_settings(settings: &crate::config::PaystackSettings) -> Self {
        Self::new(settings.secret_key.clone(), settings.base_url.clone())
    }
}

#[async_trait]
impl PaystackService for LivePaystackService {
    async fn initialize_transaction(
        &self,
        req: InitializeTransactionRequest,
    ) -> Result<TransactionInit, PaystackServiceError> {
        let url = format!("{}/transaction/initialize", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| PaystackServiceError::Api(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PaystackServiceError::Api(format!(
                "initialize returned {}: {}",
                status, body
            )));
        }

        let envelope: ApiEnvelope<TransactionInit> = resp
            .json()
            .await
            .map_err(|e| PaystackServiceError::Serde(e.to_string()))?;

        if !envelope.status {
            return Err(PaystackServiceError::Api(
                envelope
                    .message
                    .unwrap_or_else(|| "initialize rejected".to_string()),
            ));
        }

        envelope
            .data
            .ok_or_else(|| PaystackServiceError::Serde("initialize response missing data".into()))
    }

    fn verify_webhook(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<PaystackEvent, PaystackServiceError> {
        let provided = hex::decode(signature_header.trim())
            .map_err(|_| PaystackServiceError::Signature("signature is not valid hex".into()))?;

        let mut mac = HmacSha512::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| PaystackServiceError::Other(e.to_string()))?;
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        if expected.ct_eq(provided.as_slice()).unwrap_u8() != 1 {
            return Err(PaystackServiceError::Signature(
                "signature does not match payload".into(),
            ));
        }

        let payload: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| PaystackServiceError::Serde(e.to_string()))?;
        let event = payload
            .get("event")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();

        Ok(PaystackEvent { event, payload })
    }
}
