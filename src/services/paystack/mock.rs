#![allow(dead_code)]
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use super::{
    InitializeTransactionRequest, PaystackEvent, PaystackService, PaystackServiceError,
    TransactionInit,
};

#[derive(Clone, Default)]
pub struct MockPaystackService {
    pub initialize_requests: Arc<Mutex<Vec<InitializeTransactionRequest>>>,
    pub events: Arc<Mutex<Vec<PaystackEvent>>>,
    /// When set, initialize_transaction fails with this message.
    pub initialize_error: Arc<Mutex<Option<String>>>,
}

impl MockPaystackService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_with(self, message: &str) -> Self {
        *self.initialize_error.lock().unwrap() = Some(message.to_string());
        self
    }
}

fn make_id(prefix: &str) -> String {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    format!("{}_{}", prefix, ts)
}

#[async_trait]
impl PaystackService for MockPaystackService {
    async fn initialize_transaction(
        &self,
        req: InitializeTransactionRequest,
    ) -> Result<TransactionInit, PaystackServiceError> {
        self.initialize_requests.lock().unwrap().push(req);

        if let Some(msg) = self.initialize_error.lock().unwrap().clone() {
            return Err(PaystackServiceError::Api(msg));
        }

        let reference = make_id("ref_test");
        Ok(TransactionInit {
            authorization_url: "https://example.test/checkout".into(),
            access_code: make_id("ac_test"),
            reference,
        })
    }

    // Accepts any signature; tests exercise real verification against the
    // live service.
    fn verify_webhook(
        &self,
        payload: &[u8],
        _signature_header: &str,
    ) -> Result<PaystackEvent, PaystackServiceError> {
        let val: serde_json::Value = serde_json::from_slice(payload)
            .map_err(|e| PaystackServiceError::Serde(e.to_string()))?;
        let event = val
            .get("event")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let evt = PaystackEvent {
            event,
            payload: val,
        };
        self.events.lock().unwrap().push(evt.clone());
        Ok(evt)
    }
}
