//! Airtel Money adapter (sandbox). Same idempotency contract as the MTN
//! adapter; references look like `AIRTEL-1a2b3c4d`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::Provider;

use super::{ProviderAck, ProviderAdapter, ProviderError, ProviderStatus};

#[derive(Default)]
struct SandboxState {
    references_by_key: HashMap<String, String>,
    statuses: HashMap<String, ProviderStatus>,
}

#[derive(Clone, Default)]
pub struct AirtelMoneyAdapter {
    state: Arc<Mutex<SandboxState>>,
}

impl AirtelMoneyAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn resolve(&self, provider_reference: &str, status: ProviderStatus) {
        self.state
            .lock()
            .await
            .statuses
            .insert(provider_reference.to_string(), status);
    }

    async fn request(&self, idempotency_key: &str) -> Result<ProviderAck, ProviderError> {
        let mut state = self.state.lock().await;
        let reference = state
            .references_by_key
            .entry(idempotency_key.to_string())
            .or_insert_with(|| format!("AIRTEL-{}", &Uuid::new_v4().simple().to_string()[..8]))
            .clone();
        state
            .statuses
            .entry(reference.clone())
            .or_insert(ProviderStatus::Pending);
        Ok(ProviderAck {
            provider_reference: Some(reference),
        })
    }
}

#[async_trait]
impl ProviderAdapter for AirtelMoneyAdapter {
    fn provider(&self) -> Provider {
        Provider::Airtel
    }

    async fn request_collection(
        &self,
        phone: &str,
        amount: &BigDecimal,
        idempotency_key: &str,
    ) -> Result<ProviderAck, ProviderError> {
        tracing::debug!(phone, %amount, idempotency_key, "airtel money collection");
        self.request(idempotency_key).await
    }

    async fn request_disbursement(
        &self,
        phone: &str,
        amount: &BigDecimal,
        idempotency_key: &str,
    ) -> Result<ProviderAck, ProviderError> {
        tracing::debug!(phone, %amount, idempotency_key, "airtel money disbursement");
        self.request(idempotency_key).await
    }

    async fn query_status(
        &self,
        provider_reference: &str,
    ) -> Result<ProviderStatus, ProviderError> {
        let state = self.state.lock().await;
        state
            .statuses
            .get(provider_reference)
            .cloned()
            .ok_or_else(|| ProviderError::InvalidAccount(format!(
                "unknown reference: {provider_reference}"
            )))
    }
}
