//! MTN Mobile Money adapter (sandbox).
//!
//! Mirrors the shape of MTN's request-to-pay/disburse flow without speaking
//! the real wire protocol. References look like `MTN-1a2b3c4d` and the
//! adapter keeps an idempotency index: re-submitting the same key returns
//! the original reference, exactly what the production API guarantees via
//! the `X-Reference-Id` header.

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
pub struct MtnMomoAdapter {
    state: Arc<Mutex<SandboxState>>,
}

impl MtnMomoAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settle a sandbox transaction so a later `query_status` poll sees the
    /// outcome. Real deployments get this from MTN's side.
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
            .or_insert_with(|| format!("MTN-{}", &Uuid::new_v4().simple().to_string()[..8]))
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
impl ProviderAdapter for MtnMomoAdapter {
    fn provider(&self) -> Provider {
        Provider::Mtn
    }

    async fn request_collection(
        &self,
        phone: &str,
        amount: &BigDecimal,
        idempotency_key: &str,
    ) -> Result<ProviderAck, ProviderError> {
        tracing::debug!(phone, %amount, idempotency_key, "mtn momo request-to-pay");
        self.request(idempotency_key).await
    }

    async fn request_disbursement(
        &self,
        phone: &str,
        amount: &BigDecimal,
        idempotency_key: &str,
    ) -> Result<ProviderAck, ProviderError> {
        tracing::debug!(phone, %amount, idempotency_key, "mtn momo disbursement");
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
