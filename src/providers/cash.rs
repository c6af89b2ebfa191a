//! Cash variant: a no-op adapter. Collection is acknowledged synchronously
//! with no provider reference; settlement happens manually outside this
//! core. It never fails.

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::domain::Provider;

use super::{ProviderAck, ProviderAdapter, ProviderError, ProviderStatus};

#[derive(Clone, Default)]
pub struct CashAdapter;

impl CashAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProviderAdapter for CashAdapter {
    fn provider(&self) -> Provider {
        Provider::Cash
    }

    async fn request_collection(
        &self,
        phone: &str,
        amount: &BigDecimal,
        idempotency_key: &str,
    ) -> Result<ProviderAck, ProviderError> {
        tracing::debug!(phone, %amount, idempotency_key, "cash collection accepted");
        Ok(ProviderAck {
            provider_reference: None,
        })
    }

    async fn request_disbursement(
        &self,
        phone: &str,
        amount: &BigDecimal,
        idempotency_key: &str,
    ) -> Result<ProviderAck, ProviderError> {
        tracing::debug!(phone, %amount, idempotency_key, "cash disbursement accepted");
        Ok(ProviderAck {
            provider_reference: None,
        })
    }

    async fn query_status(
        &self,
        _provider_reference: &str,
    ) -> Result<ProviderStatus, ProviderError> {
        // Cash has no asynchronous confirmation to poll.
        Ok(ProviderStatus::Successful)
    }
}
