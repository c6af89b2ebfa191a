//! Provider adapters: a uniform capability over each external mobile-money
//! API. The wire protocols themselves are out of scope; every variant
//! attaches the caller's idempotency key outbound so a duplicate submission
//! yields the original provider reference instead of a second charge. That
//! contract is what makes retrying safe.

pub mod airtel;
pub mod cash;
pub mod mtn;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;

use crate::domain::{FailureReason, Provider};

pub use airtel::AirtelMoneyAdapter;
pub use cash::CashAdapter;
pub use mtn::MtnMomoAdapter;

/// Adapter call failures. Retry classification is a total function over this
/// enum; no exception-type inspection anywhere.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("invalid account: {0}")]
    InvalidAccount(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("provider rejected (permanent={permanent}): {reason}")]
    Rejected { permanent: bool, reason: String },
}

impl ProviderError {
    /// Whether the retry scheduler may re-attempt after this failure.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network(_) => true,
            ProviderError::Rejected { permanent, .. } => !permanent,
            ProviderError::InvalidAccount(_) | ProviderError::InsufficientFunds => false,
        }
    }

    pub fn failure_reason(&self) -> FailureReason {
        match self {
            ProviderError::Network(_) => FailureReason::NetworkError,
            ProviderError::InvalidAccount(_) => FailureReason::InvalidAccount,
            ProviderError::InsufficientFunds => FailureReason::InsufficientFunds,
            ProviderError::Rejected { .. } => FailureReason::ProviderRejected,
        }
    }
}

/// Accepted-for-processing acknowledgment. Not a final outcome; that arrives
/// via webhook or a status poll. Cash acks carry no reference.
#[derive(Debug, Clone)]
pub struct ProviderAck {
    pub provider_reference: Option<String>,
}

/// Result of an explicit status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Pending,
    Successful,
    Failed { reason: String },
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    async fn request_collection(
        &self,
        phone: &str,
        amount: &BigDecimal,
        idempotency_key: &str,
    ) -> Result<ProviderAck, ProviderError>;

    async fn request_disbursement(
        &self,
        phone: &str,
        amount: &BigDecimal,
        idempotency_key: &str,
    ) -> Result<ProviderAck, ProviderError>;

    async fn query_status(&self, provider_reference: &str)
        -> Result<ProviderStatus, ProviderError>;
}

/// Adapter lookup by provider tag. Selected once at transaction creation and
/// stored on the record; resolved again here at dispatch time.
#[derive(Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.provider(), adapter))
            .collect();
        Self { adapters }
    }

    /// MTN, Airtel and Cash sandbox adapters.
    pub fn sandbox() -> Self {
        Self::new(vec![
            Arc::new(MtnMomoAdapter::new()),
            Arc::new(AirtelMoneyAdapter::new()),
            Arc::new(CashAdapter::new()),
        ])
    }

    pub fn adapter(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_is_total() {
        assert!(ProviderError::Network("timeout".into()).is_transient());
        assert!(ProviderError::Rejected {
            permanent: false,
            reason: "busy".into()
        }
        .is_transient());
        assert!(!ProviderError::Rejected {
            permanent: true,
            reason: "blocked".into()
        }
        .is_transient());
        assert!(!ProviderError::InvalidAccount("bad msisdn".into()).is_transient());
        assert!(!ProviderError::InsufficientFunds.is_transient());
    }

    #[test]
    fn failure_reasons() {
        assert_eq!(
            ProviderError::Network("x".into()).failure_reason(),
            FailureReason::NetworkError
        );
        assert_eq!(
            ProviderError::InsufficientFunds.failure_reason(),
            FailureReason::InsufficientFunds
        );
    }

    #[test]
    fn registry_resolves_all_sandbox_providers() {
        let registry = ProviderRegistry::sandbox();
        assert!(registry.adapter(Provider::Mtn).is_some());
        assert!(registry.adapter(Provider::Airtel).is_some());
        assert!(registry.adapter(Provider::Cash).is_some());
    }
}
