//! Outbound ports. The orchestration core depends exclusively on these
//! traits; concrete adapters live in `crate::adapters`.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use uuid::Uuid;

use crate::domain::{Provider, ReviewEntry, Transaction};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Get/put-by-key persistence for transactions. The engine behind it is out
/// of scope; the core only needs these lookups.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Insert a new transaction. Fails with `Conflict` if the idempotency
    /// key is already taken.
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn get(&self, id: Uuid) -> RepositoryResult<Transaction>;

    /// Persist an updated record. The state machine is the only writer.
    async fn update(&self, tx: &Transaction) -> RepositoryResult<()>;

    async fn find_by_idempotency_key(&self, key: &str)
        -> RepositoryResult<Option<Transaction>>;

    async fn find_by_provider_reference(
        &self,
        reference: &str,
    ) -> RepositoryResult<Option<Transaction>>;

    async fn list(&self, limit: usize) -> RepositoryResult<Vec<Transaction>>;
}

/// Queue of webhooks needing operator attention. Entries are recorded, never
/// auto-resolved.
#[async_trait]
pub trait ReviewQueue: Send + Sync {
    async fn record(&self, entry: ReviewEntry);
    async fn list(&self) -> Vec<ReviewEntry>;
}

/// Notification collaborator: informs customer/driver of terminal outcomes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn payment_outcome(&self, tx: &Transaction);
}

/// Where a driver's earnings should go for a given ride.
#[derive(Debug, Clone)]
pub struct PayoutRoute {
    pub provider: Provider,
    pub driver_phone: String,
}

/// Ride/booking collaborator.
#[async_trait]
pub trait RideHooks: Send + Sync {
    /// Mark the ride's payment status once its collection reaches a
    /// terminal state.
    async fn payment_settled(&self, ride_id: &str, tx: &Transaction);

    /// Resolve the disbursement path for the ride's driver.
    async fn driver_payout_route(&self, ride_id: &str) -> Option<PayoutRoute>;
}

/// Handoff for cash drivers: earnings accumulate on a weekly ledger settled
/// outside this core.
#[async_trait]
pub trait WeeklyPayoutLedger: Send + Sync {
    async fn add(&self, ride_id: &str, driver_phone: &str, amount: &BigDecimal);
}
