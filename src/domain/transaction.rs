//! Transaction domain entity.
//! Framework-agnostic representation of a single payment attempt.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction of money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Pulling money from a customer's mobile-money account.
    Collection,
    /// Pushing money to a driver's mobile-money account.
    Disbursement,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Collection => "collection",
            TransactionKind::Disbursement => "disbursement",
        }
    }
}

/// Payment provider, selected once at transaction creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "mtn_momo")]
    Mtn,
    #[serde(rename = "airtel_money")]
    Airtel,
    #[serde(rename = "cash")]
    Cash,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Mtn => "mtn_momo",
            Provider::Airtel => "airtel_money",
            Provider::Cash => "cash",
        }
    }
}

/// Lifecycle state. `Completed` and `Failed` are terminal and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Created,
    Validating,
    Dispatched,
    PendingConfirmation,
    RetryScheduled,
    Completed,
    Failed,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Completed | TransactionState::Failed)
    }

    /// A transaction in one of these states has (or may have) an outstanding
    /// provider call and must reject duplicate dispatch attempts.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            TransactionState::Dispatched | TransactionState::PendingConfirmation
        )
    }
}

/// Why a transaction failed. Recorded on the terminal `Failed` state and on
/// `RetryScheduled` while a re-attempt is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    FraudRejected,
    ProviderUnavailable,
    NetworkError,
    InvalidAccount,
    InsufficientFunds,
    ProviderRejected,
    MaxRetriesExceeded,
    Canceled,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::FraudRejected => "fraud_rejected",
            FailureReason::ProviderUnavailable => "provider_unavailable",
            FailureReason::NetworkError => "network_error",
            FailureReason::InvalidAccount => "invalid_account",
            FailureReason::InsufficientFunds => "insufficient_funds",
            FailureReason::ProviderRejected => "provider_rejected",
            FailureReason::MaxRetriesExceeded => "max_retries_exceeded",
            FailureReason::Canceled => "canceled",
        }
    }
}

pub const CURRENCY_RWF: &str = "RWF";

/// One payment attempt (collection or disbursement). Append-only audit
/// record: mutated only through state-machine transitions, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub idempotency_key: String,
    pub kind: TransactionKind,
    pub provider: Provider,
    pub counterparty_phone: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub state: TransactionState,
    pub provider_reference: Option<String>,
    pub retry_count: u32,
    pub failure_reason: Option<FailureReason>,
    pub ride_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        idempotency_key: String,
        kind: TransactionKind,
        provider: Provider,
        counterparty_phone: String,
        amount: BigDecimal,
        ride_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            idempotency_key,
            kind,
            provider,
            counterparty_phone,
            amount,
            currency: CURRENCY_RWF.to_string(),
            state: TransactionState::Created,
            provider_reference: None,
            retry_count: 0,
            failure_reason: None,
            ride_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Caller-facing status. Internal states collapse onto the four values
    /// the process endpoint reports.
    pub fn public_status(&self) -> &'static str {
        match self.state {
            TransactionState::Created
            | TransactionState::Validating
            | TransactionState::RetryScheduled => "pending",
            TransactionState::Dispatched | TransactionState::PendingConfirmation => "processing",
            TransactionState::Completed => "completed",
            TransactionState::Failed => "failed",
        }
    }
}
