//! Authoritative transaction lifecycle.
//!
//! Every mutation of a transaction flows through `apply` under that
//! transaction's own lock, so a webhook racing a retry dispatch serializes
//! here and the loser observes the already-updated state. Terminal states
//! are never left and the provider reference is recorded at most once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{FailureReason, Transaction, TransactionState};
use crate::ports::{RepositoryError, TransactionRepository};

/// A requested state change. Guards live in `apply`, not in callers.
#[derive(Debug, Clone)]
pub enum Transition {
    /// created -> validating (fraud gate about to run).
    BeginValidation,
    /// validating | retry_scheduled -> dispatched (adapter call imminent).
    Dispatch,
    /// dispatched -> pending_confirmation; records the provider reference.
    Accepted { provider_reference: Option<String> },
    /// dispatched | validating | retry_scheduled -> retry_scheduled; bumps
    /// the retry count.
    ScheduleRetry { reason: FailureReason },
    /// pending_confirmation | dispatched -> completed.
    Complete,
    /// any non-terminal -> failed.
    Fail { reason: FailureReason },
    /// created | validating -> failed(canceled). Later states may already
    /// have an external side effect in flight, so cancellation is refused.
    Cancel,
}

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("transaction {id} is terminal ({state:?}) and cannot change")]
    Terminal { id: Uuid, state: TransactionState },

    #[error("invalid transition for {id}: {from:?} does not allow {requested}")]
    Invalid {
        id: Uuid,
        from: TransactionState,
        requested: &'static str,
    },

    #[error("transaction {id} already has an outstanding provider call ({state:?})")]
    AlreadyInFlight { id: Uuid, state: TransactionState },

    #[error("provider reference already recorded for {id}")]
    ReferenceAlreadySet { id: Uuid },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Per-transaction mutual exclusion plus transition validation on top of the
/// repository.
#[derive(Clone)]
pub struct TransactionStateMachine {
    repo: Arc<dyn TransactionRepository>,
    locks: Arc<StdMutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl TransactionStateMachine {
    pub fn new(repo: Arc<dyn TransactionRepository>) -> Self {
        Self {
            repo,
            locks: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub fn repository(&self) -> Arc<dyn TransactionRepository> {
        self.repo.clone()
    }

    /// Hold this transaction's write lock. Lock entries are small and kept
    /// for the transaction's lifetime; records are never deleted anyway.
    pub async fn lock(&self, id: Uuid) -> OwnedMutexGuard<()> {
        let entry = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(id).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        entry.lock_owned().await
    }

    /// Apply a transition under the transaction's lock and persist the
    /// result. Returns the updated record.
    pub async fn apply(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> Result<Transaction, TransitionError> {
        let _guard = self.lock(id).await;
        self.apply_locked(id, transition).await
    }

    /// Transition body for callers that already hold the lock via `lock`.
    pub async fn apply_locked(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> Result<Transaction, TransitionError> {
        let mut tx = self.repo.get(id).await?;
        let from = tx.state;

        if from.is_terminal() {
            return Err(TransitionError::Terminal { id, state: from });
        }

        match transition {
            Transition::BeginValidation => {
                if from != TransactionState::Created {
                    return Err(invalid(id, from, "begin_validation"));
                }
                tx.state = TransactionState::Validating;
            }
            Transition::Dispatch => {
                if from.is_in_flight() {
                    return Err(TransitionError::AlreadyInFlight { id, state: from });
                }
                if !matches!(
                    from,
                    TransactionState::Validating | TransactionState::RetryScheduled
                ) {
                    return Err(invalid(id, from, "dispatch"));
                }
                tx.state = TransactionState::Dispatched;
            }
            Transition::Accepted { provider_reference } => {
                if from != TransactionState::Dispatched {
                    return Err(invalid(id, from, "accepted"));
                }
                if let Some(reference) = provider_reference {
                    if tx.provider_reference.is_some() {
                        return Err(TransitionError::ReferenceAlreadySet { id });
                    }
                    tx.provider_reference = Some(reference);
                }
                tx.state = TransactionState::PendingConfirmation;
            }
            Transition::ScheduleRetry { reason } => {
                if !matches!(
                    from,
                    TransactionState::Dispatched
                        | TransactionState::Validating
                        | TransactionState::RetryScheduled
                ) {
                    return Err(invalid(id, from, "schedule_retry"));
                }
                tx.state = TransactionState::RetryScheduled;
                tx.retry_count += 1;
                tx.failure_reason = Some(reason);
            }
            Transition::Complete => {
                if !matches!(
                    from,
                    TransactionState::PendingConfirmation | TransactionState::Dispatched
                ) {
                    return Err(invalid(id, from, "complete"));
                }
                tx.state = TransactionState::Completed;
                tx.failure_reason = None;
            }
            Transition::Fail { reason } => {
                tx.state = TransactionState::Failed;
                tx.failure_reason = Some(reason);
            }
            Transition::Cancel => {
                if !matches!(
                    from,
                    TransactionState::Created | TransactionState::Validating
                ) {
                    return Err(invalid(id, from, "cancel"));
                }
                tx.state = TransactionState::Failed;
                tx.failure_reason = Some(FailureReason::Canceled);
            }
        }

        self.repo.update(&tx).await?;
        tracing::debug!(
            transaction_id = %id,
            from = ?from,
            to = ?tx.state,
            "transaction transition"
        );
        // Return the stored view (update refreshes updated_at).
        Ok(self.repo.get(id).await?)
    }
}

fn invalid(id: Uuid, from: TransactionState, requested: &'static str) -> TransitionError {
    TransitionError::Invalid {
        id,
        from,
        requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryTransactionRepository;
    use crate::domain::{Provider, TransactionKind};
    use bigdecimal::BigDecimal;

    async fn machine_with_tx() -> (TransactionStateMachine, Uuid) {
        let repo = Arc::new(InMemoryTransactionRepository::new());
        let tx = Transaction::new(
            "k1".to_string(),
            TransactionKind::Collection,
            Provider::Mtn,
            "+250781234567".to_string(),
            BigDecimal::from(2000),
            None,
        );
        repo.insert(&tx).await.unwrap();
        (TransactionStateMachine::new(repo), tx.id)
    }

    #[tokio::test]
    async fn happy_path_transitions() {
        let (machine, id) = machine_with_tx().await;

        let tx = machine.apply(id, Transition::BeginValidation).await.unwrap();
        assert_eq!(tx.state, TransactionState::Validating);

        let tx = machine.apply(id, Transition::Dispatch).await.unwrap();
        assert_eq!(tx.state, TransactionState::Dispatched);

        let tx = machine
            .apply(
                id,
                Transition::Accepted {
                    provider_reference: Some("REF-1".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(tx.state, TransactionState::PendingConfirmation);
        assert_eq!(tx.provider_reference.as_deref(), Some("REF-1"));

        let tx = machine.apply(id, Transition::Complete).await.unwrap();
        assert_eq!(tx.state, TransactionState::Completed);
    }

    #[tokio::test]
    async fn duplicate_dispatch_is_rejected_by_state() {
        let (machine, id) = machine_with_tx().await;
        machine.apply(id, Transition::BeginValidation).await.unwrap();
        machine.apply(id, Transition::Dispatch).await.unwrap();

        let err = machine.apply(id, Transition::Dispatch).await.unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyInFlight { .. }));
    }

    #[tokio::test]
    async fn terminal_states_are_never_left() {
        let (machine, id) = machine_with_tx().await;
        machine.apply(id, Transition::BeginValidation).await.unwrap();
        machine
            .apply(
                id,
                Transition::Fail {
                    reason: FailureReason::FraudRejected,
                },
            )
            .await
            .unwrap();

        for transition in [
            Transition::Dispatch,
            Transition::Complete,
            Transition::Fail {
                reason: FailureReason::NetworkError,
            },
            Transition::Cancel,
        ] {
            let err = machine.apply(id, transition).await.unwrap_err();
            assert!(matches!(err, TransitionError::Terminal { .. }));
        }
    }

    #[tokio::test]
    async fn provider_reference_is_write_once() {
        let (machine, id) = machine_with_tx().await;
        machine.apply(id, Transition::BeginValidation).await.unwrap();
        machine.apply(id, Transition::Dispatch).await.unwrap();
        machine
            .apply(
                id,
                Transition::Accepted {
                    provider_reference: Some("REF-1".to_string()),
                },
            )
            .await
            .unwrap();

        // A second acceptance would both be an invalid transition and an
        // attempt to overwrite the reference; the state check fires first.
        machine
            .apply(
                id,
                Transition::ScheduleRetry {
                    reason: FailureReason::NetworkError,
                },
            )
            .await
            .unwrap_err();

        let tx = machine.repository().get(id).await.unwrap();
        assert_eq!(tx.provider_reference.as_deref(), Some("REF-1"));
    }

    #[tokio::test]
    async fn retry_cycle_returns_to_dispatched() {
        let (machine, id) = machine_with_tx().await;
        machine.apply(id, Transition::BeginValidation).await.unwrap();
        machine.apply(id, Transition::Dispatch).await.unwrap();

        let tx = machine
            .apply(
                id,
                Transition::ScheduleRetry {
                    reason: FailureReason::NetworkError,
                },
            )
            .await
            .unwrap();
        assert_eq!(tx.state, TransactionState::RetryScheduled);
        assert_eq!(tx.retry_count, 1);
        assert_eq!(tx.failure_reason, Some(FailureReason::NetworkError));

        let tx = machine.apply(id, Transition::Dispatch).await.unwrap();
        assert_eq!(tx.state, TransactionState::Dispatched);
    }

    #[tokio::test]
    async fn cancel_only_before_dispatch() {
        let (machine, id) = machine_with_tx().await;
        machine.apply(id, Transition::BeginValidation).await.unwrap();
        let tx = machine.apply(id, Transition::Cancel).await.unwrap();
        assert_eq!(tx.state, TransactionState::Failed);
        assert_eq!(tx.failure_reason, Some(FailureReason::Canceled));

        let (machine, id) = machine_with_tx().await;
        machine.apply(id, Transition::BeginValidation).await.unwrap();
        machine.apply(id, Transition::Dispatch).await.unwrap();
        let err = machine.apply(id, Transition::Cancel).await.unwrap_err();
        assert!(matches!(err, TransitionError::Invalid { .. }));
    }
}
