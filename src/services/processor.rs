//! Payment orchestration entry point.
//!
//! Drives a transaction through fraud gate, circuit breaker, provider
//! adapter and retry scheduler. Transactions run concurrently and
//! independently; the only waits are the adapter call (bounded by a
//! timeout) and the retry backoff timer, both non-blocking.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use tokio::time::Duration;
use uuid::Uuid;

use crate::domain::{
    FailureReason, Provider, Transaction, TransactionKind, TransactionState,
};
use crate::ports::{Notifier, RepositoryError, RideHooks, TransactionRepository};
use crate::providers::{ProviderError, ProviderRegistry, ProviderStatus};

use super::circuit_breaker::CircuitBreakerRegistry;
use super::fraud::{FraudError, FraudGate};
use super::payout::{PayoutOrchestrator, PayoutRequest};
use super::retry::{RetryPolicy, RetryTask};
use super::state_machine::{TransactionStateMachine, Transition, TransitionError};

pub const DEFAULT_ADAPTER_TIMEOUT: Duration = Duration::from_secs(30);

/// A request to move money, before any record exists.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub ride_id: Option<String>,
    pub kind: TransactionKind,
    pub provider: Provider,
    pub phone: String,
    pub amount: BigDecimal,
    pub idempotency_key: Option<String>,
}

impl From<PayoutRequest> for PaymentRequest {
    fn from(payout: PayoutRequest) -> Self {
        Self {
            ride_id: Some(payout.ride_id),
            kind: TransactionKind::Disbursement,
            provider: payout.provider,
            phone: payout.driver_phone,
            amount: payout.amount,
            idempotency_key: Some(payout.idempotency_key),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("rate limit exceeded, resubmit later")]
    RateLimited,

    #[error("no adapter registered for provider {0}")]
    UnsupportedProvider(&'static str),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Clone)]
pub struct PaymentProcessor {
    inner: Arc<Inner>,
}

struct Inner {
    machine: TransactionStateMachine,
    fraud: FraudGate,
    breakers: CircuitBreakerRegistry,
    providers: ProviderRegistry,
    retry: RetryPolicy,
    notifier: Arc<dyn Notifier>,
    ride_hooks: Arc<dyn RideHooks>,
    payout: PayoutOrchestrator,
    adapter_timeout: Duration,
}

impl PaymentProcessor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        machine: TransactionStateMachine,
        fraud: FraudGate,
        breakers: CircuitBreakerRegistry,
        providers: ProviderRegistry,
        retry: RetryPolicy,
        notifier: Arc<dyn Notifier>,
        ride_hooks: Arc<dyn RideHooks>,
        payout: PayoutOrchestrator,
        adapter_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                machine,
                fraud,
                breakers,
                providers,
                retry,
                notifier,
                ride_hooks,
                payout,
                adapter_timeout,
            }),
        }
    }

    pub fn repository(&self) -> Arc<dyn TransactionRepository> {
        self.inner.machine.repository()
    }

    pub fn state_machine(&self) -> &TransactionStateMachine {
        &self.inner.machine
    }

    /// Submit a payment. Returns immediately with the transaction record;
    /// the final outcome arrives asynchronously (webhook, retry timer or
    /// notification). Resubmission with the same idempotency key returns
    /// the original transaction untouched.
    pub async fn submit(&self, request: PaymentRequest) -> Result<Transaction, SubmitError> {
        let (tx, follow_up) = self.submit_request(request).await?;
        self.run_follow_ups(follow_up).await;
        Ok(tx)
    }

    /// Cancel before dispatch. Refused once an external side effect may be
    /// in flight.
    pub async fn cancel(&self, id: Uuid) -> Result<Transaction, TransitionError> {
        let tx = self.inner.machine.apply(id, Transition::Cancel).await?;
        let follow_up = self.finalize_effects(&tx).await;
        self.run_follow_ups(follow_up).await;
        Ok(tx)
    }

    /// Explicit status poll against the provider. Applies the result to the
    /// state machine exactly like a webhook would; safe no-op for anything
    /// not awaiting confirmation.
    pub async fn poll_status(&self, id: Uuid) -> Result<Transaction, SubmitError> {
        let tx = self.repository().get(id).await?;
        if tx.state != TransactionState::PendingConfirmation {
            return Ok(tx);
        }
        let reference = match &tx.provider_reference {
            Some(r) => r.clone(),
            None => return Ok(tx),
        };
        let adapter = self
            .inner
            .providers
            .adapter(tx.provider)
            .ok_or(SubmitError::UnsupportedProvider(tx.provider.as_str()))?;

        match adapter.query_status(&reference).await {
            Ok(ProviderStatus::Pending) => Ok(tx),
            Ok(ProviderStatus::Successful) => {
                self.apply_polled(id, Transition::Complete).await
            }
            Ok(ProviderStatus::Failed { reason }) => {
                tracing::info!(transaction_id = %id, reason, "status poll reported failure");
                self.apply_polled(
                    id,
                    Transition::Fail {
                        reason: FailureReason::ProviderRejected,
                    },
                )
                .await
            }
            Err(err) => {
                // Poll failures are advisory; the webhook path still owns
                // confirmation.
                tracing::warn!(transaction_id = %id, error = %err, "status poll failed");
                Ok(tx)
            }
        }
    }

    /// Apply a poll result; a webhook winning the race to a terminal state
    /// is not an error, the settled record is returned as-is.
    async fn apply_polled(
        &self,
        id: Uuid,
        transition: Transition,
    ) -> Result<Transaction, SubmitError> {
        match self.inner.machine.apply(id, transition).await {
            Ok(tx) => {
                let follow_up = self.finalize_effects(&tx).await;
                self.run_follow_ups(follow_up).await;
                Ok(tx)
            }
            Err(TransitionError::Terminal { .. }) => Ok(self.repository().get(id).await?),
            Err(err) => Err(err.into()),
        }
    }

    /// Execute one scheduled re-attempt. Runs from the retry timer; exposed
    /// so tests can drive attempts deterministically. A task whose
    /// transaction is no longer `retry_scheduled` has been superseded
    /// (completed via webhook, canceled) and is discarded.
    pub async fn run_retry(&self, task: RetryTask) {
        let tx = match self.repository().get(task.transaction_id).await {
            Ok(tx) => tx,
            Err(err) => {
                tracing::warn!(transaction_id = %task.transaction_id, error = %err, "retry task lookup failed");
                return;
            }
        };
        if tx.state != TransactionState::RetryScheduled {
            tracing::debug!(
                transaction_id = %tx.id,
                state = ?tx.state,
                "retry task superseded, discarding"
            );
            return;
        }
        tracing::info!(
            transaction_id = %tx.id,
            attempt = task.attempt_number,
            "running scheduled retry"
        );
        match self.dispatch(task.transaction_id).await {
            Ok((_, follow_up)) => self.run_follow_ups(follow_up).await,
            Err(err) => {
                tracing::error!(transaction_id = %task.transaction_id, error = %err, "retry dispatch failed");
            }
        }
    }

    /// Terminal side effects on behalf of the reconciler, which applies the
    /// webhook transition itself and then hands the updated record here.
    pub async fn settle_terminal(&self, tx: &Transaction) {
        let follow_up = self.finalize_effects(tx).await;
        self.run_follow_ups(follow_up).await;
    }

    async fn submit_request(
        &self,
        request: PaymentRequest,
    ) -> Result<(Transaction, Option<PayoutRequest>), SubmitError> {
        let key = request.idempotency_key.clone().unwrap_or_else(|| {
            match &request.ride_id {
                Some(ride) => format!("{ride}-{}", request.kind.as_str()),
                None => Uuid::new_v4().to_string(),
            }
        });

        // Resubmission with a known key is a no-op returning the existing
        // transaction, whatever state it is in.
        if let Some(existing) = self.repository().find_by_idempotency_key(&key).await? {
            tracing::info!(
                transaction_id = %existing.id,
                idempotency_key = key,
                "duplicate submission, returning existing transaction"
            );
            return Ok((existing, None));
        }

        match self.inner.fraud.check(&request.phone, &request.amount).await {
            Ok(_) => {}
            Err(FraudError::RateLimitExceeded) => return Err(SubmitError::RateLimited),
            Err(FraudError::Rejected { score }) => {
                // Record the rejection as a terminal failed transaction; no
                // adapter call is ever made.
                let tx = self.insert_new(&key, &request).await?;
                self.inner
                    .machine
                    .apply(tx.id, Transition::BeginValidation)
                    .await?;
                let tx = self
                    .inner
                    .machine
                    .apply(
                        tx.id,
                        Transition::Fail {
                            reason: FailureReason::FraudRejected,
                        },
                    )
                    .await?;
                tracing::warn!(transaction_id = %tx.id, score, "transaction rejected by fraud gate");
                let follow_up = self.finalize_effects(&tx).await;
                return Ok((tx, follow_up));
            }
        }

        let tx = self.insert_new(&key, &request).await?;
        self.inner
            .machine
            .apply(tx.id, Transition::BeginValidation)
            .await?;
        self.dispatch(tx.id).await
    }

    async fn insert_new(
        &self,
        key: &str,
        request: &PaymentRequest,
    ) -> Result<Transaction, SubmitError> {
        let tx = Transaction::new(
            key.to_string(),
            request.kind,
            request.provider,
            request.phone.clone(),
            request.amount.clone(),
            request.ride_id.clone(),
        );
        match self.repository().insert(&tx).await {
            Ok(tx) => Ok(tx),
            // Lost a same-key race after the lookup; surface the winner.
            Err(RepositoryError::Conflict(_)) => {
                let existing = self
                    .repository()
                    .find_by_idempotency_key(key)
                    .await?
                    .ok_or_else(|| {
                        RepositoryError::Storage(format!(
                            "idempotency key {key} conflicted but has no record"
                        ))
                    })?;
                Ok(existing)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// One dispatch attempt: breaker gate, adapter call, outcome handling.
    /// Expects the transaction in `validating` or `retry_scheduled`.
    async fn dispatch(
        &self,
        id: Uuid,
    ) -> Result<(Transaction, Option<PayoutRequest>), SubmitError> {
        let tx = self.repository().get(id).await?;
        // Resolve the adapter before touching the breaker or the state so a
        // missing registration cannot strand the transaction in `dispatched`
        // or leak an acquired probe slot.
        let adapter = self
            .inner
            .providers
            .adapter(tx.provider)
            .ok_or(SubmitError::UnsupportedProvider(tx.provider.as_str()))?;
        let breaker = self.inner.breakers.breaker(tx.provider);

        if !breaker.try_acquire().await {
            tracing::warn!(
                transaction_id = %id,
                provider = tx.provider.as_str(),
                "circuit open, failing fast"
            );
            let tx = self
                .transient_failure(id, FailureReason::ProviderUnavailable)
                .await?;
            let follow_up = if tx.is_terminal() {
                self.finalize_effects(&tx).await
            } else {
                None
            };
            return Ok((tx, follow_up));
        }

        let tx = match self.inner.machine.apply(id, Transition::Dispatch).await {
            Ok(tx) => tx,
            Err(
                err @ (TransitionError::AlreadyInFlight { .. } | TransitionError::Terminal { .. }),
            ) => {
                // Another writer got here first; give the permit back and
                // treat our attempt as a no-op.
                breaker.release().await;
                tracing::debug!(transaction_id = %id, error = %err, "dispatch superseded");
                return Ok((self.repository().get(id).await?, None));
            }
            Err(err) => {
                breaker.release().await;
                return Err(err.into());
            }
        };

        let call = async {
            match tx.kind {
                TransactionKind::Collection => {
                    adapter
                        .request_collection(&tx.counterparty_phone, &tx.amount, &tx.idempotency_key)
                        .await
                }
                TransactionKind::Disbursement => {
                    adapter
                        .request_disbursement(
                            &tx.counterparty_phone,
                            &tx.amount,
                            &tx.idempotency_key,
                        )
                        .await
                }
            }
        };
        let outcome = match tokio::time::timeout(self.inner.adapter_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Network("adapter call timed out".to_string())),
        };

        match outcome {
            Ok(ack) => {
                breaker.record_success().await;
                let tx = self
                    .inner
                    .machine
                    .apply(
                        id,
                        Transition::Accepted {
                            provider_reference: ack.provider_reference,
                        },
                    )
                    .await?;
                if tx.provider == Provider::Cash {
                    // Cash settles manually outside this core; the record
                    // completes as soon as the manual path is armed.
                    let tx = self.inner.machine.apply(id, Transition::Complete).await?;
                    let follow_up = self.finalize_effects(&tx).await;
                    return Ok((tx, follow_up));
                }
                tracing::info!(
                    transaction_id = %id,
                    provider_reference = tx.provider_reference.as_deref(),
                    "provider accepted, awaiting confirmation"
                );
                Ok((tx, None))
            }
            Err(err) if err.is_transient() => {
                breaker.record_failure().await;
                tracing::warn!(transaction_id = %id, error = %err, "transient provider failure");
                let tx = self.transient_failure(id, err.failure_reason()).await?;
                let follow_up = if tx.is_terminal() {
                    self.finalize_effects(&tx).await
                } else {
                    None
                };
                Ok((tx, follow_up))
            }
            Err(err) => {
                // The provider answered; this is a business failure, not a
                // health problem.
                breaker.record_success().await;
                tracing::info!(transaction_id = %id, error = %err, "permanent provider failure");
                let tx = self
                    .inner
                    .machine
                    .apply(
                        id,
                        Transition::Fail {
                            reason: err.failure_reason(),
                        },
                    )
                    .await?;
                let follow_up = self.finalize_effects(&tx).await;
                Ok((tx, follow_up))
            }
        }
    }

    /// Route a recoverable failure through the retry scheduler, or fail the
    /// transaction once the ceiling is hit.
    async fn transient_failure(
        &self,
        id: Uuid,
        reason: FailureReason,
    ) -> Result<Transaction, SubmitError> {
        let tx = self.repository().get(id).await?;
        let next_attempt = tx.retry_count + 1;
        match self.inner.retry.task_for(id, next_attempt) {
            Some(task) => {
                let tx = self
                    .inner
                    .machine
                    .apply(id, Transition::ScheduleRetry { reason })
                    .await?;
                tracing::info!(
                    transaction_id = %id,
                    attempt = task.attempt_number,
                    not_before = %task.not_before,
                    "retry scheduled"
                );
                self.spawn_retry(task);
                Ok(tx)
            }
            None => {
                let tx = self
                    .inner
                    .machine
                    .apply(
                        id,
                        Transition::Fail {
                            reason: FailureReason::MaxRetriesExceeded,
                        },
                    )
                    .await?;
                tracing::warn!(transaction_id = %id, "retry ceiling reached, transaction failed");
                Ok(tx)
            }
        }
    }

    fn spawn_retry(&self, task: RetryTask) {
        let processor = self.clone();
        let delay = (task.not_before - Utc::now())
            .to_std()
            .unwrap_or_default();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            processor.run_retry(task).await;
        });
    }

    /// Side effects of reaching a terminal state: notify, report to the
    /// ride, and compute the driver payout for completed collections. The
    /// returned disbursement (if any) is submitted by `run_follow_ups`.
    async fn finalize_effects(&self, tx: &Transaction) -> Option<PayoutRequest> {
        self.inner.notifier.payment_outcome(tx).await;
        if tx.kind == TransactionKind::Collection {
            if let Some(ride_id) = &tx.ride_id {
                self.inner.ride_hooks.payment_settled(ride_id, tx).await;
            }
        }
        if tx.state == TransactionState::Completed && tx.kind == TransactionKind::Collection {
            self.inner.payout.on_collection_completed(tx).await
        } else {
            None
        }
    }

    /// Run payout-triggered disbursements without recursing through
    /// `submit`. A disbursement never produces another follow-up payout,
    /// so this loop runs at most twice in practice.
    async fn run_follow_ups(&self, mut follow_up: Option<PayoutRequest>) {
        while let Some(payout) = follow_up.take() {
            match self.submit_request(payout.into()).await {
                Ok((tx, next)) => {
                    tracing::info!(
                        transaction_id = %tx.id,
                        status = tx.public_status(),
                        "payout disbursement submitted"
                    );
                    follow_up = next;
                }
                Err(err) => {
                    tracing::error!(error = %err, "payout disbursement submission failed");
                    break;
                }
            }
        }
    }
}
