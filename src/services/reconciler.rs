//! Webhook reconciliation.
//!
//! Providers confirm asynchronously; their callbacks arrive at-least-once,
//! out of order, and sometimes for transactions we never created. The
//! reconciler maps each callback to a transaction by provider reference and
//! applies the outcome exactly once. Anything it cannot apply cleanly lands
//! on the review queue instead of being dropped. Callers always ACK the
//! provider regardless of the outcome here, so providers stop redelivering.

use std::sync::Arc;

use crate::domain::{
    FailureReason, Provider, ReviewEntry, ReviewKind, TransactionState,
};
use crate::ports::{RepositoryError, ReviewQueue, TransactionRepository};

use super::processor::PaymentProcessor;
use super::state_machine::Transition;

/// Canonical form of a provider callback, after the provider-specific
/// payload has been translated at the HTTP edge.
#[derive(Debug, Clone)]
pub struct ProviderCallback {
    pub provider: Provider,
    pub provider_reference: String,
    pub outcome: CallbackOutcome,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Successful,
    Failed,
}

/// What the reconciler did with a callback. All variants are ACKed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The transaction moved to its terminal state.
    Applied,
    /// Redelivery of an outcome already applied.
    DuplicateIgnored,
    /// The callback contradicts the recorded terminal state; queued for
    /// manual review, stored state untouched.
    Conflict,
    /// No transaction carries this provider reference; queued for review.
    Unknown,
}

pub struct WebhookReconciler {
    processor: PaymentProcessor,
    review: Arc<dyn ReviewQueue>,
}

impl WebhookReconciler {
    pub fn new(processor: PaymentProcessor, review: Arc<dyn ReviewQueue>) -> Self {
        Self { processor, review }
    }

    fn repository(&self) -> Arc<dyn TransactionRepository> {
        self.processor.repository()
    }

    pub async fn reconcile(
        &self,
        callback: ProviderCallback,
    ) -> Result<ReconcileOutcome, RepositoryError> {
        let tx = match self
            .repository()
            .find_by_provider_reference(&callback.provider_reference)
            .await?
        {
            Some(tx) => tx,
            None => {
                tracing::warn!(
                    provider = callback.provider.as_str(),
                    provider_reference = callback.provider_reference,
                    "callback for unknown transaction"
                );
                self.review
                    .record(ReviewEntry::new(
                        ReviewKind::UnknownTransaction,
                        callback.provider,
                        callback.provider_reference.clone(),
                        None,
                        format!(
                            "no transaction matches reference {}",
                            callback.provider_reference
                        ),
                    ))
                    .await;
                return Ok(ReconcileOutcome::Unknown);
            }
        };

        // Serialize against retries and concurrent deliveries of the same
        // reference, then re-read the record under the lock.
        let machine = self.processor.state_machine();
        let _guard = machine.lock(tx.id).await;
        let tx = self.repository().get(tx.id).await?;

        if tx.is_terminal() {
            let duplicate = matches!(
                (tx.state, callback.outcome),
                (TransactionState::Completed, CallbackOutcome::Successful)
                    | (TransactionState::Failed, CallbackOutcome::Failed)
            );
            if duplicate {
                tracing::debug!(
                    transaction_id = %tx.id,
                    "duplicate callback, already applied"
                );
                return Ok(ReconcileOutcome::DuplicateIgnored);
            }
            tracing::error!(
                transaction_id = %tx.id,
                state = ?tx.state,
                outcome = ?callback.outcome,
                "callback contradicts recorded outcome"
            );
            self.review
                .record(ReviewEntry::new(
                    ReviewKind::ReconciliationConflict,
                    callback.provider,
                    callback.provider_reference.clone(),
                    Some(tx.id),
                    format!(
                        "stored state {:?} contradicts callback outcome {:?}",
                        tx.state, callback.outcome
                    ),
                ))
                .await;
            return Ok(ReconcileOutcome::Conflict);
        }

        let transition = match callback.outcome {
            CallbackOutcome::Successful => Transition::Complete,
            CallbackOutcome::Failed => {
                if let Some(reason) = &callback.reason {
                    tracing::info!(
                        transaction_id = %tx.id,
                        reason,
                        "provider reported failure"
                    );
                }
                Transition::Fail {
                    reason: FailureReason::ProviderRejected,
                }
            }
        };

        match machine.apply_locked(tx.id, transition).await {
            Ok(updated) => {
                drop(_guard);
                self.processor.settle_terminal(&updated).await;
                Ok(ReconcileOutcome::Applied)
            }
            Err(err) => {
                // Lock is held, so the state cannot have moved under us;
                // an invalid transition here means the callback arrived for
                // a state that never reached the provider. Review it.
                tracing::error!(
                    transaction_id = %tx.id,
                    error = %err,
                    "callback could not be applied"
                );
                self.review
                    .record(ReviewEntry::new(
                        ReviewKind::ReconciliationConflict,
                        callback.provider,
                        callback.provider_reference.clone(),
                        Some(tx.id),
                        format!("transition rejected: {err}"),
                    ))
                    .await;
                Ok(ReconcileOutcome::Conflict)
            }
        }
    }
}
