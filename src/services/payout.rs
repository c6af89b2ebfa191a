//! Driver payout orchestration.
//!
//! Triggered only when a collection transaction reaches `completed`. Takes
//! the platform commission off the fare, then either creates a disbursement
//! through the same state-machine/adapter stack (MTN, Airtel) or hands the
//! earnings to the weekly cash ledger.

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;

use crate::domain::{Provider, Transaction, TransactionKind, TransactionState};
use crate::ports::{RideHooks, WeeklyPayoutLedger};

pub const COMMISSION_RATE: &str = "0.20";

/// A disbursement the processor should submit on the payout's behalf.
#[derive(Debug, Clone)]
pub struct PayoutRequest {
    pub provider: Provider,
    pub driver_phone: String,
    pub amount: BigDecimal,
    pub ride_id: String,
    pub idempotency_key: String,
}

pub struct PayoutOrchestrator {
    ride_hooks: Arc<dyn RideHooks>,
    ledger: Arc<dyn WeeklyPayoutLedger>,
    commission_rate: BigDecimal,
}

impl PayoutOrchestrator {
    pub fn new(ride_hooks: Arc<dyn RideHooks>, ledger: Arc<dyn WeeklyPayoutLedger>) -> Self {
        let commission_rate = BigDecimal::from_str(COMMISSION_RATE)
            .unwrap_or_else(|_| BigDecimal::from(0));
        Self {
            ride_hooks,
            ledger,
            commission_rate,
        }
    }

    pub fn driver_earnings(&self, total_fare: &BigDecimal) -> BigDecimal {
        total_fare - total_fare * &self.commission_rate
    }

    /// React to a completed collection. Returns the disbursement request to
    /// run through the payment stack, or `None` when the payout went to the
    /// cash ledger (or no route/ride exists).
    pub async fn on_collection_completed(&self, tx: &Transaction) -> Option<PayoutRequest> {
        debug_assert_eq!(tx.kind, TransactionKind::Collection);
        debug_assert_eq!(tx.state, TransactionState::Completed);

        let ride_id = match &tx.ride_id {
            Some(id) => id.clone(),
            None => {
                tracing::debug!(transaction_id = %tx.id, "collection has no ride, skipping payout");
                return None;
            }
        };

        let route = match self.ride_hooks.driver_payout_route(&ride_id).await {
            Some(route) => route,
            None => {
                tracing::warn!(ride_id, "no driver payout route registered");
                return None;
            }
        };

        let earnings = self.driver_earnings(&tx.amount);
        tracing::info!(
            ride_id,
            fare = %tx.amount,
            earnings = %earnings,
            path = route.provider.as_str(),
            "driver payout computed"
        );

        match route.provider {
            Provider::Cash => {
                self.ledger.add(&ride_id, &route.driver_phone, &earnings).await;
                None
            }
            Provider::Mtn | Provider::Airtel => Some(PayoutRequest {
                provider: route.provider,
                driver_phone: route.driver_phone,
                amount: earnings,
                ride_id: ride_id.clone(),
                // Derived key: one payout per ride, resubmission-safe.
                idempotency_key: format!("{ride_id}-disbursement"),
            }),
        }
    }
}
