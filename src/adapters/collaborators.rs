//! Default collaborator adapters. Notification delivery, ride bookkeeping
//! and the weekly cash ledger are external systems; these implementations
//! record the handoff so the core and its tests can observe it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use tokio::sync::RwLock;

use crate::domain::Transaction;
use crate::ports::{Notifier, PayoutRoute, RideHooks, WeeklyPayoutLedger};

/// Emits terminal-outcome notifications as structured log events.
#[derive(Clone, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn payment_outcome(&self, tx: &Transaction) {
        tracing::info!(
            transaction_id = %tx.id,
            kind = tx.kind.as_str(),
            provider = tx.provider.as_str(),
            status = tx.public_status(),
            reason = tx.failure_reason.map(|r| r.as_str()),
            "payment outcome notification"
        );
    }
}

/// Ride collaborator holding payout routes and recording settlement calls.
#[derive(Clone, Default)]
pub struct InMemoryRideHooks {
    routes: Arc<RwLock<HashMap<String, PayoutRoute>>>,
    settled: Arc<RwLock<Vec<(String, String)>>>,
}

impl InMemoryRideHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_route(&self, ride_id: &str, route: PayoutRoute) {
        self.routes.write().await.insert(ride_id.to_string(), route);
    }

    /// (ride_id, status) pairs reported so far.
    pub async fn settled(&self) -> Vec<(String, String)> {
        self.settled.read().await.clone()
    }
}

#[async_trait]
impl RideHooks for InMemoryRideHooks {
    async fn payment_settled(&self, ride_id: &str, tx: &Transaction) {
        tracing::info!(
            ride_id,
            transaction_id = %tx.id,
            status = tx.public_status(),
            "ride payment settled"
        );
        self.settled
            .write()
            .await
            .push((ride_id.to_string(), tx.public_status().to_string()));
    }

    async fn driver_payout_route(&self, ride_id: &str) -> Option<PayoutRoute> {
        self.routes.read().await.get(ride_id).cloned()
    }
}

/// Weekly cash-payout ledger. Settlement itself happens outside this core;
/// only the accumulated handoffs live here.
#[derive(Clone, Default)]
pub struct InMemoryWeeklyLedger {
    entries: Arc<RwLock<Vec<(String, String, BigDecimal)>>>,
}

impl InMemoryWeeklyLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<(String, String, BigDecimal)> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl WeeklyPayoutLedger for InMemoryWeeklyLedger {
    async fn add(&self, ride_id: &str, driver_phone: &str, amount: &BigDecimal) {
        tracing::info!(ride_id, driver_phone, %amount, "cash payout added to weekly ledger");
        self.entries.write().await.push((
            ride_id.to_string(),
            driver_phone.to_string(),
            amount.clone(),
        ));
    }
}
