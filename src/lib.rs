pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod providers;
pub mod services;
pub mod validation;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::time::Duration;

use crate::adapters::{
    InMemoryReviewQueue, InMemoryRideHooks, InMemoryTransactionRepository, InMemoryWeeklyLedger,
    TracingNotifier,
};
use crate::config::Config;
use crate::ports::ReviewQueue;
use crate::providers::{AirtelMoneyAdapter, CashAdapter, MtnMomoAdapter, ProviderRegistry};
use crate::services::{
    CircuitBreakerRegistry, FraudGate, PaymentProcessor, PayoutOrchestrator, RetryPolicy,
    TransactionStateMachine, WebhookReconciler,
};

#[derive(Clone)]
pub struct AppState {
    pub processor: PaymentProcessor,
    pub reconciler: Arc<WebhookReconciler>,
    pub review: Arc<dyn ReviewQueue>,
}

impl AppState {
    /// Wire the full stack against in-memory collaborators and the sandbox
    /// provider adapters. Tests reuse this and reach the collaborators
    /// through the returned handles.
    pub fn sandbox(config: &Config) -> (Self, SandboxHandles) {
        let repo = Arc::new(InMemoryTransactionRepository::new());
        let review = Arc::new(InMemoryReviewQueue::new());
        let ride_hooks = Arc::new(InMemoryRideHooks::new());
        let ledger = Arc::new(InMemoryWeeklyLedger::new());
        let mtn = MtnMomoAdapter::new();
        let airtel = AirtelMoneyAdapter::new();
        let providers = ProviderRegistry::new(vec![
            Arc::new(mtn.clone()),
            Arc::new(airtel.clone()),
            Arc::new(CashAdapter::new()),
        ]);

        let processor = PaymentProcessor::new(
            TransactionStateMachine::new(repo.clone()),
            FraudGate::new(),
            CircuitBreakerRegistry::new(
                config.breaker_failure_threshold,
                Duration::from_secs(config.breaker_open_timeout_secs),
            ),
            providers,
            RetryPolicy::new(
                Duration::from_secs(config.retry_base_delay_secs),
                config.retry_max_attempts,
            ),
            Arc::new(TracingNotifier),
            ride_hooks.clone(),
            PayoutOrchestrator::new(ride_hooks.clone(), ledger.clone()),
            Duration::from_secs(config.adapter_timeout_secs),
        );
        let reconciler = Arc::new(WebhookReconciler::new(processor.clone(), review.clone()));

        let state = AppState {
            processor,
            reconciler,
            review: review.clone(),
        };
        let handles = SandboxHandles {
            repository: repo,
            review,
            ride_hooks,
            ledger,
            mtn,
            airtel,
        };
        (state, handles)
    }
}

/// Direct access to the in-memory collaborators behind a sandbox app.
pub struct SandboxHandles {
    pub repository: Arc<InMemoryTransactionRepository>,
    pub review: Arc<InMemoryReviewQueue>,
    pub ride_hooks: Arc<InMemoryRideHooks>,
    pub ledger: Arc<InMemoryWeeklyLedger>,
    pub mtn: MtnMomoAdapter,
    pub airtel: AirtelMoneyAdapter,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/payments/process", post(handlers::payments::process_payment))
        .route("/payments/review", get(handlers::review::list_review_entries))
        .route("/payments/:id", get(handlers::payments::get_payment))
        .route("/payments/:id/cancel", post(handlers::payments::cancel_payment))
        .route("/payments/webhooks/mtn", post(handlers::webhook::mtn_callback))
        .route("/payments/webhooks/airtel", post(handlers::webhook::airtel_callback))
        .with_state(state)
}
