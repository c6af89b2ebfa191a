//! Orchestration services: the state machine and the components that drive
//! transactions through it.

pub mod circuit_breaker;
pub mod fraud;
pub mod payout;
pub mod processor;
pub mod reconciler;
pub mod retry;
pub mod state_machine;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use fraud::{FraudError, FraudGate};
pub use payout::{PayoutOrchestrator, PayoutRequest};
pub use processor::{PaymentProcessor, PaymentRequest, SubmitError};
pub use reconciler::{
    CallbackOutcome, ProviderCallback, ReconcileOutcome, WebhookReconciler,
};
pub use retry::{RetryPolicy, RetryTask};
pub use state_machine::{TransactionStateMachine, Transition, TransitionError};
