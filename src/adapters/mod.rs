pub mod collaborators;
pub mod in_memory;

pub use collaborators::{InMemoryRideHooks, InMemoryWeeklyLedger, TracingNotifier};
pub use in_memory::{InMemoryReviewQueue, InMemoryTransactionRepository};
