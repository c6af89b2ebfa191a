pub mod review;
pub mod transaction;

pub use review::{ReviewEntry, ReviewKind};
pub use transaction::{
    FailureReason, Provider, Transaction, TransactionKind, TransactionState, CURRENCY_RWF,
};
