//! Pre-flight risk and velocity checks.
//!
//! Runs before a transaction is allowed to start: a GCRA rate limiter caps
//! each originating user at 10 requests per rolling 60 seconds, and a risk
//! score over recent velocity and amount rejects at 0.8. Both are
//! synchronous validation failures, never retried by the scheduler.

use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU32;
use std::sync::Arc;

use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, Duration, Utc};
use governor::clock::DefaultClock;
use governor::state::keyed::DefaultKeyedStateStore;
use governor::{Quota, RateLimiter};
use tokio::sync::Mutex;

pub const RISK_THRESHOLD: f64 = 0.8;
const REQUESTS_PER_MINUTE: u32 = 10;
const VELOCITY_WINDOW_SECS: i64 = 600;
const MAX_AMOUNT_RWF: f64 = 100_000.0;

// Score weights: a maximum-amount request contributes 0.5, each recent
// submission in the trailing window contributes 0.05.
const AMOUNT_WEIGHT: f64 = 0.5;
const VELOCITY_WEIGHT: f64 = 0.05;

#[derive(Debug, thiserror::Error)]
pub enum FraudError {
    #[error("rate limit exceeded: more than {REQUESTS_PER_MINUTE} requests per 60s")]
    RateLimitExceeded,

    #[error("risk score {score:.2} at or above threshold {RISK_THRESHOLD}")]
    Rejected { score: f64 },
}

type KeyedLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

pub struct FraudGate {
    limiter: KeyedLimiter,
    history: Arc<Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>>,
}

impl FraudGate {
    pub fn new() -> Self {
        const LIMIT: NonZeroU32 = match NonZeroU32::new(REQUESTS_PER_MINUTE) {
            Some(n) => n,
            None => panic!("rate limit must be non-zero"),
        };
        Self {
            limiter: RateLimiter::keyed(Quota::per_minute(LIMIT)),
            history: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Clear a request to proceed. Returns the computed risk score; on
    /// rejection the request must not reach any provider adapter.
    pub async fn check(&self, user: &str, amount: &BigDecimal) -> Result<f64, FraudError> {
        if self.limiter.check_key(&user.to_string()).is_err() {
            tracing::warn!(user, "payment rate limit exceeded");
            return Err(FraudError::RateLimitExceeded);
        }

        let now = Utc::now();
        let recent = self.observe(user, now).await;
        let score = risk_score(amount, recent);

        if score >= RISK_THRESHOLD {
            tracing::warn!(user, score, recent, "fraud gate rejected request");
            return Err(FraudError::Rejected { score });
        }

        tracing::debug!(user, score, recent, "fraud gate cleared request");
        Ok(score)
    }

    /// Record this submission and return how many others fell inside the
    /// trailing velocity window. Expired timestamps are swept for every
    /// tracked user, and users with nothing left in the window are dropped
    /// so the map does not grow without bound.
    async fn observe(&self, user: &str, now: DateTime<Utc>) -> usize {
        let mut history = self.history.lock().await;
        let cutoff = now - Duration::seconds(VELOCITY_WINDOW_SECS);
        history.retain(|_, entries| {
            while entries.front().is_some_and(|t| *t < cutoff) {
                entries.pop_front();
            }
            !entries.is_empty()
        });
        let entries = history.entry(user.to_string()).or_default();
        let recent = entries.len();
        entries.push_back(now);
        recent
    }
}

impl Default for FraudGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Risk score in [0, 1] from amount and trailing-window velocity.
fn risk_score(amount: &BigDecimal, recent_count: usize) -> f64 {
    let amount = amount.to_f64().unwrap_or(MAX_AMOUNT_RWF);
    let amount_component = (amount / MAX_AMOUNT_RWF).clamp(0.0, 1.0) * AMOUNT_WEIGHT;
    let velocity_component = recent_count as f64 * VELOCITY_WEIGHT;
    (amount_component + velocity_component).min(1.0)
}
