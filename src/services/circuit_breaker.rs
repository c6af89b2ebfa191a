//! Per-provider failure isolation.
//!
//! `ProviderHealth` is the one piece of state shared across transactions for
//! a given provider. It is owned here and only mutated through the breaker's
//! transition rules; call sites consult `try_acquire` before every adapter
//! call and report the result back.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use crate::domain::Provider;

pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Shared mutable health record for one provider.
#[derive(Debug)]
struct ProviderHealth {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Serializes the half-open single-trial rule: set while the one probe
    /// call is outstanding so concurrent transactions don't all probe.
    probe_in_flight: bool,
}

impl ProviderHealth {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }
}

/// Read-only view for introspection and logging.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
}

#[derive(Clone)]
pub struct CircuitBreaker {
    health: Arc<RwLock<ProviderHealth>>,
    failure_threshold: u32,
    open_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            health: Arc::new(RwLock::new(ProviderHealth::new())),
            failure_threshold,
            open_timeout,
        }
    }

    /// Ask permission for one adapter call. Rejection means the circuit is
    /// open (or the half-open probe slot is taken) and no network attempt
    /// may be made.
    pub async fn try_acquire(&self) -> bool {
        let mut health = self.health.write().await;
        match health.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let expired = health
                    .opened_at
                    .map(|at| at.elapsed() >= self.open_timeout)
                    .unwrap_or(true);
                if expired {
                    health.state = CircuitState::HalfOpen;
                    health.probe_in_flight = true;
                    tracing::info!("circuit half-open, letting one trial call through");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if health.probe_in_flight {
                    false
                } else {
                    health.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Give back a permit acquired via `try_acquire` without making a call,
    /// so a half-open probe slot is not leaked.
    pub async fn release(&self) {
        self.health.write().await.probe_in_flight = false;
    }

    pub async fn record_success(&self) {
        let mut health = self.health.write().await;
        health.consecutive_failures = 0;
        health.probe_in_flight = false;
        if health.state != CircuitState::Closed {
            tracing::info!("circuit closed after successful call");
        }
        health.state = CircuitState::Closed;
        health.opened_at = None;
    }

    pub async fn record_failure(&self) {
        let mut health = self.health.write().await;
        health.consecutive_failures += 1;
        health.probe_in_flight = false;
        match health.state {
            CircuitState::Closed => {
                if health.consecutive_failures >= self.failure_threshold {
                    health.state = CircuitState::Open;
                    health.opened_at = Some(Instant::now());
                    tracing::warn!(
                        failures = health.consecutive_failures,
                        "circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                health.state = CircuitState::Open;
                health.opened_at = Some(Instant::now());
                tracing::warn!("trial call failed, circuit re-opened");
            }
            CircuitState::Open => {}
        }
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        let health = self.health.read().await;
        HealthSnapshot {
            state: health.state,
            consecutive_failures: health.consecutive_failures,
        }
    }
}

/// One breaker per provider. Cash is included for uniformity even though its
/// adapter never fails.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    breakers: HashMap<Provider, CircuitBreaker>,
}

impl CircuitBreakerRegistry {
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        let breakers = [Provider::Mtn, Provider::Airtel, Provider::Cash]
            .into_iter()
            .map(|p| (p, CircuitBreaker::new(failure_threshold, open_timeout)))
            .collect();
        Self { breakers }
    }

    pub fn breaker(&self, provider: Provider) -> &CircuitBreaker {
        // The map is total over the Provider enum by construction.
        &self.breakers[&provider]
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(5, DEFAULT_OPEN_TIMEOUT);

        for _ in 0..4 {
            assert!(breaker.try_acquire().await);
            breaker.record_failure().await;
        }
        assert_eq!(breaker.snapshot().await.state, CircuitState::Closed);

        assert!(breaker.try_acquire().await);
        breaker.record_failure().await;
        assert_eq!(breaker.snapshot().await.state, CircuitState::Open);

        // Rejected without a network attempt.
        assert!(!breaker.try_acquire().await);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(5, DEFAULT_OPEN_TIMEOUT);

        for _ in 0..4 {
            breaker.record_failure().await;
        }
        breaker.record_success().await;
        assert_eq!(breaker.snapshot().await.consecutive_failures, 0);

        breaker.record_failure().await;
        assert_eq!(breaker.snapshot().await.state, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_allows_exactly_one_probe() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure().await;
        assert_eq!(breaker.snapshot().await.state, CircuitState::Open);
        assert!(!breaker.try_acquire().await);

        tokio::time::advance(Duration::from_secs(61)).await;

        // Exactly one trial call is let through.
        assert!(breaker.try_acquire().await);
        assert_eq!(breaker.snapshot().await.state, CircuitState::HalfOpen);
        assert!(!breaker.try_acquire().await);

        breaker.record_success().await;
        assert_eq!(breaker.snapshot().await.state, CircuitState::Closed);
        assert!(breaker.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_probe_reopens_with_fresh_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_failure().await;

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(breaker.try_acquire().await);
        breaker.record_failure().await;
        assert_eq!(breaker.snapshot().await.state, CircuitState::Open);

        // Not yet expired again.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!breaker.try_acquire().await);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(breaker.try_acquire().await);
    }
}
