//! Retry policy for recoverable failures.
//!
//! Only transient errors (network, transient provider rejection, circuit
//! open) are retry-eligible. Delay doubles per attempt from a 30s base and
//! the scheduler gives up after three attempts.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::Duration;
use uuid::Uuid;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A scheduled future re-attempt. Created by the scheduler, consumed exactly
/// once by the task runner.
#[derive(Debug, Clone)]
pub struct RetryTask {
    pub transaction_id: Uuid,
    pub not_before: DateTime<Utc>,
    pub attempt_number: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base_delay: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// `base * 2^(attempt-1)` for attempts 1..=max, `None` past the ceiling.
    pub fn delay_for(&self, attempt_number: u32) -> Option<Duration> {
        if attempt_number == 0 || attempt_number > self.max_attempts {
            return None;
        }
        Some(self.base_delay * 2u32.pow(attempt_number - 1))
    }

    pub fn task_for(&self, transaction_id: Uuid, attempt_number: u32) -> Option<RetryTask> {
        let delay = self.delay_for(attempt_number)?;
        let not_before = Utc::now()
            + ChronoDuration::milliseconds(delay.as_millis() as i64);
        Some(RetryTask {
            transaction_id,
            not_before,
            attempt_number,
        })
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_30_60_120_seconds() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_secs(60)));
        assert_eq!(policy.delay_for(3), Some(Duration::from_secs(120)));
    }

    #[test]
    fn fourth_attempt_is_never_scheduled() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(4), None);
        assert!(policy.task_for(Uuid::new_v4(), 4).is_none());
    }

    #[test]
    fn attempt_zero_is_invalid() {
        assert_eq!(RetryPolicy::default().delay_for(0), None);
    }

    #[test]
    fn task_carries_attempt_and_deadline() {
        let policy = RetryPolicy::default();
        let id = Uuid::new_v4();
        let before = Utc::now();
        let task = policy.task_for(id, 2).unwrap();
        assert_eq!(task.transaction_id, id);
        assert_eq!(task.attempt_number, 2);
        assert!(task.not_before >= before + ChronoDuration::seconds(59));
    }
}
