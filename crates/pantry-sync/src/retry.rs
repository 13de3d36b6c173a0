//! Retry delays for failed sync records.
//!
//! A record that failed `n` times waits `initial * 2^(n-1)`, capped at
//! `max`, after its last attempt before the drain picks it up again. No
//! jitter: the delay is a pure function of the retry count.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use std::time::Duration;

use pantry_core::SyncMetadata;

use crate::config::SyncSettings;

/// Highest exponent ever computed; the cap is reached long before this.
const MAX_STEPS: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
    /// 0 means unlimited.
    pub max_attempts: u32,
}

impl RetryPolicy {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        RetryPolicy {
            initial: Duration::from_millis(settings.initial_backoff_ms),
            max: Duration::from_secs(settings.max_backoff_secs),
            max_attempts: settings.max_attempts,
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial,
            max_interval: self.max,
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }

    /// Delay after the `retry_count`-th failure. Zero before any failure.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        if retry_count == 0 {
            return Duration::ZERO;
        }

        let mut backoff = self.create_backoff();
        let mut delay = self.initial;
        for _ in 0..retry_count.min(MAX_STEPS) {
            delay = backoff.next_backoff().unwrap_or(self.max);
        }
        // Whole milliseconds, matching how attempt times are stored.
        let millis = u64::try_from(delay.min(self.max).as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(millis)
    }

    /// Returns true once the record has waited out its delay.
    pub fn is_due(&self, record: &SyncMetadata, now: DateTime<Utc>) -> bool {
        let Some(last_attempt) = record.last_attempt_at else {
            return true;
        };
        let delay = self.delay_for(record.retry_count);
        let delay = chrono::Duration::milliseconds(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
        match last_attempt.checked_add_signed(delay) {
            Some(due_at) => due_at <= now,
            None => false,
        }
    }

    /// Returns true if the record has attempts left.
    pub fn has_attempts_left(&self, record: &SyncMetadata) -> bool {
        self.max_attempts == 0 || record.retry_count < self.max_attempts
    }

    /// Failed records the drain may pick up at `now`.
    pub fn is_eligible(&self, record: &SyncMetadata, now: DateTime<Utc>) -> bool {
        self.has_attempts_left(record) && self.is_due(record, now)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from_settings(&SyncSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pantry_core::SyncOperation;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(4),
            max_attempts: 5,
        }
    }

    #[test]
    fn test_delay_doubles_until_cap() {
        let p = policy();
        assert_eq!(p.delay_for(0), Duration::ZERO);
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_secs(1));
        assert_eq!(p.delay_for(3), Duration::from_secs(2));
        assert_eq!(p.delay_for(4), Duration::from_secs(4));
        assert_eq!(p.delay_for(40), Duration::from_secs(4));
    }

    #[test]
    fn test_eligibility() {
        let p = policy();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut record = SyncMetadata::pending("i1", "h1", SyncOperation::Update, "r1", t0);
        assert!(p.is_eligible(&record, t0));

        record.mark_failed("timeout", t0).unwrap();
        assert_eq!(record.retry_count, 1);
        assert!(!p.is_eligible(&record, t0 + chrono::Duration::milliseconds(499)));
        assert!(p.is_eligible(&record, t0 + chrono::Duration::milliseconds(500)));

        record.retry_count = 5;
        assert!(!p.is_eligible(&record, t0 + chrono::Duration::days(1)));
    }
}
