//! Retry policy for portal requests.

use crate::config::RemoteConfig;
use rand::Rng;
use std::time::Duration;

/// Statuses the portal returns transiently, 404 included
pub const RETRYABLE_STATUSES: [u16; 5] = [404, 500, 502, 503, 504];

/// How many times to try a request and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per request.
    pub max_retries: u32,
    /// Statuses that trigger another attempt.
    pub retry_statuses: Vec<u16>,
    /// Scale of the backoff; one second in production.
    pub unit: Duration,
    /// Optional ceiling on a single delay.
    pub max_backoff: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            retry_statuses: RETRYABLE_STATUSES.to_vec(),
            unit: Duration::from_secs(1),
            max_backoff: None,
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_statuses: RETRYABLE_STATUSES.to_vec(),
            unit: Duration::from_millis(config.backoff_unit_ms),
            max_backoff: config.max_backoff_secs.map(Duration::from_secs),
        }
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Delay before retry `attempt` (0-indexed): `2^n` units plus jitter in `[0, n)` units.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter = if attempt == 0 {
            0.0
        } else {
            rand::thread_rng().gen_range(0.0..f64::from(attempt))
        };
        self.cap(self.unit.mul_f64(Self::base_factor(attempt) + jitter))
    }

    /// Mean delay for `attempt`, i.e. the base plus the mean jitter.
    pub fn expected_delay(&self, attempt: u32) -> Duration {
        self.cap(
            self.unit
                .mul_f64(Self::base_factor(attempt) + f64::from(attempt) / 2.0),
        )
    }

    fn base_factor(attempt: u32) -> f64 {
        2f64.powi(attempt.min(30) as i32)
    }

    fn cap(&self, delay: Duration) -> Duration {
        match self.max_backoff {
            Some(max) => delay.min(max),
            None => delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}
