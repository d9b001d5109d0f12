//! Bounded retry with exponential backoff
//!
//! Shared by the Cloudflare client and the notification backends. The IP
//! resolver deliberately does not use it: a failing endpoint falls through to
//! the next one instead.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::{error, warn};

use crate::constants::{
    DNS_RETRY_ATTEMPTS, DNS_RETRY_INITIAL_DELAY, DNS_RETRY_MAX_DELAY, NOTIFY_RETRY_ATTEMPTS,
    NOTIFY_RETRY_INITIAL_DELAY, NOTIFY_RETRY_JITTER, NOTIFY_RETRY_MAX_DELAY,
};

/// Maximum exponent used when doubling the delay
const MAX_EXPONENT: u32 = 16;

//==============================================================================
// Policy
//==============================================================================

/// How often and how patiently an operation is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first
    pub attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for the exponential part of the delay
    pub max_delay: Duration,
    /// Upper bound (exclusive) of the random delay added on top
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Policy for Cloudflare API calls: 3 attempts, 1s doubling to 10s, no jitter
    pub const fn dns() -> Self {
        Self {
            attempts: DNS_RETRY_ATTEMPTS,
            initial_delay: DNS_RETRY_INITIAL_DELAY,
            max_delay: DNS_RETRY_MAX_DELAY,
            jitter: Duration::ZERO,
        }
    }

    /// Policy for chat notifications: 5 attempts, 500ms doubling to 15s, up to 300ms jitter
    pub const fn notification() -> Self {
        Self {
            attempts: NOTIFY_RETRY_ATTEMPTS,
            initial_delay: NOTIFY_RETRY_INITIAL_DELAY,
            max_delay: NOTIFY_RETRY_MAX_DELAY,
            jitter: NOTIFY_RETRY_JITTER,
        }
    }

    /// Calculates the backoff delay after the given failed attempt
    ///
    /// The formula is `min(initial_delay * 2^(attempt - 1), max_delay)`,
    /// where `attempt` is 1-based. Jitter is not included.
    ///
    /// ```
    /// use cfddns::retry::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::dns();
    /// assert_eq!(policy.backoff_delay(1), Duration::from_millis(1000));
    /// assert_eq!(policy.backoff_delay(2), Duration::from_millis(2000));
    /// assert_eq!(policy.backoff_delay(5), Duration::from_secs(10));
    /// ```
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(MAX_EXPONENT);
        self.initial_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    fn delay_with_jitter(&self, attempt: u32) -> Duration {
        let base = self.backoff_delay(attempt);
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
    }
}

//==============================================================================
// Executor
//==============================================================================

/// Runs `op` until it succeeds or `policy.attempts` attempts have failed
///
/// Non-final failures are logged as warnings and swallowed. When every
/// attempt fails, the error from the last attempt is returned.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= attempts => {
                error!("{} failed after {} attempts: {:#}", label, attempts, e);
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_with_jitter(attempt);
                warn!(
                    "{} (attempt {}/{}): {:#}. Retrying in {:?}",
                    label, attempt, attempts, e, delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

//==============================================================================
// Tests
//==============================================================================
