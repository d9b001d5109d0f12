//! Runtime counters shared by the reconciliation loop and the supervisor

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use tokio::sync::Mutex;

use crate::constants::REPORT_UTC_OFFSET_SECS;
use crate::metrics;

/// Clock used for human-facing timestamps and the daily report (UTC+7)
pub fn report_offset() -> FixedOffset {
    FixedOffset::east_opt(REPORT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Counters and timestamps for one process lifetime
#[derive(Debug, Clone)]
pub struct ServiceStats {
    /// Records updated and confirmed by the provider
    pub successful_updates: u64,
    /// Per-domain failures (fetch error, missing record, failed update)
    pub failed_updates: u64,
    /// Ticks in a row that did not complete cleanly
    pub consecutive_failures: u32,
    /// End of the last tick with zero failures
    pub last_successful_check: Option<DateTime<Utc>>,
    /// Day of month (UTC+7) on which the last daily report went out
    pub last_report_day: Option<u32>,
    pub started_at: DateTime<Utc>,
}

pub type SharedStats = Arc<Mutex<ServiceStats>>;

impl ServiceStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            successful_updates: 0,
            failed_updates: 0,
            consecutive_failures: 0,
            last_successful_check: None,
            last_report_day: None,
            started_at,
        }
    }

    pub fn shared(started_at: DateTime<Utc>) -> SharedStats {
        Arc::new(Mutex::new(Self::new(started_at)))
    }

    /// Resets the failure streak after a clean tick
    pub fn record_clean_tick(&mut self, at: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.last_successful_check = Some(at);
        metrics::FAILURE_STREAK.set(0);
        metrics::LAST_SUCCESS_TIMESTAMP.set(at.timestamp());
    }

    /// Extends the failure streak and returns its new length
    pub fn record_failed_tick(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        metrics::FAILURE_STREAK.set(i64::from(self.consecutive_failures));
        self.consecutive_failures
    }

    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or_default()
    }

    /// Percentage of confirmed updates among all update outcomes
    ///
    /// Returns 0 when nothing has been attempted yet.
    pub fn success_rate(&self) -> u32 {
        let total = self.successful_updates + self.failed_updates;
        if total == 0 {
            return 0;
        }
        ((self.successful_updates as f64 / total as f64) * 100.0).round() as u32
    }

    /// True when no tick has succeeded within `max_age`
    ///
    /// A process that never succeeded is only stale once it has been up
    /// longer than `max_age`.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        match self.last_successful_check {
            Some(at) => (now - at).to_std().unwrap_or_default() > max_age,
            None => self.uptime(now) > max_age,
        }
    }

    pub fn is_healthy(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.consecutive_failures == 0 && !self.is_stale(now, max_age)
    }
}
