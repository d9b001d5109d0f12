//! Reconciliation loop
//!
//! One tick resolves the public address once, then walks every configured
//! domain in order and brings its record in line with that address.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::DomainTarget;
use crate::constants::FAILURE_STREAK_ALERT_THRESHOLD;
use crate::dns_provider::{DnsProvider, RecordType};
use crate::ip::PublicIpSource;
use crate::metrics;
use crate::notify::{NotificationEvent, Notify};
use crate::state::SharedStats;

/// What a single call to [`Reconciler::run_tick`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running; nothing was done
    Skipped,
    /// No public address could be determined; no domain was touched
    NoAddress,
    Completed {
        updated: usize,
        unchanged: usize,
        failed: usize,
    },
}

enum DomainResult {
    Updated,
    Unchanged,
    /// Record could not be read; marks the tick as failing
    Failed,
    /// Record was read but the update was rejected; counted, not a tick failure
    UpdateFailed,
}

/// Releases the single-flight flag when the tick ends, even if its future is dropped
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Reconciler {
    ip_source: Arc<dyn PublicIpSource>,
    provider: Arc<dyn DnsProvider>,
    notifier: Arc<dyn Notify>,
    domains: Vec<DomainTarget>,
    stats: SharedStats,
    running: AtomicBool,
}

impl Reconciler {
    pub fn new(
        ip_source: Arc<dyn PublicIpSource>,
        provider: Arc<dyn DnsProvider>,
        notifier: Arc<dyn Notify>,
        domains: Vec<DomainTarget>,
        stats: SharedStats,
    ) -> Self {
        Self {
            ip_source,
            provider,
            notifier,
            domains,
            stats,
            running: AtomicBool::new(false),
        }
    }

    /// True while a tick is in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    fn try_begin(&self) -> Option<TickGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard(&self.running))
    }

    /// Runs one reconciliation tick
    ///
    /// Overlapping calls are dropped, not queued: if a tick is already in
    /// flight this returns [`TickOutcome::Skipped`] without any network call.
    pub async fn run_tick(&self) -> TickOutcome {
        let Some(_guard) = self.try_begin() else {
            warn!("Previous check still running, skipping this one");
            return TickOutcome::Skipped;
        };
        let _timer = metrics::start_tick_timer();

        let Some(ip) = self.ip_source.resolve().await else {
            let streak = self.stats.lock().await.record_failed_tick();
            error!(
                "Could not determine public IP, skipping this check (failure streak: {})",
                streak
            );
            return TickOutcome::NoAddress;
        };

        let record_type = RecordType::for_address(&ip);
        let (mut updated, mut unchanged, mut failed, mut update_failed) = (0, 0, 0, 0);
        for target in &self.domains {
            match self.reconcile_domain(target, record_type, &ip).await {
                DomainResult::Updated => updated += 1,
                DomainResult::Unchanged => unchanged += 1,
                DomainResult::Failed => failed += 1,
                DomainResult::UpdateFailed => update_failed += 1,
            }
        }

        // only lookup failures break the streak of clean ticks
        let streak = {
            let mut stats = self.stats.lock().await;
            if failed == 0 {
                stats.record_clean_tick(Utc::now());
                0
            } else {
                stats.record_failed_tick()
            }
        };

        let failed = failed + update_failed;
        info!(
            "Check complete for {}: {} updated, {} unchanged, {} failed",
            ip, updated, unchanged, failed
        );

        if streak >= FAILURE_STREAK_ALERT_THRESHOLD {
            error!("Too many consecutive failures ({}), system needs attention", streak);
            self.notifier
                .notify(&NotificationEvent::FailureStreak { streak })
                .await;
        }

        TickOutcome::Completed {
            updated,
            unchanged,
            failed,
        }
    }

    async fn reconcile_domain(
        &self,
        target: &DomainTarget,
        record_type: RecordType,
        ip: &str,
    ) -> DomainResult {
        let record = match self.provider.fetch_record(target, record_type).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("No {} record found for {}", record_type, target.name);
                self.count_failure(target, "missing").await;
                return DomainResult::Failed;
            }
            Err(e) => {
                error!("Failed to fetch {} record for {}: {:#}", record_type, target.name, e);
                self.count_failure(target, "fetch").await;
                return DomainResult::Failed;
            }
        };

        if record.content == ip {
            debug!("{} already points at {}", target.name, ip);
            return DomainResult::Unchanged;
        }

        info!(
            "{} record for {} differs ({} vs {}), updating",
            record_type, target.name, record.content, ip
        );
        if let Err(e) = self.provider.update_record(target, &record, ip).await {
            error!("Failed to update {} record for {}: {:#}", record_type, target.name, e);
            self.count_failure(target, "update").await;
            return DomainResult::UpdateFailed;
        }

        info!(
            "Updated {} record for {} to {} (TTL: {}s, Proxied: {})",
            record_type, target.name, ip, target.ttl, target.proxied
        );
        self.stats.lock().await.successful_updates += 1;
        metrics::record_dns_update(&target.name);

        self.notifier
            .notify(&NotificationEvent::DnsUpdated {
                domain: target.name.clone(),
                old_ip: record.content,
                new_ip: ip.to_string(),
                ttl: target.ttl,
                proxied: target.proxied,
                at: Utc::now(),
            })
            .await;

        DomainResult::Updated
    }

    async fn count_failure(&self, target: &DomainTarget, stage: &str) {
        self.stats.lock().await.failed_updates += 1;
        metrics::record_dns_error(&target.name, stage);
    }
}

//==============================================================================
// Tests
//==============================================================================
