//! In-memory collaborators for unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use zeroize::Zeroizing;

use crate::config::DomainTarget;
use crate::dns_provider::{DnsProvider, DnsRecordSnapshot, RecordType};
use crate::ip::PublicIpSource;
use crate::notify::{NotificationEvent, Notify};
use crate::reconcile::Reconciler;
use crate::state::{ServiceStats, SharedStats};

#[derive(Default)]
pub struct FakeIp {
    pub ip: Mutex<Option<String>>,
    pub delay: Duration,
    pub calls: AtomicU32,
}

impl FakeIp {
    pub fn returning(ip: Option<&str>) -> Self {
        Self {
            ip: Mutex::new(ip.map(str::to_string)),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PublicIpSource for FakeIp {
    async fn resolve(&self) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.ip.lock().unwrap().clone()
    }
}

#[derive(Default)]
pub struct FakeProvider {
    /// Current record content by domain name; absent means no record
    pub records: Mutex<HashMap<String, String>>,
    pub fail_fetch: HashSet<String>,
    pub fail_update: HashSet<String>,
    pub fetch_calls: AtomicU32,
    pub update_calls: AtomicU32,
}

impl FakeProvider {
    pub fn with_records(pairs: &[(&str, &str)]) -> Self {
        Self {
            records: Mutex::new(
                pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn fetch_calls(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DnsProvider for FakeProvider {
    async fn fetch_record(
        &self,
        target: &DomainTarget,
        record_type: RecordType,
    ) -> Result<Option<DnsRecordSnapshot>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.contains(&target.name) {
            return Err(anyhow!("fetch exploded"));
        }
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&target.name)
            .map(|content| DnsRecordSnapshot {
                id: format!("id-{}", target.name),
                record_type,
                name: target.name.clone(),
                content: content.clone(),
            }))
    }

    async fn update_record(
        &self,
        target: &DomainTarget,
        _record: &DnsRecordSnapshot,
        new_ip: &str,
    ) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_update.contains(&target.name) {
            return Err(anyhow!("update exploded"));
        }
        self.records
            .lock()
            .unwrap()
            .insert(target.name.clone(), new_ip.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeNotifier {
    pub events: Mutex<Vec<NotificationEvent>>,
}

impl FakeNotifier {
    pub fn events(&self) -> Vec<NotificationEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notify for FakeNotifier {
    async fn notify(&self, event: &NotificationEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

pub fn domain(name: &str) -> DomainTarget {
    DomainTarget {
        name: name.to_string(),
        zone_id: "zone".to_string(),
        api_token: Zeroizing::new("token".to_string()),
        ttl: 60,
        proxied: false,
    }
}

/// A reconciler wired to fakes, with handles to inspect them
pub struct Harness {
    pub ip: Arc<FakeIp>,
    pub provider: Arc<FakeProvider>,
    pub notifier: Arc<FakeNotifier>,
    pub stats: SharedStats,
    pub reconciler: Arc<Reconciler>,
}

pub fn harness(ip: FakeIp, provider: FakeProvider, names: &[&str]) -> Harness {
    let ip = Arc::new(ip);
    let provider = Arc::new(provider);
    let notifier = Arc::new(FakeNotifier::default());
    let stats = ServiceStats::shared(Utc::now());
    let reconciler = Arc::new(Reconciler::new(
        ip.clone(),
        provider.clone(),
        notifier.clone(),
        names.iter().map(|n| domain(n)).collect(),
        stats.clone(),
    ));
    Harness {
        ip,
        provider,
        notifier,
        stats,
        reconciler,
    }
}
