//! Daemon module for cfddns
//!
//! The [`Supervisor`] owns the process lifecycle: the startup grace period
//! and network readiness probe, the three periodic timers of steady state,
//! and graceful shutdown on SIGINT/SIGTERM.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc};
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{Config, StartupSettings};
use crate::constants::{
    DAILY_REPORT_HOUR, DAILY_REPORT_POLL_INTERVAL, HEALTH_CHECK_INTERVAL, HEALTH_STALE_FACTOR,
    READINESS_MAX_WAIT, READINESS_POLL_INTERVAL, READINESS_RETRY_MAX, READINESS_RETRY_STEP,
    SHUTDOWN_DRAIN_POLL, SHUTDOWN_DRAIN_TIMEOUT,
};
use crate::health::HealthServer;
use crate::ip::PublicIpSource;
use crate::notify::{NotificationEvent, Notify};
use crate::reconcile::Reconciler;
use crate::state::{report_offset, SharedStats};

//==============================================================================
// State Machine
//==============================================================================

/// Where the process is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    SteadyState,
    ShuttingDown,
    Terminated,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Starting => "starting",
            LifecycleState::SteadyState => "steady-state",
            LifecycleState::ShuttingDown => "shutting-down",
            LifecycleState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// How shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// No tick was in flight, or it finished before the deadline
    Clean,
    /// An in-flight tick outlived the drain deadline
    Forced,
}

impl ShutdownOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownOutcome::Clean => 0,
            ShutdownOutcome::Forced => 1,
        }
    }
}

/// Timer and startup settings taken from [`Config`]
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub check_interval: Duration,
    pub startup: StartupSettings,
    /// 0 disables the health endpoint
    pub health_port: u16,
}

impl From<&Config> for SupervisorSettings {
    fn from(config: &Config) -> Self {
        Self {
            check_interval: config.check_interval,
            startup: config.startup.clone(),
            health_port: config.health_port,
        }
    }
}

/// True when the daily report is due at `now`
///
/// The report goes out the first time the local hour equals
/// [`DAILY_REPORT_HOUR`] on a day-of-month other than `last_day`.
pub fn should_send_daily_report(now: &DateTime<FixedOffset>, last_day: Option<u32>) -> bool {
    now.hour() == DAILY_REPORT_HOUR && last_day != Some(now.day())
}

/// Pause between two readiness attempts: 5s, 10s, ... capped at 30s
pub fn readiness_retry_delay(attempt: u32) -> Duration {
    READINESS_RETRY_STEP
        .saturating_mul(attempt)
        .min(READINESS_RETRY_MAX)
}

//==============================================================================
// Supervisor
//==============================================================================

pub struct Supervisor {
    reconciler: Arc<Reconciler>,
    ip_source: Arc<dyn PublicIpSource>,
    notifier: Arc<dyn Notify>,
    stats: SharedStats,
    settings: SupervisorSettings,
    state: Mutex<LifecycleState>,
    shutting_down: AtomicBool,
    /// Timers and the startup sequence; aborted on shutdown
    tasks: Mutex<Vec<JoinHandle<()>>>,
    health: Mutex<Option<HealthServer>>,
}

impl Supervisor {
    pub fn new(
        reconciler: Arc<Reconciler>,
        ip_source: Arc<dyn PublicIpSource>,
        notifier: Arc<dyn Notify>,
        stats: SharedStats,
        settings: SupervisorSettings,
    ) -> Self {
        Self {
            reconciler,
            ip_source,
            notifier,
            stats,
            settings,
            state: Mutex::new(LifecycleState::Starting),
            shutting_down: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            health: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, to: LifecycleState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != to {
            info!("Lifecycle: {} -> {}", *state, to);
            *state = to;
        }
    }

    fn stale_after(&self) -> Duration {
        self.settings.check_interval.saturating_mul(HEALTH_STALE_FACTOR)
    }

    /// Registers a background task, unless shutdown has already begun
    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if self.shutting_down.load(Ordering::SeqCst) {
            handle.abort();
            return;
        }
        tasks.push(handle);
    }

    /// Runs until SIGINT or SIGTERM, then shuts down
    ///
    /// Signal handlers are installed before anything else is started.
    pub async fn run(self: Arc<Self>) -> Result<ShutdownOutcome> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        self.start().await?;

        loop {
            let name = tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            };
            info!("{} received, shutting down", name);
            if let Some(outcome) = self.shutdown().await {
                return Ok(outcome);
            }
        }
    }

    /// Starts the health endpoint, the daily report timer and the startup sequence
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        info!(
            "Starting cfddns for {} domain(s), checking every {}s",
            self.reconciler.domain_count(),
            self.settings.check_interval.as_secs()
        );

        if self.settings.health_port != 0 {
            let addr = SocketAddr::from(([0, 0, 0, 0], self.settings.health_port));
            let server = HealthServer::start(addr, self.stats.clone(), self.stale_after()).await?;
            *self.health.lock().unwrap_or_else(|e| e.into_inner()) = Some(server);
        }

        let this = Arc::clone(self);
        self.track(tokio::spawn(async move { this.daily_report_loop().await }));

        let this = Arc::clone(self);
        self.track(tokio::spawn(async move { this.startup().await }));
        Ok(())
    }

    async fn startup(self: Arc<Self>) {
        let delay = self.settings.startup.delay;
        if !delay.is_zero() {
            info!("Waiting {}s for the network to settle", delay.as_secs());
            sleep(delay).await;
        }

        let attempts = self.settings.startup.retries;
        let mut ready = false;
        for attempt in 1..=attempts {
            info!("Checking network readiness (attempt {}/{})", attempt, attempts);
            if self.wait_for_network().await {
                ready = true;
                break;
            }
            if attempt < attempts {
                let pause = readiness_retry_delay(attempt);
                warn!("Network not ready, retrying in {}s", pause.as_secs());
                sleep(pause).await;
            }
        }
        if ready {
            info!("Network is ready");
        } else {
            error!("Network not ready after {} attempt(s), continuing anyway", attempts);
        }

        // spawned so that aborting startup never cancels the tick itself
        let reconciler = Arc::clone(&self.reconciler);
        let first = tokio::spawn(async move { reconciler.run_tick().await });
        if let Err(e) = first.await {
            error!("Initial check panicked: {}", e);
        }

        self.enter_steady_state();
    }

    /// Polls the IP source until it answers or the attempt's budget is spent
    async fn wait_for_network(&self) -> bool {
        let polls = (READINESS_MAX_WAIT.as_secs() / READINESS_POLL_INTERVAL.as_secs()).max(1);
        for poll in 1..=polls {
            if self.ip_source.resolve().await.is_some() {
                return true;
            }
            if poll < polls {
                sleep(READINESS_POLL_INTERVAL).await;
            }
        }
        false
    }

    fn enter_steady_state(self: &Arc<Self>) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        self.transition(LifecycleState::SteadyState);

        let this = Arc::clone(self);
        self.track(tokio::spawn(async move { this.reconcile_loop().await }));

        let this = Arc::clone(self);
        self.track(tokio::spawn(async move { this.health_check_loop().await }));
    }

    async fn reconcile_loop(self: Arc<Self>) {
        let mut timer = interval(self.settings.check_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // the startup tick already covered t=0
        timer.tick().await;

        loop {
            timer.tick().await;
            if self.shutting_down.load(Ordering::SeqCst) {
                break;
            }
            let reconciler = Arc::clone(&self.reconciler);
            tokio::spawn(async move {
                reconciler.run_tick().await;
            });
        }
    }

    async fn health_check_loop(self: Arc<Self>) {
        let mut timer = interval(HEALTH_CHECK_INTERVAL);
        timer.tick().await;

        loop {
            timer.tick().await;
            self.check_health().await;
        }
    }

    /// Warns when no tick has succeeded within 3 check intervals
    pub async fn check_health(&self) -> bool {
        let stats = self.stats.lock().await;
        let now = Utc::now();
        let max_age = self.stale_after();
        if stats.is_stale(now, max_age) {
            match stats.last_successful_check {
                Some(at) => warn!(
                    "No successful check for {}s (limit {}s)",
                    (now - at).num_seconds(),
                    max_age.as_secs()
                ),
                None => warn!(
                    "No successful check since startup {}s ago (limit {}s)",
                    stats.uptime(now).as_secs(),
                    max_age.as_secs()
                ),
            }
            return false;
        }
        debug!("Health check OK");
        true
    }

    async fn daily_report_loop(self: Arc<Self>) {
        let mut timer = interval(DAILY_REPORT_POLL_INTERVAL);
        loop {
            timer.tick().await;
            self.maybe_send_daily_report(Utc::now()).await;
        }
    }

    /// Sends the daily report if it is due at `now`; returns whether it did
    pub async fn maybe_send_daily_report(&self, now: DateTime<Utc>) -> bool {
        let local = now.with_timezone(&report_offset());
        let event = {
            let mut stats = self.stats.lock().await;
            if !should_send_daily_report(&local, stats.last_report_day) {
                return false;
            }
            stats.last_report_day = Some(local.day());
            NotificationEvent::DailyReport {
                at: now,
                uptime: stats.uptime(now),
                domains: self.reconciler.domain_count(),
                successful_updates: stats.successful_updates,
                failed_updates: stats.failed_updates,
                success_rate: stats.success_rate(),
                last_successful_check: stats.last_successful_check,
                consecutive_failures: stats.consecutive_failures,
            }
        };

        info!("Sending daily report");
        self.notifier.notify(&event).await;
        true
    }

    /// Shuts the daemon down
    ///
    /// Returns `None` when shutdown was already in progress. Otherwise sends
    /// the shutdown notification, stops every timer and the health endpoint,
    /// and waits up to 30s for an in-flight tick to finish. The tick itself
    /// is never cancelled.
    pub async fn shutdown(&self) -> Option<ShutdownOutcome> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            debug!("Shutdown already in progress");
            return None;
        }
        self.transition(LifecycleState::ShuttingDown);

        let now = Utc::now();
        let uptime = self.stats.lock().await.uptime(now);
        self.notifier
            .notify(&NotificationEvent::ShuttingDown { uptime, at: now })
            .await;

        for task in self
            .tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
        {
            task.abort();
        }
        if let Some(mut server) = self.health.lock().unwrap_or_else(|e| e.into_inner()).take() {
            server.stop();
        }

        let outcome = self.drain().await;
        self.transition(LifecycleState::Terminated);
        if outcome == ShutdownOutcome::Clean {
            info!("cfddns stopped");
        }
        Some(outcome)
    }

    async fn drain(&self) -> ShutdownOutcome {
        if !self.reconciler.is_running() {
            return ShutdownOutcome::Clean;
        }

        info!("Waiting for the running check to finish");
        let deadline = Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while self.reconciler.is_running() {
            if Instant::now() >= deadline {
                error!(
                    "Check still running after {}s, forcing exit",
                    SHUTDOWN_DRAIN_TIMEOUT.as_secs()
                );
                return ShutdownOutcome::Forced;
            }
            sleep(SHUTDOWN_DRAIN_POLL).await;
        }
        ShutdownOutcome::Clean
    }
}

//==============================================================================
// Tests
//==============================================================================
