//! Chat notifications
//!
//! Events are rendered once in Telegram Markdown and fanned out to every
//! backend selected by the [`NotificationMode`]. Delivery problems are logged
//! and counted, never returned to the caller.

pub mod discord;
pub mod telegram;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::metrics;
use crate::state::report_offset;

pub use discord::DiscordBackend;
pub use telegram::TelegramBackend;

//==============================================================================
// Types
//==============================================================================

/// Which chat backends receive notifications
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationMode {
    #[default]
    Telegram,
    Discord,
    Both,
    None,
}

impl NotificationMode {
    pub fn includes_telegram(&self) -> bool {
        matches!(self, NotificationMode::Telegram | NotificationMode::Both)
    }

    pub fn includes_discord(&self) -> bool {
        matches!(self, NotificationMode::Discord | NotificationMode::Both)
    }
}

impl FromStr for NotificationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "telegram" => Ok(NotificationMode::Telegram),
            "discord" => Ok(NotificationMode::Discord),
            "both" => Ok(NotificationMode::Both),
            "none" => Ok(NotificationMode::None),
            other => Err(anyhow!(
                "Invalid notification mode '{}': expected telegram, discord, both or none",
                other
            )),
        }
    }
}

impl fmt::Display for NotificationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NotificationMode::Telegram => "telegram",
            NotificationMode::Discord => "discord",
            NotificationMode::Both => "both",
            NotificationMode::None => "none",
        };
        f.write_str(name)
    }
}

/// Something worth telling the operator about
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    DnsUpdated {
        domain: String,
        old_ip: String,
        new_ip: String,
        ttl: u32,
        proxied: bool,
        at: DateTime<Utc>,
    },
    FailureStreak {
        streak: u32,
    },
    DailyReport {
        at: DateTime<Utc>,
        uptime: Duration,
        domains: usize,
        successful_updates: u64,
        failed_updates: u64,
        success_rate: u32,
        last_successful_check: Option<DateTime<Utc>>,
        consecutive_failures: u32,
    },
    ShuttingDown {
        uptime: Duration,
        at: DateTime<Utc>,
    },
}

impl NotificationEvent {
    /// Renders the event as Telegram Markdown (`*bold*`)
    pub fn render(&self) -> String {
        match self {
            NotificationEvent::DnsUpdated {
                domain,
                old_ip,
                new_ip,
                ttl,
                proxied,
                at,
            } => format!(
                "🌐 *DNS record updated* 🌐\n\
                 📍 *Domain*: {}\n\
                 🔄 *Old IP*: {}\n\
                 ✅ *New IP*: {}\n\
                 ⚙️ *TTL*: {}s\n\
                 ☁️ *Proxied*: {}\n\
                 🕒 *Time*: {}",
                domain,
                old_ip,
                new_ip,
                ttl,
                if *proxied { "Yes" } else { "No" },
                local_time(at)
            ),
            NotificationEvent::FailureStreak { streak } => format!(
                "🚨 *SYSTEM ALERT* 🚨\ncfddns has failed {} times in a row. Check it now!",
                streak
            ),
            NotificationEvent::DailyReport {
                at,
                uptime,
                domains,
                successful_updates,
                failed_updates,
                success_rate,
                last_successful_check,
                consecutive_failures,
            } => format!(
                "📊 *DAILY REPORT* 📊\n\
                 ⏰ *Time*: {}\n\
                 🕐 *Uptime*: {:.1} hours\n\
                 🌐 *Domains*: {}\n\
                 ✅ *Successful updates*: {}\n\
                 ❌ *Failed updates*: {}\n\
                 📈 *Success rate*: {}%\n\
                 🔄 *Last check*: {}\n\
                 ⚙️ *Status*: {}",
                local_time(at),
                uptime.as_secs_f64() / 3600.0,
                domains,
                successful_updates,
                failed_updates,
                success_rate,
                last_successful_check
                    .as_ref()
                    .map(local_time)
                    .unwrap_or_else(|| "none yet".to_string()),
                if *consecutive_failures > 0 {
                    "Has problems"
                } else {
                    "Stable"
                }
            ),
            NotificationEvent::ShuttingDown { uptime, at } => format!(
                "🛑 *cfddns is stopping*\n⏰ *Uptime*: {} minutes\n📅 *Time*: {}",
                uptime.as_secs() / 60,
                local_time(at)
            ),
        }
    }
}

fn local_time(at: &DateTime<Utc>) -> String {
    at.with_timezone(&report_offset())
        .format("%Y-%m-%d %H:%M:%S (UTC+7)")
        .to_string()
}

/// Replaces every non-empty secret in `message` with a placeholder
pub fn redact_secrets(message: &str, secrets: &[&str]) -> String {
    let mut sanitized = message.to_string();
    for secret in secrets {
        if !secret.is_empty() {
            sanitized = sanitized.replace(secret, "***REDACTED***");
        }
    }
    sanitized
}

//==============================================================================
// Traits
//==============================================================================

/// Fire-and-forget delivery of notification events
#[async_trait]
pub trait Notify: Send + Sync {
    /// Delivers `event` to every selected channel and waits for all of them
    async fn notify(&self, event: &NotificationEvent);
}

/// One chat channel
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Short name used in logs and metric labels
    fn name(&self) -> &'static str;

    /// False when credentials are missing; the backend is then skipped
    fn is_configured(&self) -> bool;

    /// Sends a Telegram-Markdown message, retrying transient failures
    async fn send(&self, markdown: &str) -> Result<()>;
}

//==============================================================================
// Notifier
//==============================================================================

pub struct Notifier {
    telegram: Option<Box<dyn ChatBackend>>,
    discord: Option<Box<dyn ChatBackend>>,
}

impl Notifier {
    /// Keeps only the backends selected by `mode`
    pub fn new(
        mode: NotificationMode,
        telegram: Box<dyn ChatBackend>,
        discord: Box<dyn ChatBackend>,
    ) -> Self {
        Self {
            telegram: mode.includes_telegram().then_some(telegram),
            discord: mode.includes_discord().then_some(discord),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let telegram = TelegramBackend::new(config.telegram.clone())?;
        let discord = DiscordBackend::new(config.discord.clone())?;
        Ok(Self::new(
            config.notification_mode,
            Box::new(telegram),
            Box::new(discord),
        ))
    }
}

async fn deliver(backend: Option<&dyn ChatBackend>, text: &str) {
    let Some(backend) = backend else {
        return;
    };

    if !backend.is_configured() {
        warn!("Skipping {} notification: not configured", backend.name());
        metrics::record_notification(backend.name(), "skipped");
        return;
    }

    match backend.send(text).await {
        Ok(()) => {
            info!("Sent {} notification", backend.name());
            metrics::record_notification(backend.name(), "sent");
        }
        Err(e) => {
            error!("Failed to send {} notification: {:#}", backend.name(), e);
            metrics::record_notification(backend.name(), "failed");
        }
    }
}

#[async_trait]
impl Notify for Notifier {
    async fn notify(&self, event: &NotificationEvent) {
        let text = event.render();
        tokio::join!(
            deliver(self.telegram.as_deref(), &text),
            deliver(self.discord.as_deref(), &text),
        );
    }
}

//==============================================================================
// Tests
//==============================================================================
