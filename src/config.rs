//! Configuration module for cfddns
//!
//! This module handles loading and validating configuration from a TOML file
//! and environment variables.

use std::env;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use serde::Deserialize;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::constants::{
    CONFIG_LOAD_ATTEMPTS, CONFIG_LOAD_RETRY_DELAY, DEFAULT_CHECK_INTERVAL_SECS,
    DEFAULT_STARTUP_DELAY_SECS, DEFAULT_STARTUP_RETRIES, DEFAULT_TIMEOUT_SECS, DEFAULT_TTL,
    ENV_API_TOKEN, ENV_DISCORD_WEBHOOK_URL, ENV_NOTIFICATION_MODE, ENV_TELEGRAM_BOT_TOKEN,
    ENV_TELEGRAM_CHAT_ID, MAX_CHECK_INTERVAL_SECS, MAX_TIMEOUT_SECS, MIN_CHECK_INTERVAL_SECS,
    MIN_TIMEOUT_SECS,
};
use crate::notify::NotificationMode;
use crate::retry::{retry, RetryPolicy};
use crate::validation::validate_domain_name;

//==============================================================================
// Domain
//==============================================================================

/// One managed DNS host record
///
/// Built once at startup with the `[defaults]` table already applied, and
/// never modified afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct DomainTarget {
    /// Host name, e.g. `home.example.com`
    pub name: String,
    /// Cloudflare zone identifier
    pub zone_id: String,
    /// Bearer token with `Zone:DNS:Edit` on `zone_id`
    pub api_token: Zeroizing<String>,
    /// TTL in seconds (1 = automatic)
    pub ttl: u32,
    /// Whether traffic is proxied through Cloudflare
    pub proxied: bool,
}

impl fmt::Debug for DomainTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainTarget")
            .field("name", &self.name)
            .field("zone_id", &self.zone_id)
            .field("api_token", &mask_secret(&self.api_token))
            .field("ttl", &self.ttl)
            .field("proxied", &self.proxied)
            .finish()
    }
}

//==============================================================================
// Config
//==============================================================================

/// Startup sequence settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupSettings {
    /// Grace period before the first network probe
    pub delay: Duration,
    /// Number of network readiness attempts
    pub retries: u32,
}

/// Telegram bot credentials; either may be absent
#[derive(Clone, Default)]
pub struct TelegramSettings {
    pub bot_token: Option<Zeroizing<String>>,
    pub chat_id: Option<String>,
}

impl TelegramSettings {
    pub fn is_complete(&self) -> bool {
        self.bot_token.is_some() && self.chat_id.is_some()
    }
}

impl fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("bot_token", &self.bot_token.as_ref().map(|t| mask_secret(t)))
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Discord webhook settings
#[derive(Clone, Default)]
pub struct DiscordSettings {
    pub webhook_url: Option<Zeroizing<String>>,
}

impl fmt::Debug for DiscordSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordSettings")
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Configuration for the cfddns daemon
///
/// # Configuration Loading Priority
///
/// 1. Environment variables (highest priority, non-empty values only)
/// 2. Config file (`/etc/cfddns/config.toml` or `--config`)
/// 3. Defaults (lowest priority)
///
/// The default API token from either source is inherited by every domain
/// that does not set its own.
#[derive(Debug, Clone)]
pub struct Config {
    /// Reconciliation interval
    ///
    /// Default: 60 seconds
    pub check_interval: Duration,
    /// Per-request network timeout
    ///
    /// Default: 10 seconds
    pub timeout: Duration,
    /// Port for the health endpoint (0 = disabled)
    pub health_port: u16,
    pub startup: StartupSettings,
    /// Which chat backends receive notifications
    ///
    /// Can be set via the `CFDDNS_NOTIFICATION_MODE` environment variable.
    pub notification_mode: NotificationMode,
    pub telegram: TelegramSettings,
    pub discord: DiscordSettings,
    /// Managed records, in the order they are reconciled
    pub domains: Vec<DomainTarget>,
}

impl Config {
    /// Loads configuration from `path` and the environment in one attempt
    ///
    /// # Environment Variables
    ///
    /// - `CLOUDFLARE_API_TOKEN` - default API token
    /// - `TELEGRAM_BOT_TOKEN`, `TELEGRAM_CHAT_ID` - Telegram credentials
    /// - `DISCORD_WEBHOOK_URL` - Discord webhook
    /// - `CFDDNS_NOTIFICATION_MODE` - telegram|discord|both|none
    pub fn load(path: &Path) -> Result<Self> {
        let raw = read_file(path)?;
        Self::from_raw(raw)
    }

    /// Loads configuration, retrying unreadable or unparsable files
    ///
    /// The file is read up to 10 times, 5 seconds apart. Validation errors
    /// are not retried: a file that parses but is wrong stays wrong.
    pub async fn load_with_retry(path: &Path) -> Result<Self> {
        let policy = RetryPolicy {
            attempts: CONFIG_LOAD_ATTEMPTS,
            initial_delay: CONFIG_LOAD_RETRY_DELAY,
            max_delay: CONFIG_LOAD_RETRY_DELAY,
            jitter: Duration::ZERO,
        };
        let label = format!("Loading config {}", path.display());
        let raw = retry(&policy, &label, || async { read_file(path) }).await?;
        info!("Loaded config from {}", path.display());
        Self::from_raw(raw)
    }

    fn from_raw(mut raw: TomlConfig) -> Result<Self> {
        override_with_env(&mut raw);

        let notification_mode = match raw.notification.mode.as_deref() {
            Some(mode) => mode.parse()?,
            None => NotificationMode::default(),
        };

        let default_ttl = raw.defaults.ttl.unwrap_or(DEFAULT_TTL);
        let default_proxied = raw.defaults.proxied.unwrap_or(false);
        let default_token = raw.defaults.api_token.take().unwrap_or_default();

        let domains = raw
            .domains
            .into_iter()
            .map(|d| DomainTarget {
                name: d.name.unwrap_or_default().trim().to_string(),
                zone_id: d.zone_id.unwrap_or_default().trim().to_string(),
                api_token: Zeroizing::new(
                    d.api_token
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| default_token.clone())
                        .trim()
                        .to_string(),
                ),
                ttl: d.ttl.unwrap_or(default_ttl),
                proxied: d.proxied.unwrap_or(default_proxied),
            })
            .collect();

        let telegram = raw.telegram.unwrap_or_default();
        let discord = raw.discord.unwrap_or_default();

        let config = Self {
            check_interval: Duration::from_secs(
                raw.check_interval.unwrap_or(DEFAULT_CHECK_INTERVAL_SECS),
            ),
            timeout: Duration::from_secs(raw.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            health_port: raw.health_port.unwrap_or(0),
            startup: StartupSettings {
                delay: Duration::from_secs(raw.startup.delay.unwrap_or(DEFAULT_STARTUP_DELAY_SECS)),
                retries: raw.startup.retries.unwrap_or(DEFAULT_STARTUP_RETRIES),
            },
            notification_mode,
            telegram: TelegramSettings {
                bot_token: non_empty(telegram.bot_token).map(Zeroizing::new),
                chat_id: non_empty(telegram.chat_id),
            },
            discord: DiscordSettings {
                webhook_url: non_empty(discord.webhook_url).map(Zeroizing::new),
            },
            domains,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    ///
    /// Every problem is collected so a single run reports all of them.
    fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.domains.is_empty() {
            errors.push("no [[domains]] configured".to_string());
        }

        for (index, domain) in self.domains.iter().enumerate() {
            let label = if domain.name.is_empty() {
                format!("domain #{}", index + 1)
            } else {
                format!("domain \"{}\"", domain.name)
            };

            if domain.name.is_empty() {
                errors.push(format!("{}: missing name", label));
            } else if let Err(e) = validate_domain_name(&domain.name) {
                errors.push(format!("{}: {}", label, e));
            }
            if domain.zone_id.is_empty() {
                errors.push(format!("{}: missing zone_id", label));
            } else if !domain.zone_id.chars().all(|c| c.is_ascii_alphanumeric()) {
                errors.push(format!("{}: zone_id must be alphanumeric", label));
            }
            if domain.api_token.trim().is_empty() {
                errors.push(format!(
                    "{}: missing api_token (set it per domain, in [defaults] or via {})",
                    label, ENV_API_TOKEN
                ));
            }
            if domain.ttl == 0 {
                errors.push(format!("{}: ttl must be at least 1", label));
            }
        }

        let timeout_secs = self.timeout.as_secs();
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout_secs) {
            errors.push(format!(
                "timeout must be between {} and {} seconds, got {}",
                MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS, timeout_secs
            ));
        }

        let interval_secs = self.check_interval.as_secs();
        if !(MIN_CHECK_INTERVAL_SECS..=MAX_CHECK_INTERVAL_SECS).contains(&interval_secs) {
            errors.push(format!(
                "check_interval must be between {} and {} seconds, got {}",
                MIN_CHECK_INTERVAL_SECS, MAX_CHECK_INTERVAL_SECS, interval_secs
            ));
        }

        if errors.is_empty() {
            return Ok(());
        }
        Err(anyhow!(
            "Invalid configuration:\n  - {}",
            errors.join("\n  - ")
        ))
    }

    /// Logs the effective configuration, with secrets masked
    ///
    /// Also warns when the notification mode selects a backend that has no
    /// credentials; such a backend is skipped rather than treated as failing.
    pub fn log_summary(&self) {
        info!("Notification mode: {}", self.notification_mode);
        if self.notification_mode.includes_telegram() && !self.telegram.is_complete() {
            warn!("Telegram is not configured (bot_token/chat_id); Telegram notifications are disabled");
        }
        if self.notification_mode.includes_discord() && self.discord.webhook_url.is_none() {
            warn!("Discord webhook is not configured; Discord notifications are disabled");
        }

        info!(
            "Startup delay: {}s, startup retries: {}, check interval: {}s",
            self.startup.delay.as_secs(),
            self.startup.retries,
            self.check_interval.as_secs()
        );
        info!("Managing {} domain(s)", self.domains.len());
        for d in &self.domains {
            info!(
                "  - {} (zone: {}, token: {}, TTL: {}s, proxied: {})",
                d.name,
                mask_secret(&d.zone_id),
                mask_secret(&d.api_token),
                d.ttl,
                d.proxied
            );
        }
    }
}

/// Shortens a secret to a recognisable prefix for logs
///
/// ```
/// use cfddns::config::mask_secret;
///
/// assert_eq!(mask_secret("abcdefghijklmnop"), "abcd***");
/// assert_eq!(mask_secret("short"), "***");
/// ```
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 8 {
        return "***".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}***", prefix)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_file(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}

/// Overrides file values with non-empty environment variables
fn override_with_env(raw: &mut TomlConfig) {
    if let Some(v) = env_non_empty(ENV_API_TOKEN) {
        raw.defaults.api_token = Some(v);
    }
    if let Some(v) = env_non_empty(ENV_TELEGRAM_BOT_TOKEN) {
        raw.telegram.get_or_insert_with(Default::default).bot_token = Some(v);
    }
    if let Some(v) = env_non_empty(ENV_TELEGRAM_CHAT_ID) {
        raw.telegram.get_or_insert_with(Default::default).chat_id = Some(v);
    }
    if let Some(v) = env_non_empty(ENV_DISCORD_WEBHOOK_URL) {
        raw.discord.get_or_insert_with(Default::default).webhook_url = Some(v);
    }
    if let Some(v) = env_non_empty(ENV_NOTIFICATION_MODE) {
        raw.notification.mode = Some(v);
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

//==============================================================================
// File format
//==============================================================================

/// TOML configuration file structure
#[derive(Default, Deserialize)]
struct TomlConfig {
    check_interval: Option<u64>,
    timeout: Option<u64>,
    health_port: Option<u16>,
    #[serde(default)]
    startup: TomlStartup,
    #[serde(default)]
    notification: TomlNotification,
    telegram: Option<TomlTelegram>,
    discord: Option<TomlDiscord>,
    #[serde(default)]
    defaults: TomlDefaults,
    #[serde(default)]
    domains: Vec<TomlDomain>,
}

#[derive(Default, Deserialize)]
struct TomlStartup {
    delay: Option<u64>,
    retries: Option<u32>,
}

#[derive(Default, Deserialize)]
struct TomlNotification {
    mode: Option<String>,
}

#[derive(Default, Deserialize)]
struct TomlTelegram {
    bot_token: Option<String>,
    chat_id: Option<String>,
}

#[derive(Default, Deserialize)]
struct TomlDiscord {
    webhook_url: Option<String>,
}

#[derive(Default, Deserialize)]
struct TomlDefaults {
    api_token: Option<String>,
    ttl: Option<u32>,
    proxied: Option<bool>,
}

#[derive(Deserialize)]
struct TomlDomain {
    name: Option<String>,
    zone_id: Option<String>,
    api_token: Option<String>,
    ttl: Option<u32>,
    proxied: Option<bool>,
}

//==============================================================================
// Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct EnvGuard {
        saved: Vec<(&'static str, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            let keys = [
                ENV_API_TOKEN,
                ENV_TELEGRAM_BOT_TOKEN,
                ENV_TELEGRAM_CHAT_ID,
                ENV_DISCORD_WEBHOOK_URL,
                ENV_NOTIFICATION_MODE,
            ];
            let mut saved = Vec::with_capacity(keys.len());
            for key in keys {
                saved.push((key, std::env::var(key).ok()));
                std::env::remove_var(key);
            }
            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                if let Some(val) = value {
                    std::env::set_var(key, val);
                } else {
                    std::env::remove_var(key);
                }
            }
        }
    }

    fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).expect("write config");
        (dir, path)
    }

    const MINIMAL: &str = r#"
[defaults]
api_token = "default_token_0123456789"

[[domains]]
name = "home.example.com"
zone_id = "0123456789abcdef0123456789abcdef"
"#;

    #[test]
    #[serial]
    fn config_defaults_applied() {
        let _env = EnvGuard::new();
        let (_dir, path) = write_config(MINIMAL);

        let cfg = Config::load(&path).expect("config load");
        assert_eq!(cfg.check_interval, Duration::from_secs(60));
        assert_eq!(cfg.timeout, Duration::from_secs(10));
        assert_eq!(cfg.health_port, 0);
        assert_eq!(cfg.startup.delay, Duration::from_secs(60));
        assert_eq!(cfg.startup.retries, 5);
        assert_eq!(cfg.notification_mode, NotificationMode::Telegram);
        assert!(!cfg.telegram.is_complete());
        assert!(cfg.discord.webhook_url.is_none());

        assert_eq!(cfg.domains.len(), 1);
        let d = &cfg.domains[0];
        assert_eq!(d.name, "home.example.com");
        assert_eq!(d.api_token.as_str(), "default_token_0123456789");
        assert_eq!(d.ttl, 60);
        assert!(!d.proxied);
    }

    #[test]
    #[serial]
    fn config_full_file() {
        let _env = EnvGuard::new();
        let (_dir, path) = write_config(
            r#"
check_interval = 120
timeout = 5
health_port = 9100

[startup]
delay = 0
retries = 2

[notification]
mode = "both"

[telegram]
bot_token = "123456:telegram-token"
chat_id = "-100200300"

[discord]
webhook_url = "https://discord.example/webhook"

[defaults]
api_token = "default_token_0123456789"
ttl = 300
proxied = true

[[domains]]
name = "a.example.com"
zone_id = "zoneA"

[[domains]]
name = "b.example.com"
zone_id = "zoneB"
api_token = "override_token_987654321"
ttl = 1
proxied = false
"#,
        );

        let cfg = Config::load(&path).expect("config load");
        assert_eq!(cfg.check_interval, Duration::from_secs(120));
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert_eq!(cfg.health_port, 9100);
        assert_eq!(cfg.startup.delay, Duration::ZERO);
        assert_eq!(cfg.startup.retries, 2);
        assert_eq!(cfg.notification_mode, NotificationMode::Both);
        assert!(cfg.telegram.is_complete());
        assert_eq!(cfg.telegram.chat_id.as_deref(), Some("-100200300"));
        assert!(cfg.discord.webhook_url.is_some());

        let names: Vec<&str> = cfg.domains.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["a.example.com", "b.example.com"]);

        let a = &cfg.domains[0];
        assert_eq!(a.api_token.as_str(), "default_token_0123456789");
        assert_eq!(a.ttl, 300);
        assert!(a.proxied);

        let b = &cfg.domains[1];
        assert_eq!(b.api_token.as_str(), "override_token_987654321");
        assert_eq!(b.ttl, 1);
        assert!(!b.proxied);
    }

    #[test]
    #[serial]
    fn config_env_overrides_file() {
        let _env = EnvGuard::new();
        let (_dir, path) = write_config(
            r#"
[notification]
mode = "telegram"

[telegram]
bot_token = "file-bot-token"
chat_id = "1"

[defaults]
api_token = "file_token_0123456789"

[[domains]]
name = "home.example.com"
zone_id = "zone1"
"#,
        );

        std::env::set_var(ENV_API_TOKEN, "env_token_0123456789");
        std::env::set_var(ENV_TELEGRAM_CHAT_ID, "42");
        std::env::set_var(ENV_DISCORD_WEBHOOK_URL, "https://discord.example/env");
        std::env::set_var(ENV_NOTIFICATION_MODE, "Discord");

        let cfg = Config::load(&path).expect("config load");
        assert_eq!(cfg.domains[0].api_token.as_str(), "env_token_0123456789");
        assert_eq!(cfg.telegram.bot_token.as_deref().map(|t| t.as_str()), Some("file-bot-token"));
        assert_eq!(cfg.telegram.chat_id.as_deref(), Some("42"));
        assert_eq!(
            cfg.discord.webhook_url.as_deref().map(|u| u.as_str()),
            Some("https://discord.example/env")
        );
        assert_eq!(cfg.notification_mode, NotificationMode::Discord);
    }

    #[test]
    #[serial]
    fn config_empty_env_values_do_not_override() {
        let _env = EnvGuard::new();
        let (_dir, path) = write_config(MINIMAL);

        std::env::set_var(ENV_API_TOKEN, "");
        std::env::set_var(ENV_NOTIFICATION_MODE, "");

        let cfg = Config::load(&path).expect("config load");
        assert_eq!(cfg.domains[0].api_token.as_str(), "default_token_0123456789");
        assert_eq!(cfg.notification_mode, NotificationMode::Telegram);
    }

    #[test]
    #[serial]
    fn config_missing_token_is_reported_per_domain() {
        let _env = EnvGuard::new();
        let (_dir, path) = write_config(
            r#"
[[domains]]
name = "a.example.com"
zone_id = "zoneA"

[[domains]]
name = "b.example.com"
zone_id = "zoneB"
api_token = "   "
"#,
        );

        let err = Config::load(&path).expect_err("missing token");
        let msg = format!("{err}");
        assert!(msg.contains("domain \"a.example.com\": missing api_token"));
        assert!(msg.contains("domain \"b.example.com\": missing api_token"));
    }

    #[test]
    #[serial]
    fn config_missing_name_and_zone() {
        let _env = EnvGuard::new();
        let (_dir, path) = write_config(
            r#"
[defaults]
api_token = "default_token_0123456789"

[[domains]]
zone_id = "zoneA"

[[domains]]
name = "b.example.com"
"#,
        );

        let err = Config::load(&path).expect_err("missing fields");
        let msg = format!("{err}");
        assert!(msg.contains("domain #1: missing name"));
        assert!(msg.contains("domain \"b.example.com\": missing zone_id"));
    }

    #[test]
    #[serial]
    fn config_no_domains() {
        let _env = EnvGuard::new();
        let (_dir, path) = write_config("check_interval = 60\n");

        let err = Config::load(&path).expect_err("no domains");
        assert!(format!("{err}").contains("no [[domains]] configured"));
    }

    #[test]
    #[serial]
    fn config_invalid_domain_name_and_zone() {
        let _env = EnvGuard::new();
        let (_dir, path) = write_config(
            r#"
[defaults]
api_token = "default_token_0123456789"

[[domains]]
name = "bad..example.com"
zone_id = "zone-with-dash!"
ttl = 0
"#,
        );

        let err = Config::load(&path).expect_err("invalid domain");
        let msg = format!("{err}");
        assert!(msg.contains("empty label"));
        assert!(msg.contains("alphanumeric"));
        assert!(msg.contains("ttl must be at least 1"));
    }

    #[test]
    #[serial]
    fn config_interval_and_timeout_bounds() {
        let _env = EnvGuard::new();
        let (_dir, path) = write_config(&format!("check_interval = 10\ntimeout = 300\n{MINIMAL}"));
        let cfg = Config::load(&path).expect("config load");
        assert_eq!(cfg.check_interval, Duration::from_secs(10));
        assert_eq!(cfg.timeout, Duration::from_secs(300));

        let (_dir, path) = write_config(&format!("check_interval = 9\n{MINIMAL}"));
        let err = Config::load(&path).expect_err("interval too low");
        assert!(format!("{err}").contains("check_interval"));

        let (_dir, path) = write_config(&format!("check_interval = 3601\n{MINIMAL}"));
        let err = Config::load(&path).expect_err("interval too high");
        assert!(format!("{err}").contains("check_interval"));

        let (_dir, path) = write_config(&format!("timeout = 0\n{MINIMAL}"));
        let err = Config::load(&path).expect_err("timeout too low");
        assert!(format!("{err}").contains("timeout"));
    }

    #[test]
    #[serial]
    fn config_invalid_notification_mode() {
        let _env = EnvGuard::new();
        let (_dir, path) = write_config(&format!("[notification]\nmode = \"slack\"\n{MINIMAL}"));

        let err = Config::load(&path).expect_err("bad mode");
        assert!(format!("{err}").contains("slack"));
    }

    #[test]
    #[serial]
    fn config_missing_file() {
        let _env = EnvGuard::new();
        let err = Config::load(Path::new("/nonexistent/cfddns/config.toml")).expect_err("no file");
        assert!(format!("{err}").contains("Failed to read config"));
    }

    #[test]
    #[serial]
    fn config_malformed_toml() {
        let _env = EnvGuard::new();
        let (_dir, path) = write_config("this is = = not toml");
        let err = Config::load(&path).expect_err("bad toml");
        assert!(format!("{err}").contains("Failed to parse config"));
    }

    #[test]
    fn debug_output_masks_tokens() {
        let target = DomainTarget {
            name: "home.example.com".to_string(),
            zone_id: "zone".to_string(),
            api_token: Zeroizing::new("supersecrettoken123".to_string()),
            ttl: 60,
            proxied: false,
        };
        let debug = format!("{:?}", target);
        assert!(!debug.contains("supersecrettoken123"));
        assert!(debug.contains("supe***"));
    }

    #[test]
    fn mask_secret_short_and_long() {
        assert_eq!(mask_secret(""), "***");
        assert_eq!(mask_secret("12345678"), "***");
        assert_eq!(mask_secret("123456789"), "1234***");
    }

    #[tokio::test(start_paused = true)]
    #[serial]
    async fn load_with_retry_gives_up_after_all_attempts() {
        let _env = EnvGuard::new();
        let start = tokio::time::Instant::now();
        let err = Config::load_with_retry(Path::new("/nonexistent/cfddns/config.toml"))
            .await
            .expect_err("missing file");

        assert!(format!("{err}").contains("Failed to read config"));
        // nine 5s pauses between ten attempts
        assert_eq!(start.elapsed(), Duration::from_secs(45));
    }

    #[tokio::test]
    #[serial]
    async fn load_with_retry_reads_valid_file() {
        let _env = EnvGuard::new();
        let (_dir, path) = write_config(MINIMAL);
        let cfg = Config::load_with_retry(&path).await.expect("config load");
        assert_eq!(cfg.domains.len(), 1);
    }
}
