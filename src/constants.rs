//! Common constants used throughout the cfddns application

use std::time::Duration;

//==============================================================================
// Cloudflare API Constants
//==============================================================================

/// Cloudflare API base URL
pub const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

/// User agent string for all outbound requests
pub const USER_AGENT: &str = "cfddns/1.0";

/// DNS record type for IPv4 addresses
pub const DNS_RECORD_TYPE_A: &str = "A";

/// DNS record type for IPv6 addresses
pub const DNS_RECORD_TYPE_AAAA: &str = "AAAA";

//==============================================================================
// Notification Constants
//==============================================================================

/// Telegram Bot API base URL
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Per-attempt timeout for chat backends
pub const NOTIFY_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Response body bytes kept in notification error messages
pub const NOTIFY_ERROR_BODY_LIMIT: usize = 200;

//==============================================================================
// Public IP Endpoints
//==============================================================================

/// JSON endpoint, body is `{"ip": "..."}`
pub const IP_ENDPOINT_IPIFY: &str = "https://api.ipify.org?format=json";

/// Plain text endpoint
pub const IP_ENDPOINT_AMAZON: &str = "https://checkip.amazonaws.com/";

/// Plain text endpoint
pub const IP_ENDPOINT_ICANHAZIP: &str = "https://icanhazip.com/";

//==============================================================================
// Timeout and Interval Constants
//==============================================================================

/// Default per-request network timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default reconciliation interval in seconds
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Minimum network timeout in seconds
pub const MIN_TIMEOUT_SECS: u64 = 1;

/// Maximum network timeout in seconds
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Minimum reconciliation interval in seconds
pub const MIN_CHECK_INTERVAL_SECS: u64 = 10;

/// Maximum reconciliation interval in seconds
pub const MAX_CHECK_INTERVAL_SECS: u64 = 3600;

/// Default TTL for records that do not set one
pub const DEFAULT_TTL: u32 = 60;

//==============================================================================
// Lifecycle Constants
//==============================================================================

/// Grace period before the first network probe
pub const DEFAULT_STARTUP_DELAY_SECS: u64 = 60;

/// Number of network readiness attempts during startup
pub const DEFAULT_STARTUP_RETRIES: u32 = 5;

/// How often readiness polls the IP endpoints within one attempt
pub const READINESS_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How long a single readiness attempt keeps polling
pub const READINESS_MAX_WAIT: Duration = Duration::from_secs(180);

/// Linear step between readiness attempts
pub const READINESS_RETRY_STEP: Duration = Duration::from_secs(5);

/// Cap on the delay between readiness attempts
pub const READINESS_RETRY_MAX: Duration = Duration::from_secs(30);

/// Health watchdog period
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// A check is stale after this many reconciliation intervals
pub const HEALTH_STALE_FACTOR: u32 = 3;

/// Daily report poll period
pub const DAILY_REPORT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Local hour at which the daily report is sent
pub const DAILY_REPORT_HOUR: u32 = 8;

/// Offset of the report clock from UTC (UTC+7)
pub const REPORT_UTC_OFFSET_SECS: i32 = 7 * 3600;

/// How long shutdown waits for an in-flight tick
pub const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Poll period while draining an in-flight tick
pub const SHUTDOWN_DRAIN_POLL: Duration = Duration::from_millis(100);

/// Consecutive failing ticks before an alert notification is sent
pub const FAILURE_STREAK_ALERT_THRESHOLD: u32 = 10;

/// Attempts made to read and parse the config file
pub const CONFIG_LOAD_ATTEMPTS: u32 = 10;

/// Delay between config load attempts
pub const CONFIG_LOAD_RETRY_DELAY: Duration = Duration::from_secs(5);

//==============================================================================
// Backoff Constants
//==============================================================================

/// DNS API calls: attempts, initial delay, cap
pub const DNS_RETRY_ATTEMPTS: u32 = 3;
pub const DNS_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(1000);
pub const DNS_RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

/// Notification sends: attempts, initial delay, cap, jitter
pub const NOTIFY_RETRY_ATTEMPTS: u32 = 5;
pub const NOTIFY_RETRY_INITIAL_DELAY: Duration = Duration::from_millis(500);
pub const NOTIFY_RETRY_MAX_DELAY: Duration = Duration::from_secs(15);
pub const NOTIFY_RETRY_JITTER: Duration = Duration::from_millis(300);

//==============================================================================
// Validation Constants
//==============================================================================

/// Maximum DNS record name length in characters
pub const MAX_RECORD_NAME_LENGTH: usize = 253;

/// Maximum DNS label length in characters
pub const MAX_LABEL_LENGTH: usize = 63;

//==============================================================================
// Environment Variable Names
//==============================================================================

/// Default Cloudflare API token applied to domains without their own
pub const ENV_API_TOKEN: &str = "CLOUDFLARE_API_TOKEN";

/// Telegram bot token
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";

/// Telegram chat id
pub const ENV_TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

/// Discord webhook URL
pub const ENV_DISCORD_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";

/// Notification mode (telegram|discord|both|none)
pub const ENV_NOTIFICATION_MODE: &str = "CFDDNS_NOTIFICATION_MODE";
