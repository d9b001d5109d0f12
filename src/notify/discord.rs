//! Discord webhook backend

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{redact_secrets, ChatBackend};
use crate::config::DiscordSettings;
use crate::constants::{NOTIFY_ERROR_BODY_LIMIT, NOTIFY_HTTP_TIMEOUT, USER_AGENT};
use crate::retry::{retry, RetryPolicy};

#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Rewrites Telegram `*bold*` spans into Discord `**bold**`
///
/// A `*` without a closing partner, or `**` with nothing between, is kept
/// as is.
///
/// ```
/// use cfddns::notify::discord::to_discord_markdown;
///
/// assert_eq!(to_discord_markdown("*Domain*: a.example.com"), "**Domain**: a.example.com");
/// ```
pub fn to_discord_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut rest = text;
    while let Some(start) = rest.find('*') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('*') {
            Some(end) if end > 0 => {
                out.push_str("**");
                out.push_str(&after[..end]);
                out.push_str("**");
                rest = &after[end + 1..];
            }
            _ => {
                out.push('*');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

pub struct DiscordBackend {
    client: reqwest::Client,
    settings: DiscordSettings,
    policy: RetryPolicy,
}

impl DiscordBackend {
    pub fn new(settings: DiscordSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(NOTIFY_HTTP_TIMEOUT)
            .timeout(NOTIFY_HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("build reqwest client")?;

        Ok(Self {
            client,
            settings,
            policy: RetryPolicy::notification(),
        })
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn send_once(&self, webhook_url: &str, content: &str) -> Result<()> {
        debug!("POST discord webhook");
        let resp = self
            .client
            .post(webhook_url)
            .json(&WebhookMessage { content })
            .send()
            .await
            .map_err(|e| anyhow!(redact_secrets(&e.without_url().to_string(), &[webhook_url])))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(NOTIFY_ERROR_BODY_LIMIT).collect();
            bail!("HTTP {}: {}", status.as_u16(), snippet);
        }
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for DiscordBackend {
    fn name(&self) -> &'static str {
        "discord"
    }

    fn is_configured(&self) -> bool {
        self.settings.webhook_url.is_some()
    }

    async fn send(&self, markdown: &str) -> Result<()> {
        let Some(webhook_url) = &self.settings.webhook_url else {
            bail!("Discord webhook_url missing");
        };
        let content = to_discord_markdown(markdown);

        retry(&self.policy, "Sending Discord message", || {
            self.send_once(webhook_url, &content)
        })
        .await
    }
}
