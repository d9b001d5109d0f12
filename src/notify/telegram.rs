//! Telegram Bot API backend

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{redact_secrets, ChatBackend};
use crate::config::TelegramSettings;
use crate::constants::{NOTIFY_ERROR_BODY_LIMIT, NOTIFY_HTTP_TIMEOUT, TELEGRAM_API_BASE, USER_AGENT};
use crate::retry::{retry, RetryPolicy};

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
}

#[derive(Deserialize)]
struct BotResponse {
    ok: bool,
    description: Option<String>,
}

pub struct TelegramBackend {
    client: reqwest::Client,
    api_base: String,
    settings: TelegramSettings,
    policy: RetryPolicy,
}

impl TelegramBackend {
    pub fn new(settings: TelegramSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(NOTIFY_HTTP_TIMEOUT)
            .timeout(NOTIFY_HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("build reqwest client")?;

        Ok(Self {
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            settings,
            policy: RetryPolicy::notification(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn send_once(&self, token: &str, chat_id: &str, markdown: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, token);
        debug!("POST {}/bot***/sendMessage", self.api_base);

        let resp = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id,
                text: markdown,
                parse_mode: "Markdown",
            })
            .send()
            .await
            .map_err(|e| anyhow!(redact_secrets(&e.without_url().to_string(), &[token])))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();

        if !status.is_success() {
            let snippet: String = body.chars().take(NOTIFY_ERROR_BODY_LIMIT).collect();
            bail!(
                "HTTP {}: {}",
                status.as_u16(),
                redact_secrets(&snippet, &[token])
            );
        }

        let parsed: BotResponse =
            serde_json::from_str(&body).context("Failed to parse Telegram response")?;
        if !parsed.ok {
            bail!(
                "Telegram API error: {}",
                redact_secrets(
                    parsed.description.as_deref().unwrap_or("unknown error"),
                    &[token]
                )
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for TelegramBackend {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn is_configured(&self) -> bool {
        self.settings.is_complete()
    }

    async fn send(&self, markdown: &str) -> Result<()> {
        let (Some(token), Some(chat_id)) = (&self.settings.bot_token, &self.settings.chat_id) else {
            bail!("Telegram bot_token or chat_id missing");
        };

        retry(&self.policy, "Sending Telegram message", || {
            self.send_once(token, chat_id, markdown)
        })
        .await
    }
}
