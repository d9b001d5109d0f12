//! Cloudflare API client for DNS operations
//!
//! Uses reqwest with rustls for HTTP requests. Every call is retried with
//! [`RetryPolicy::dns`] before an error is handed back to the caller.

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use urlencoding::encode;

use crate::config::DomainTarget;
use crate::constants::{CLOUDFLARE_API_BASE, USER_AGENT};
use crate::dns_provider::{DnsProvider, DnsRecordSnapshot, RecordType};
use crate::retry::{retry, RetryPolicy};

//==============================================================================
// Types
//==============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
    #[serde(default)]
    messages: Vec<serde_json::Value>,
    result: Option<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiError {
    code: u64,
    message: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

#[derive(Serialize)]
struct UpdatePayload<'a> {
    #[serde(rename = "type")]
    rt: &'static str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    proxied: bool,
}

//==============================================================================
// Client
//==============================================================================

pub struct CloudflareClient {
    client: reqwest::Client,
    api_base: String,
    policy: RetryPolicy,
}

impl CloudflareClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("build reqwest client")?;

        Ok(Self {
            client,
            api_base: CLOUDFLARE_API_BASE.to_string(),
            policy: RetryPolicy::dns(),
        })
    }

    /// Points the client at another API root (used by tests)
    pub fn with_base_url(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn get_records_once(
        &self,
        target: &DomainTarget,
        record_type: RecordType,
    ) -> Result<Vec<DnsRecordSnapshot>> {
        let url = format!(
            "{}/zones/{}/dns_records?type={}&name={}",
            self.api_base,
            target.zone_id,
            record_type,
            encode(&target.name)
        );

        debug!("GET {}", url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(target.api_token.as_str())
            .send()
            .await
            .context("GET request failed")?;

        let records: Option<Vec<DnsRecordSnapshot>> = parse_response(resp, "Lookup").await?;
        Ok(records.unwrap_or_default())
    }

    async fn update_record_once(
        &self,
        target: &DomainTarget,
        record: &DnsRecordSnapshot,
        new_ip: &str,
    ) -> Result<()> {
        let url = format!(
            "{}/zones/{}/dns_records/{}",
            self.api_base, target.zone_id, record.id
        );
        let payload = UpdatePayload {
            rt: record.record_type.as_str(),
            name: &target.name,
            content: new_ip,
            ttl: target.ttl,
            proxied: target.proxied,
        };

        debug!("PATCH {}", url);
        let resp = self
            .client
            .patch(&url)
            .bearer_auth(target.api_token.as_str())
            .json(&payload)
            .send()
            .await
            .context("PATCH request failed")?;

        let _: Option<serde_json::Value> = parse_response(resp, "Update").await?;
        Ok(())
    }
}

/// Checks both the HTTP status and the payload `success` flag
async fn parse_response<T: DeserializeOwned>(
    resp: reqwest::Response,
    action: &str,
) -> Result<Option<T>> {
    let status = resp.status();
    let body: ApiResponse<T> = match resp.json().await {
        Ok(body) => body,
        Err(_) if !status.is_success() => {
            bail!("{} failed with HTTP {}", action, status.as_u16())
        }
        Err(e) => return Err(e).context("Failed to parse response"),
    };

    if !status.is_success() || !body.success {
        if status == StatusCode::TOO_MANY_REQUESTS {
            bail!("Rate limited by Cloudflare");
        }
        if status.is_server_error() {
            bail!("Cloudflare server error: {}", status.as_u16());
        }
        if body.errors.is_empty() {
            bail!("{} failed (HTTP {})", action, status.as_u16());
        }
        bail!(
            "{} failed: {}",
            action,
            body.errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    Ok(body.result)
}

#[async_trait]
impl DnsProvider for CloudflareClient {
    async fn fetch_record(
        &self,
        target: &DomainTarget,
        record_type: RecordType,
    ) -> Result<Option<DnsRecordSnapshot>> {
        let label = format!("Fetching {} record for {}", record_type, target.name);
        let records = retry(&self.policy, &label, || {
            self.get_records_once(target, record_type)
        })
        .await?;

        Ok(records.into_iter().next())
    }

    async fn update_record(
        &self,
        target: &DomainTarget,
        record: &DnsRecordSnapshot,
        new_ip: &str,
    ) -> Result<()> {
        let label = format!("Updating {} record for {}", record.record_type, target.name);
        retry(&self.policy, &label, || {
            self.update_record_once(target, record, new_ip)
        })
        .await
    }
}

//==============================================================================
// Tests
//==============================================================================
