//! Public IP discovery over HTTP
//!
//! Endpoints are tried in order; the first one that answers with a
//! syntactically valid address wins. A failing endpoint is never retried,
//! the next one is tried instead.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::constants::{IP_ENDPOINT_AMAZON, IP_ENDPOINT_ICANHAZIP, IP_ENDPOINT_IPIFY, USER_AGENT};
use crate::metrics;
use crate::validation::is_valid_ip;

//==============================================================================
// Types
//==============================================================================

/// How an endpoint encodes the address in its body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// `{"ip": "..."}`
    Json,
    /// The bare address, possibly surrounded by whitespace
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpEndpoint {
    pub url: String,
    pub format: ResponseFormat,
}

impl IpEndpoint {
    pub fn new(url: impl Into<String>, format: ResponseFormat) -> Self {
        Self {
            url: url.into(),
            format,
        }
    }
}

/// ipify (JSON), then Amazon and icanhazip (plain text)
pub fn default_endpoints() -> Vec<IpEndpoint> {
    vec![
        IpEndpoint::new(IP_ENDPOINT_IPIFY, ResponseFormat::Json),
        IpEndpoint::new(IP_ENDPOINT_AMAZON, ResponseFormat::Text),
        IpEndpoint::new(IP_ENDPOINT_ICANHAZIP, ResponseFormat::Text),
    ]
}

#[derive(Deserialize)]
struct JsonIp {
    ip: String,
}

/// Anything that can tell the daemon its current public address
#[async_trait]
pub trait PublicIpSource: Send + Sync {
    /// Returns the public address, or `None` when no source answered
    async fn resolve(&self) -> Option<String>;
}

//==============================================================================
// Resolver
//==============================================================================

pub struct IpResolver {
    client: reqwest::Client,
    endpoints: Vec<IpEndpoint>,
    timeout: Duration,
}

impl IpResolver {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("build reqwest client")?;

        Ok(Self {
            client,
            endpoints: default_endpoints(),
            timeout,
        })
    }

    pub fn with_endpoints(mut self, endpoints: Vec<IpEndpoint>) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn query(&self, endpoint: &IpEndpoint) -> Result<String> {
        debug!("GET {}", endpoint.url);
        let resp = self
            .client
            .get(&endpoint.url)
            .send()
            .await
            .context("GET request failed")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("HTTP error: {}", status.as_u16());
        }

        let ip = match endpoint.format {
            ResponseFormat::Json => {
                let body: JsonIp = resp.json().await.context("Failed to parse response")?;
                body.ip.trim().to_string()
            }
            ResponseFormat::Text => resp
                .text()
                .await
                .context("Failed to read response")?
                .trim()
                .to_string(),
        };

        if !is_valid_ip(&ip) {
            bail!("Invalid IP address: {:?}", ip);
        }
        Ok(ip)
    }
}

#[async_trait]
impl PublicIpSource for IpResolver {
    async fn resolve(&self) -> Option<String> {
        for endpoint in &self.endpoints {
            let outcome = match tokio::time::timeout(self.timeout, self.query(endpoint)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("timed out after {:?}", self.timeout)),
            };

            match outcome {
                Ok(ip) => {
                    debug!("Public IP {} from {}", ip, endpoint.url);
                    return Some(ip);
                }
                Err(e) => {
                    metrics::record_ip_lookup_failure();
                    warn!("IP lookup via {} failed: {:#}", endpoint.url, e);
                }
            }
        }

        warn!("Could not determine public IP from any endpoint");
        None
    }
}

//==============================================================================
// Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn resolver(server: &MockServer, routes: &[(&str, ResponseFormat)]) -> IpResolver {
        let endpoints = routes
            .iter()
            .map(|(route, format)| IpEndpoint::new(format!("{}{}", server.uri(), route), *format))
            .collect();
        IpResolver::new(Duration::from_millis(250))
            .unwrap()
            .with_endpoints(endpoints)
    }

    #[test]
    fn test_default_endpoints_order() {
        let endpoints = default_endpoints();
        assert_eq!(endpoints.len(), 3);
        assert_eq!(endpoints[0].format, ResponseFormat::Json);
        assert!(endpoints[0].url.contains("ipify"));
        assert_eq!(endpoints[1].format, ResponseFormat::Text);
        assert_eq!(endpoints[2].format, ResponseFormat::Text);
    }

    #[tokio::test]
    async fn test_first_endpoint_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ip": "203.0.113.7"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("198.51.100.1\n"))
            .expect(0)
            .mount(&server)
            .await;

        let ip = resolver(&server, &[("/json", ResponseFormat::Json), ("/text", ResponseFormat::Text)])
            .resolve()
            .await;
        assert_eq!(ip.as_deref(), Some("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_falls_through_timeout_and_malformed_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"ip": "192.0.2.1"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ip\": "))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/text"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  198.51.100.23\n"))
            .expect(1)
            .mount(&server)
            .await;

        let ip = resolver(
            &server,
            &[
                ("/slow", ResponseFormat::Json),
                ("/broken", ResponseFormat::Json),
                ("/text", ResponseFormat::Text),
            ],
        )
        .resolve()
        .await;
        assert_eq!(ip.as_deref(), Some("198.51.100.23"));

        let requests = server.received_requests().await.unwrap();
        let paths: Vec<&str> = requests.iter().map(|r| r.url.path()).collect();
        assert_eq!(paths, ["/slow", "/broken", "/text"]);
    }

    #[tokio::test]
    async fn test_invalid_text_and_http_errors_yield_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>blocked</html>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/compressed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("2001:db8::1"))
            .mount(&server)
            .await;

        let ip = resolver(
            &server,
            &[
                ("/html", ResponseFormat::Text),
                ("/down", ResponseFormat::Text),
                ("/compressed", ResponseFormat::Text),
            ],
        )
        .resolve()
        .await;
        assert!(ip.is_none());
    }

    #[tokio::test]
    async fn test_full_ipv6_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v6"))
            .respond_with(ResponseTemplate::new(200).set_body_string("2001:db8:0:0:0:0:0:1"))
            .mount(&server)
            .await;

        let ip = resolver(&server, &[("/v6", ResponseFormat::Text)]).resolve().await;
        assert_eq!(ip.as_deref(), Some("2001:db8:0:0:0:0:0:1"));
    }
}
