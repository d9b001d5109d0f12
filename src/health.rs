//! Health check endpoint for cfddns
//!
//! Serves `GET /health` (JSON status) and `GET /metrics` (Prometheus text)
//! while the daemon is running.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::metrics;
use crate::state::{ServiceStats, SharedStats};

//==============================================================================
// Types
//==============================================================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded"
    pub status: String,
    /// Whether the daemon is healthy
    pub healthy: bool,
    pub consecutive_failures: u32,
    pub successful_updates: u64,
    pub failed_updates: u64,
    /// Time since last clean tick (in seconds, or null if never succeeded)
    pub last_success_seconds_ago: Option<i64>,
    pub uptime_seconds: u64,
}

#[derive(Clone)]
struct HealthState {
    stats: SharedStats,
    stale_after: Duration,
}

/// Health check server
pub struct HealthServer {
    local_addr: SocketAddr,
    /// Shutdown channel sender
    shutdown_tx: Option<oneshot::Sender<()>>,
}

//==============================================================================
// Implementation
//==============================================================================

impl HealthServer {
    /// Starts the health check server
    ///
    /// # Arguments
    ///
    /// * `addr` - Address to bind
    /// * `stats` - Shared service counters
    /// * `stale_after` - Age of the last clean tick at which the service
    ///   reports itself degraded
    pub async fn start(addr: SocketAddr, stats: SharedStats, stale_after: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind health endpoint to {}", addr))?;
        let local_addr = listener.local_addr()?;
        info!("Health check server listening on {}", local_addr);

        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(HealthState { stats, stale_after });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("Health server error: {}", e);
            }
        });

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the health check server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            info!("Health check server stopped");
        }
    }
}

//==============================================================================
// Handlers
//==============================================================================

async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let snapshot = state.stats.lock().await.clone();
    let response = build_response(&snapshot, Utc::now(), state.stale_after);
    let status = if response.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

fn build_response(stats: &ServiceStats, now: DateTime<Utc>, stale_after: Duration) -> HealthResponse {
    let healthy = stats.is_healthy(now, stale_after);
    let last_success_seconds_ago = stats
        .last_successful_check
        .map(|ts| (now - ts).num_seconds().max(0));

    HealthResponse {
        status: if healthy { "ok".to_string() } else { "degraded".to_string() },
        healthy,
        consecutive_failures: stats.consecutive_failures,
        successful_updates: stats.successful_updates,
        failed_updates: stats.failed_updates,
        last_success_seconds_ago,
        uptime_seconds: stats.uptime(now).as_secs(),
    }
}

//==============================================================================
// Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "ok".to_string(),
            healthy: true,
            consecutive_failures: 0,
            successful_updates: 3,
            failed_updates: 1,
            last_success_seconds_ago: Some(0),
            uptime_seconds: 60,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"healthy\":true"));
        assert!(json.contains("\"successful_updates\":3"));
    }

    #[test]
    fn test_build_response_healthy() {
        let mut stats = ServiceStats::new(t0());
        stats.record_clean_tick(t0());
        let now = t0() + chrono::Duration::seconds(30);

        let response = build_response(&stats, now, Duration::from_secs(180));
        assert!(response.healthy);
        assert_eq!(response.status, "ok");
        assert_eq!(response.last_success_seconds_ago, Some(30));
        assert_eq!(response.uptime_seconds, 30);
    }

    #[test]
    fn test_build_response_degraded_on_streak() {
        let mut stats = ServiceStats::new(t0());
        stats.record_clean_tick(t0());
        stats.record_failed_tick();

        let response = build_response(&stats, t0(), Duration::from_secs(180));
        assert!(!response.healthy);
        assert_eq!(response.status, "degraded");
        assert_eq!(response.consecutive_failures, 1);
    }

    #[test]
    fn test_build_response_never_succeeded() {
        let stats = ServiceStats::new(t0());
        let response = build_response(&stats, t0() + chrono::Duration::seconds(10), Duration::from_secs(180));
        assert!(response.healthy);
        assert_eq!(response.last_success_seconds_ago, None);
    }

    #[tokio::test]
    async fn test_server_serves_health_and_metrics() {
        let stats = ServiceStats::shared(Utc::now());
        let mut server = HealthServer::start(
            "127.0.0.1:0".parse().unwrap(),
            stats.clone(),
            Duration::from_secs(180),
        )
        .await
        .unwrap();
        let base = format!("http://{}", server.local_addr());

        let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["healthy"], true);

        stats.lock().await.record_failed_tick();
        let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        let resp = reqwest::get(format!("{}/metrics", base)).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert!(resp.text().await.unwrap().contains("cfddns_failure_streak"));

        server.stop();
    }
}
