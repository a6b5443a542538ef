//! HTTP server for health, status and metrics endpoints
//!
//! - GET /health  - health summary (JSON)
//! - GET /healthz - liveness probe
//! - GET /readyz  - readiness probe, ready after the first completed cycle
//! - GET /metrics - Prometheus metrics
//! - GET /status  - relay counters and scan position (JSON)

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use eyre::eyre;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::contracts::BridgeState;
use crate::metrics;

/// Relayer statistics shared between the relay loop and the HTTP server
#[derive(Debug, Clone, Serialize)]
pub struct RelayerStats {
    pub relayer_address: String,
    pub xrpl_address: String,
    pub bridge_address: String,
    pub started_at: DateTime<Utc>,
    pub cycles: u64,
    /// Lowest XRPL ledger index not scanned yet
    pub scan_watermark: i64,
    pub transactions_scanned: u64,
    pub evidence_reported: u64,
    pub evidence_failed: u64,
    pub operations_seen: u64,
    pub operations_failed: u64,
    /// Last bridge state read from the contract
    pub bridge_state: Option<BridgeState>,
    pub available_tickets: Option<usize>,
    pub last_successful_cycle: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl RelayerStats {
    pub fn new(relayer_address: &str, xrpl_address: &str, bridge_address: &str) -> Self {
        Self {
            relayer_address: relayer_address.to_string(),
            xrpl_address: xrpl_address.to_string(),
            bridge_address: bridge_address.to_string(),
            started_at: Utc::now(),
            cycles: 0,
            scan_watermark: -1,
            transactions_scanned: 0,
            evidence_reported: 0,
            evidence_failed: 0,
            operations_seen: 0,
            operations_failed: 0,
            bridge_state: None,
            available_tickets: None,
            last_successful_cycle: None,
            last_error: None,
        }
    }
}

pub type SharedStats = Arc<RwLock<RelayerStats>>;

#[derive(Clone)]
pub struct AppState {
    pub stats: SharedStats,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub relayer_address: String,
    pub xrpl_address: String,
    pub cycles: u64,
    pub bridge_state: Option<BridgeState>,
    pub last_successful_cycle: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_seconds: i64,
    #[serde(flatten)]
    pub stats: RelayerStats,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.stats.read().await;
    Json(HealthResponse {
        status: "healthy",
        relayer_address: stats.relayer_address.clone(),
        xrpl_address: stats.xrpl_address.clone(),
        cycles: stats.cycles,
        bridge_state: stats.bridge_state,
        last_successful_cycle: stats.last_successful_cycle,
    })
}

async fn liveness() -> &'static str {
    "OK"
}

async fn readiness(State(state): State<AppState>) -> Response {
    let stats = state.stats.read().await;
    if stats.cycles > 0 {
        "OK".into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT_READY").into_response()
    }
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let stats = state.stats.read().await.clone();
    Json(StatusResponse {
        uptime_seconds: (Utc::now() - stats.started_at).num_seconds(),
        stats,
    })
}

async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

pub fn router(stats: SharedStats) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/healthz", get(liveness))
        .route("/readyz", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .route("/status", get(status))
        .with_state(AppState { stats })
}

/// Serve the API until the listener fails
pub async fn start_server(bind_address: &str, port: u16, stats: SharedStats) -> eyre::Result<()> {
    let addr: SocketAddr = format!("{}:{}", bind_address, port)
        .parse()
        .map_err(|e| eyre!("Invalid bind address {}:{}: {}", bind_address, port, e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    metrics::UP.set(1.0);

    axum::serve(listener, router(stats)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shared() -> SharedStats {
        Arc::new(RwLock::new(RelayerStats::new(
            "orai1relayer",
            "rRelayer",
            "rBridge",
        )))
    }

    #[tokio::test]
    async fn test_readiness_follows_cycles() {
        let stats = shared();
        let state = AppState {
            stats: stats.clone(),
        };

        let response = readiness(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        stats.write().await.cycles = 1;
        let response = readiness(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_flattens_stats() {
        let stats = shared();
        stats.write().await.scan_watermark = 42;

        let Json(status) = status(State(AppState { stats })).await;
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["scan_watermark"], 42);
        assert_eq!(json["bridge_address"], "rBridge");
        assert!(json["uptime_seconds"].as_i64().unwrap() >= 0);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_encodes_registry() {
        metrics::record_xrpl_submission("success");
        let response = prometheus_metrics().await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
