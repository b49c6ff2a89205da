//! Liveness endpoint for hosting platforms.
//!
//! `GET /` answers a bare `OK`; `GET /health` reports connection state, uptime
//! and the active run as JSON.

use std::{net::SocketAddr, sync::Arc};

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use rfw_core::{
    status::ServiceStatus,
    tracker::{RunSnapshot, RunTracker},
};

#[derive(Clone)]
pub struct HealthState {
    pub status: Arc<ServiceStatus>,
    pub tracker: Arc<RunTracker>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub connected: bool,
    pub uptime_secs: u64,
    pub started_at: String,
    pub active_run: Option<RunSnapshot>,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state)
}

async fn root() -> &'static str {
    "OK"
}

async fn health(State(state): State<HealthState>) -> Json<HealthReport> {
    Json(HealthReport {
        status: "ok",
        connected: state.status.is_connected(),
        uptime_secs: state.status.uptime().as_secs(),
        started_at: state.status.started_at().to_rfc3339(),
        active_run: state.tracker.snapshot(),
    })
}

/// A bound, not yet serving, health listener.
pub struct HealthServer {
    listener: TcpListener,
}

impl HealthServer {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind health endpoint to {addr}: {e}"))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` fires.
    pub fn spawn(self, state: HealthState, shutdown: CancellationToken) -> JoinHandle<()> {
        let addr = self.listener.local_addr().ok();
        tracing::info!(addr = ?addr, "health endpoint listening");

        tokio::spawn(async move {
            if let Err(e) = axum::serve(self.listener, router(state))
                .with_graceful_shutdown(async move {
                    shutdown.cancelled().await;
                    tracing::info!("health endpoint shutting down");
                })
                .await
            {
                tracing::error!(error = %e, "health endpoint failed");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfw_core::{
        domain::{ConversationId, MessageId},
        sequencer::BatchRun,
        tracker::RunKind,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn state() -> HealthState {
        HealthState {
            status: Arc::new(ServiceStatus::new()),
            tracker: Arc::new(RunTracker::new()),
        }
    }

    async fn get_raw(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
        stream.write_all(req.as_bytes()).await.unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn idle_report_has_no_active_run() {
        let state = state();
        let Json(report) = health(State(state)).await;
        assert_eq!(report.status, "ok");
        assert!(!report.connected);
        assert!(report.active_run.is_none());
    }

    #[tokio::test]
    async fn report_includes_running_batch() {
        let state = state();
        state.status.set_connected(true);
        let _ticket = state
            .tracker
            .try_begin(
                RunKind::Batch,
                BatchRun::new(ConversationId::Numeric(-1001), MessageId(1), MessageId(10)),
            )
            .unwrap();

        let Json(report) = health(State(state.clone())).await;
        assert!(report.connected);
        let run = report.active_run.unwrap();
        assert_eq!(run.kind, RunKind::Batch);
        assert_eq!(run.run.total(), 10);

        let json = serde_json::to_value(health(State(state)).await.0).unwrap();
        assert_eq!(json["active_run"]["kind"], "batch");
        assert_eq!(json["active_run"]["run"]["conversation"], -1001);
    }

    #[tokio::test]
    async fn serves_until_shutdown() {
        let server = HealthServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let token = CancellationToken::new();
        let handle = server.spawn(state(), token.clone());

        let root = get_raw(addr, "/").await;
        assert!(root.starts_with("HTTP/1.1 200"));
        assert!(root.ends_with("OK"));

        let health = get_raw(addr, "/health").await;
        assert!(health.contains("\"status\":\"ok\""));
        assert!(health.contains("\"active_run\":null"));

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn bind_on_occupied_port_fails() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();
        let err = HealthServer::bind(addr).await.err().unwrap();
        assert!(err.to_string().contains("failed to bind"));
    }
}
