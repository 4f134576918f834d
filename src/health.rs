//! Liveness and readiness probes
//!
//! - `GET /healthz` - always `200 ok` while the process serves HTTP
//! - `GET /readyz` - `200 ok` once the Secret cache has synced, `503` before

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

/// Shared flag flipped once the watch cache completes its initial sync
#[derive(Debug, Clone, Default)]
pub struct ReadinessState {
    synced: Arc<AtomicBool>,
}

impl ReadinessState {
    /// Create a state that reports not ready
    pub fn new() -> Self {
        Self::default()
    }

    /// Report ready from now on
    pub fn mark_ready(&self) {
        self.synced.store(true, Ordering::SeqCst);
    }

    /// Whether the watch cache has synced
    pub fn is_ready(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

/// Build the probe router
pub fn health_routes(readiness: ReadinessState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(readiness)
}

async fn readyz(State(readiness): State<ReadinessState>) -> (StatusCode, &'static str) {
    if readiness.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "secret informer not in sync")
    }
}

/// Bind the probe listener
///
/// Done before the controller starts so a bad address fails startup.
pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Health probe server listening");
    Ok(listener)
}

/// Serve probes on `listener` until SIGTERM/ctrl-c or the task is dropped
pub async fn serve(listener: TcpListener, readiness: ReadinessState) {
    if let Err(e) = axum::serve(listener, health_routes(readiness))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Health probe server error");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install ctrl-c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Health probe server shutting down");
}
