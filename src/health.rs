// =============================================================================
// Shared health-check router
// =============================================================================
//
// Every service exposes the same endpoints so the same probes work across
// all six binaries. `/health` and `/live` are static 200s (process is up);
// `/ready` is also static here since each service's own startup sequencing
// (bus/KV/DB connect) already happens before the router is mounted — a
// service that failed to connect never gets this far. `/metrics` is a
// minimal plain-text counter dump, not a full metrics pipeline (out of
// scope), just enough for an operator curling the port to see the process
// is alive and for how long.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::{routing::get, Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::warn;

static STARTED_AT: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
static REQUESTS_SERVED: AtomicU64 = AtomicU64::new(0);

pub fn router<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    STARTED_AT.get_or_init(Instant::now);
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(health))
        .route("/live", get(health))
        .route("/metrics", get(metrics))
}

async fn health() -> Json<serde_json::Value> {
    REQUESTS_SERVED.fetch_add(1, Ordering::Relaxed);
    Json(json!({ "status": "ok" }))
}

async fn metrics() -> String {
    let uptime = STARTED_AT.get_or_init(Instant::now).elapsed().as_secs();
    let served = REQUESTS_SERVED.load(Ordering::Relaxed);
    format!("process_uptime_seconds {uptime}\nhealth_requests_served_total {served}\n")
}

/// Run the shared health/metrics router on its own listener, for services
/// that don't otherwise run an `axum` server (everything except ws-hub,
/// which mounts `router()` alongside its websocket upgrade route instead).
pub async fn spawn(port: u16, shutdown: CancellationToken) {
    let app = router::<()>();
    let addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!(error = %e, %addr, "failed to bind health check listener");
            return;
        }
    };
    let _ = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
}
