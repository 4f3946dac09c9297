// =============================================================================
// WebSocket hub service
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router as AxumRouter,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::StreamBus;
use crate::config::WsHubConfig;
use crate::health;
use crate::models::Alert;

use super::auth::{authenticate, token_from_bearer_header};
use super::connection::{ClientMessage, ConnectionState};
use super::hub::Hub;

const ALERTS_FILTERED_TOPIC: &str = "alerts.filtered";
const TOPLISTS_TOPIC: &str = "toplists.updated";
const CONSUMER_GROUP: &str = "ws-hub";
const PARTITION: u32 = 0;

struct AppState {
    hub: Arc<Hub>,
    config: WsHubConfig,
}

#[derive(Deserialize)]
struct WsQuery {
    token: Option<String>,
}

pub async fn run(bus: StreamBus, config: WsHubConfig, shutdown: CancellationToken) {
    let hub = Arc::new(Hub::new());

    if let Err(e) = bus.ensure_group(ALERTS_FILTERED_TOPIC, PARTITION, CONSUMER_GROUP).await {
        warn!(error = %e, "failed to ensure consumer group on alerts.filtered");
    }
    if let Err(e) = bus.ensure_group(TOPLISTS_TOPIC, PARTITION, CONSUMER_GROUP).await {
        warn!(error = %e, "failed to ensure consumer group on toplists.updated");
    }

    let state = Arc::new(AppState {
        hub: hub.clone(),
        config: config.clone(),
    });

    let app = AxumRouter::new()
        .route("/ws", get(ws_handler))
        .merge(health::router())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            warn!(error = %e, addr = %config.bind_addr, "failed to bind ws-hub listener");
            return;
        }
    };
    info!(addr = %config.bind_addr, "ws-hub listening");

    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    let alerts_task = tokio::spawn(relay_alerts(bus.clone(), hub.clone(), shutdown.clone()));
    let toplists_task = tokio::spawn(relay_toplists(bus, hub.clone(), shutdown.clone()));
    let sweeper_task = tokio::spawn(sweep_loop(hub, config.idle_timeout(), shutdown.clone()));

    let _ = server.await;
    let _ = alerts_task.await;
    let _ = toplists_task.await;
    let _ = sweeper_task.await;
    info!("ws-hub shut down");
}

async fn relay_alerts(bus: StreamBus, hub: Arc<Hub>, shutdown: CancellationToken) {
    let mut backoff = crate::bus::Backoff::default();
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        match bus
            .consume::<Alert>(ALERTS_FILTERED_TOPIC, PARTITION, CONSUMER_GROUP, "ws-hub-0", 100, Duration::from_millis(500))
            .await
        {
            Ok(deliveries) => {
                backoff.reset();
                if deliveries.is_empty() {
                    continue;
                }
                let ids: Vec<String> = deliveries.iter().map(|d| d.id.clone()).collect();
                for delivery in &deliveries {
                    hub.broadcast_alert(&delivery.payload);
                }
                if let Err(e) = bus.ack(ALERTS_FILTERED_TOPIC, PARTITION, CONSUMER_GROUP, &ids).await {
                    warn!(error = %e, "failed to ack alerts.filtered");
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to consume alerts.filtered, backing off");
                backoff.wait().await;
            }
        }
    }
}

#[derive(serde::Deserialize)]
struct ToplistUpdate {
    name: String,
    rankings: Vec<crate::models::ToplistRanking>,
}

async fn relay_toplists(bus: StreamBus, hub: Arc<Hub>, shutdown: CancellationToken) {
    let mut backoff = crate::bus::Backoff::default();
    loop {
        if shutdown.is_cancelled() {
            break;
        }
        match bus
            .consume::<ToplistUpdate>(TOPLISTS_TOPIC, PARTITION, CONSUMER_GROUP, "ws-hub-0", 100, Duration::from_millis(500))
            .await
        {
            Ok(deliveries) => {
                backoff.reset();
                if deliveries.is_empty() {
                    continue;
                }
                let ids: Vec<String> = deliveries.iter().map(|d| d.id.clone()).collect();
                for delivery in &deliveries {
                    hub.broadcast_toplist(&delivery.payload.name, &delivery.payload.rankings);
                }
                if let Err(e) = bus.ack(TOPLISTS_TOPIC, PARTITION, CONSUMER_GROUP, &ids).await {
                    warn!(error = %e, "failed to ack toplists.updated");
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to consume toplists.updated, backing off");
                backoff.wait().await;
            }
        }
    }
}

async fn sweep_loop(hub: Arc<Hub>, idle_timeout: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let removed = hub.sweep_idle(idle_timeout);
                if removed > 0 {
                    debug!(removed, "swept idle ws connections");
                }
            }
        }
    }
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    let header_token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let presented = token_from_bearer_header(header_token).or(query.token.as_deref());

    let Some(user_id) = authenticate(state.config.shared_secret.as_deref(), presented) else {
        warn!("WebSocket connection rejected: invalid token");
        return (axum::http::StatusCode::FORBIDDEN, "Invalid or missing token").into_response();
    };

    ws.on_upgrade(move |socket| handle_connection(socket, state, user_id))
        .into_response()
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>, user_id: String) {
    let conn_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(state.config.send_queue_capacity);

    state.hub.register(ConnectionState::new(conn_id.clone(), Some(user_id), tx));
    info!(connection_id = %conn_id, "ws connection accepted");

    let mut ping_interval = tokio::time::interval(Duration::from_secs(state.config.ping_interval_secs));

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                match outgoing {
                    Some(body) => {
                        if sender.send(Message::Text(body.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => state.hub.with_connection_mut(&conn_id, |c| c.apply(msg)),
                            Err(e) => debug!(error = %e, "ignoring malformed ws client message"),
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        state.hub.with_connection_mut(&conn_id, |c| c.last_pong_time = std::time::Instant::now());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "ws receive error, disconnecting");
                        break;
                    }
                }
            }
        }
    }

    state.hub.unregister(&conn_id);
    info!(connection_id = %conn_id, "ws connection closed");
}
