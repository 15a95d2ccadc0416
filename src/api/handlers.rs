//! HTTP handlers
//!
//! Thin layer between the router and the pipeline components: decode the
//! request, call the component, map errors to the wire envelope.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
    Json,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::server::ApiState;
use crate::api::types::{
    error_response, AlertView, AnalyzeRequest, AnalyzeResponse, BatchAnalyzeRequest,
    BatchAnalyzeResponse, ErrorResponse, ListAlertsQuery, TransitionRequest,
};
use crate::core::domain::AlertStatus;
use crate::hub::{HubEvent, Topic};
use crate::scoring::dto::RetrainResponse;
use crate::storage::StoreStats;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Service health plus a best-effort oracle reachability probe. The
/// service itself reports healthy either way.
pub async fn health_check(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let oracle = match state.oracle.check_health().await {
        Ok(detail) => serde_json::json!({"status": "reachable", "detail": detail}),
        Err(err) => serde_json::json!({"status": "unreachable", "detail": err.to_string()}),
    };
    Json(serde_json::json!({
        "status": "healthy",
        "service": "chain-sentinel",
        "version": env!("CARGO_PKG_VERSION"),
        "oracle": oracle,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// POST /api/transactions/analyze
pub async fn analyze_transaction(
    State(state): State<ApiState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let outcome = state
        .gateway
        .analyze(request.into_transaction())
        .await
        .map_err(error_response)?;
    Ok(Json(outcome.into()))
}

/// POST /api/transactions/analyze-batch
pub async fn analyze_batch(
    State(state): State<ApiState>,
    Json(request): Json<BatchAnalyzeRequest>,
) -> Result<Json<BatchAnalyzeResponse>, ApiError> {
    let txs = request
        .transactions
        .into_iter()
        .map(AnalyzeRequest::into_transaction)
        .collect();
    let outcome = state.gateway.analyze_batch(txs).await.map_err(error_response)?;
    Ok(Json(outcome.into()))
}

const DEFAULT_LIST_LIMIT: usize = 100;

fn parse_status(raw: &str) -> Result<AlertStatus, ApiError> {
    match raw {
        "active" => Ok(AlertStatus::Active),
        "acknowledged" => Ok(AlertStatus::Acknowledged),
        "resolved" => Ok(AlertStatus::Resolved),
        "false_positive" => Ok(AlertStatus::FalsePositive),
        other => Err(error_response(crate::core::errors::SentinelError::InvalidInput(
            format!("unknown alert status filter: {}", other),
        ))),
    }
}

/// GET /api/alerts
pub async fn list_alerts(
    State(state): State<ApiState>,
    Query(query): Query<ListAlertsQuery>,
) -> Result<Json<Vec<AlertView>>, ApiError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    let alerts = state
        .storage
        .list_alerts(status, limit)
        .map_err(error_response)?;
    Ok(Json(alerts.into_iter().map(AlertView::from).collect()))
}

/// GET /api/alerts/:id
pub async fn get_alert(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AlertView>, ApiError> {
    let alert = state
        .storage
        .get_alert(&id)
        .map_err(error_response)?
        .ok_or_else(|| {
            error_response(crate::core::errors::SentinelError::NotFound(format!("alert {}", id)))
        })?;
    Ok(Json(alert.into()))
}

/// POST /api/alerts/:id/acknowledge
pub async fn acknowledge_alert(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<AlertView>, ApiError> {
    let alert = state
        .alerts
        .acknowledge(&id, &request.actor, request.notes)
        .await
        .map_err(error_response)?;
    Ok(Json(alert.into()))
}

/// POST /api/alerts/:id/resolve
pub async fn resolve_alert(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<AlertView>, ApiError> {
    let alert = state
        .alerts
        .resolve(&id, &request.actor, request.notes)
        .await
        .map_err(error_response)?;
    Ok(Json(alert.into()))
}

/// POST /api/alerts/:id/false-positive
pub async fn false_positive_alert(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<AlertView>, ApiError> {
    let alert = state
        .alerts
        .mark_false_positive(&id, &request.actor, request.notes)
        .await
        .map_err(error_response)?;
    Ok(Json(alert.into()))
}

/// GET /api/stats
pub async fn get_stats(State(state): State<ApiState>) -> Result<Json<StoreStats>, ApiError> {
    Ok(Json(state.storage.stats().map_err(error_response)?))
}

/// POST /api/model/retrain
///
/// Opaque passthrough to the oracle's retraining endpoint.
pub async fn trigger_retrain(
    State(state): State<ApiState>,
) -> Result<Json<RetrainResponse>, ApiError> {
    let response = state.oracle.trigger_retrain().await.map_err(error_response)?;
    info!(status = %response.status, "model retraining triggered");
    Ok(Json(response))
}

/// Client frame on the event stream.
#[derive(Debug, Deserialize)]
struct ClientCommand {
    action: String,
    topic: Option<String>,
}

/// GET /api/ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    let (mut sender, mut receiver) = socket.split();

    let welcome = serde_json::json!({
        "type": "connected",
        "topics": [Topic::FraudAlerts.as_str(), Topic::AnalyticsUpdates.as_str()],
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    if sender.send(Message::Text(welcome.to_string())).await.is_err() {
        return;
    }

    // All outbound frames funnel through one channel so subscription
    // forwarders never contend for the socket.
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let hub = state.hub.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut forwarders: HashMap<Topic, tokio::task::JoinHandle<()>> = HashMap::new();
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            let command: ClientCommand = match serde_json::from_str(&text) {
                Ok(c) => c,
                Err(_) => {
                    let _ = out_tx
                        .send(
                            serde_json::json!({
                                "type": "error",
                                "error": "malformed command",
                            })
                            .to_string(),
                        )
                        .await;
                    continue;
                }
            };
            let topic = match command.topic.as_deref().and_then(Topic::parse) {
                Some(t) => t,
                None => {
                    let _ = out_tx
                        .send(
                            serde_json::json!({
                                "type": "error",
                                "error": "unknown topic",
                            })
                            .to_string(),
                        )
                        .await;
                    continue;
                }
            };
            match command.action.as_str() {
                // subscribing twice is a no-op
                "subscribe" if !forwarders.contains_key(&topic) => {
                    let mut rx = hub.subscribe(topic);
                    let out = out_tx.clone();
                    forwarders.insert(
                        topic,
                        tokio::spawn(async move {
                            loop {
                                match rx.recv().await {
                                    Ok(event) => {
                                        if forward(&out, &event).await.is_err() {
                                            break;
                                        }
                                    }
                                    // lagged subscriber skips ahead, keeps going
                                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                                }
                            }
                        }),
                    );
                    debug!(topic = topic.as_str(), "websocket subscribed");
                }
                "subscribe" => {}
                "unsubscribe" => {
                    if let Some(handle) = forwarders.remove(&topic) {
                        handle.abort();
                        debug!(topic = topic.as_str(), "websocket unsubscribed");
                    }
                }
                _ => {
                    let _ = out_tx
                        .send(
                            serde_json::json!({
                                "type": "error",
                                "error": "unknown action",
                            })
                            .to_string(),
                        )
                        .await;
                }
            }
        }
        for handle in forwarders.into_values() {
            handle.abort();
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }
    debug!("websocket disconnected");
}

async fn forward(
    out: &mpsc::Sender<String>,
    event: &HubEvent,
) -> Result<(), mpsc::error::SendError<String>> {
    match serde_json::to_string(event) {
        Ok(json) => out.send(json).await,
        Err(_) => Ok(()),
    }
}
