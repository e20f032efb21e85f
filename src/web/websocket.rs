//! WebSocket handler for live reading updates.

use crate::reading::ConvertedValue;
use crate::web::state::{AppState, Client};
use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

/// WebSocket upgrade handler.
pub async fn websocket_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    if state.client_count().await >= state.max_connections() {
        warn!("Rejecting WebSocket client: {} connections open", state.max_connections());
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

fn encode(value: &ConvertedValue) -> Option<Message> {
    match serde_json::to_string(value) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            error!("Failed to serialize reading: {}", e);
            None
        }
    }
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let client_id = uuid::Uuid::new_v4().to_string();
    info!("WebSocket client connected: {}", client_id);

    state
        .register_client(Client {
            id: client_id.clone(),
            connected_at: std::time::SystemTime::now(),
        })
        .await;

    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.subscribe_readings();

    // New clients start from the last known value
    if let Some(message) = state.latest().as_ref().and_then(encode) {
        if let Err(e) = sender.send(message).await {
            warn!("Failed to send message to client {}: {}", client_id, e);
        }
    }

    let client_id_recv = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    info!("WebSocket client {} disconnected", client_id_recv);
                    break;
                }
                Ok(_) => {
                    debug!("Ignoring message from {}", client_id_recv);
                }
                Err(e) => {
                    warn!("WebSocket error for client {}: {}", client_id_recv, e);
                    break;
                }
            }
        }
    });

    let client_id_send = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        loop {
            let value = match rx.recv().await {
                Ok(value) => value,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Client {} lagged, skipped {} readings", client_id_send, skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Some(message) = encode(&value) else {
                continue;
            };
            if let Err(e) = sender.send(message).await {
                warn!("Failed to send message to client {}: {}", client_id_send, e);
                break;
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut recv_task => {
            debug!("Receive task completed for client {}", client_id);
            send_task.abort();
        }
        _ = &mut send_task => {
            debug!("Send task completed for client {}", client_id);
            recv_task.abort();
        }
    }

    match state.remove_client(&client_id).await {
        Some(client) => {
            let connected_for = client.connected_at.elapsed().unwrap_or_default();
            info!(
                "WebSocket client disconnected: {} (connected for {:.1}s)",
                client_id,
                connected_for.as_secs_f64()
            );
        }
        None => info!("WebSocket client disconnected: {}", client_id),
    }
}
