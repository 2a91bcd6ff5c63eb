pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use handlers::Session;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsQuery {
    pub user_id: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::debug!(user_id = ?params.user_id, "WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, params, state))
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server message");
            true
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, params: WsQuery, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let user = match state.authenticate(params.user_id.as_deref()).await {
        Ok(user) => user,
        Err(e) => {
            tracing::info!(code = e.code(), "Rejecting unauthenticated connection");
            send_json(&mut sender, &ServerMessage::from(&e)).await;
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let (outbound, mut outbound_rx) = mpsc::channel(state.config.outbound_capacity);
    let session = Session {
        connection_id: ulid::Ulid::new().to_string(),
        user,
        outbound,
    };
    let mut shutdown = state.rooms.shutdown_signal();

    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user.id,
        "WebSocket connected"
    );

    loop {
        tokio::select! {
            // Room events queued for this connection
            Some(msg) = outbound_rx.recv() => {
                let msg = msg.for_viewer(&session.user.id);
                if !send_json(&mut sender, &msg).await {
                    break;
                }
            }

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!(connection_id = %session.connection_id, "Received message: {}", text.as_str());

                        let reply = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::handle_message(client_msg, &session, &state).await
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "Failed to parse client message");
                                Some(ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    message: format!("Invalid message format: {e}"),
                                })
                            }
                        };

                        if let Some(reply) = reply {
                            if !send_json(&mut sender, &reply).await {
                                tracing::warn!("Failed to send reply");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "WebSocket error");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let rooms = state.rooms.leave_all(&session.connection_id).await;
    tracing::info!(
        connection_id = %session.connection_id,
        user_id = %session.user.id,
        rooms,
        "WebSocket connection closed"
    );
}
