//! WebSocket endpoint: subscribe/unsubscribe to a work order's progress
//! events, plus a client ping/pong keepalive.

use crate::state::GatewayState;
use agentgate_core::protocol::{ClientMessage, ServerMessage};
use agentgate_core::Id;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

pub async fn ws_upgrade(
    State(state): State<Arc<GatewayState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut tx, mut rx) = socket.split();
    let (sub_id, mut events) = state.bus.subscribe();
    let mut watched: HashSet<Id> = HashSet::new();

    loop {
        tokio::select! {
            msg = rx.next() => {
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        let reply = handle_client_message(&text, &mut watched);
                        if let Some(reply) = reply {
                            if send(&mut tx, &reply).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(payload))) => {
                        let _ = tx.send(WsMessage::Pong(payload)).await;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket read error");
                        break;
                    }
                    _ => {}
                }
            }
            batch = events.recv() => {
                let Some(batch) = batch else { break };
                for event in batch {
                    if !watched.contains(&event.work_order_id) {
                        continue;
                    }
                    let msg = ServerMessage::Progress { event };
                    if send(&mut tx, &msg).await.is_err() {
                        state.bus.unsubscribe(&sub_id);
                        return;
                    }
                }
            }
        }
    }

    state.bus.unsubscribe(&sub_id);
}

fn handle_client_message(text: &str, watched: &mut HashSet<Id>) -> Option<ServerMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Subscribe { work_order_id, .. }) => {
            watched.insert(work_order_id.clone());
            Some(ServerMessage::SubscriptionConfirmed { work_order_id })
        }
        Ok(ClientMessage::Unsubscribe { work_order_id }) => {
            watched.remove(&work_order_id);
            Some(ServerMessage::UnsubscriptionConfirmed { work_order_id })
        }
        Ok(ClientMessage::Ping) => Some(ServerMessage::Pong),
        Err(e) => Some(ServerMessage::invalid_message(e.to_string())),
    }
}

async fn send(
    tx: &mut futures::stream::SplitSink<WebSocket, WsMessage>,
    msg: &ServerMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).unwrap_or_else(|_| "{}".to_string());
    tx.send(WsMessage::Text(json)).await
}
