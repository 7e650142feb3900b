//! Wire protocol for the HTTP/WS/SSE surface.
//!
//! The WebSocket protocol is a small client→server control channel
//! (subscribe/unsubscribe/ping) layered over the same `ProgressEvent`
//! stream the SSE endpoint serves — both surfaces share one event→wire
//! mapping so a unified choice is not forced on callers.

use crate::types::{Id, ProgressEvent};
use serde::{Deserialize, Serialize};

/// Client → server control messages over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Subscribe {
        work_order_id: Id,
        #[serde(default)]
        filters: Option<serde_json::Value>,
    },
    Unsubscribe {
        work_order_id: Id,
    },
    Ping,
}

/// Server → client messages over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Progress {
        #[serde(flatten)]
        event: ProgressEvent,
    },
    SubscriptionConfirmed {
        work_order_id: Id,
    },
    UnsubscriptionConfirmed {
        work_order_id: Id,
    },
    Pong,
    Error {
        code: WsErrorCode,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsErrorCode {
    InvalidMessage,
}

impl ServerMessage {
    pub fn invalid_message(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: WsErrorCode::InvalidMessage,
            message: message.into(),
        }
    }
}

/// Envelope for the REST surface: `{success, data|error, requestId}`.
#[derive(Debug, Clone, Serialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            request_id: Id::new().to_string(),
        }
    }
}

impl ApiEnvelope<()> {
    pub fn err(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
                details: None,
            }),
            request_id: Id::new().to_string(),
        }
    }
}

/// Map a `ProgressEvent` to its SSE wire form: `event: <kind>\ndata: <json>\n\n`.
pub fn progress_event_to_sse(event: &ProgressEvent) -> String {
    let kind_name = serde_json::to_value(&event.kind)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str().map(str::to_string)))
        .unwrap_or_else(|| "event".to_string());
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("event: {kind_name}\ndata: {data}\n\n")
}
