//! `/ws` — the sanitized live event stream.
//!
//! Dashboard clients see what happened, never the sensitive payloads:
//! message contents become previews, tool inputs shrink to their key names,
//! tool results to a 200-character preview.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use serde_json::{Value, json};

use crate::{event_bus::AppEvent, util::truncate_chars};

use super::server::GatewayState;

const PREVIEW_CHARS: usize = 200;

/// Map a bus event to its sanitized wire form. `None` drops the event.
pub fn sanitize(event: &AppEvent) -> Option<Value> {
    let value = match event {
        AppEvent::MessageReceived { channel, user, content } => json!({
            "type": "message_received",
            "channel": channel,
            "username": user,
            "preview": truncate_chars(content, 100),
        }),
        AppEvent::AgentStarted { channel, user } => json!({
            "type": "agent_started",
            "channel": channel,
            "username": user,
        }),
        AppEvent::AgentCompleted { channel, user, reply } => json!({
            "type": "agent_completed",
            "channel": channel,
            "username": user,
            "preview": truncate_chars(reply, PREVIEW_CHARS),
        }),
        AppEvent::ToolCalled { tool_name, args } => {
            let keys: Vec<&str> = args
                .as_object()
                .map(|o| o.keys().map(String::as_str).collect())
                .unwrap_or_default();
            json!({
                "type": "tool_called",
                "tool": tool_name,
                "argKeys": keys,
            })
        }
        AppEvent::ToolResult { tool_name, result, success } => json!({
            "type": "tool_result",
            "tool": tool_name,
            "success": success,
            "preview": truncate_chars(result, PREVIEW_CHARS),
        }),
        AppEvent::ApprovalRequested { approval_id, tool_name, risk, description, .. } => json!({
            "type": "approval_requested",
            "id": approval_id,
            "tool": tool_name,
            "risk": risk,
            "description": description,
        }),
        AppEvent::ApprovalResolved { approval_id, approved, resolver } => json!({
            "type": "approval_resolved",
            "id": approval_id,
            "approved": approved,
            "resolver": resolver,
        }),
        AppEvent::HeartbeatDue { items } => json!({
            "type": "heartbeat_due",
            "itemCount": items.len(),
        }),
        AppEvent::TriggerFired { trigger_id, name, trigger_type, .. } => json!({
            "type": "trigger_fired",
            "id": trigger_id,
            "name": name,
            "triggerType": trigger_type,
        }),
        AppEvent::TaskUpdated { task_id, status, progress } => json!({
            "type": "task_updated",
            "id": task_id,
            "status": status,
            "progress": progress,
        }),
        AppEvent::SystemError { message } => json!({
            "type": "system_error",
            "message": truncate_chars(message, PREVIEW_CHARS),
        }),
    };
    Some(value)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: GatewayState) {
    let mut rx = state.bus.subscribe();

    let hello = json!({
        "type": "connected",
        "name": state.settings.get().agent_name,
    });
    if socket.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(payload) = sanitize(&event)
                            && socket.send(Message::Text(payload.to_string())).await.is_err()
                        {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("ws: subscriber lagged, missed {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &state, &mut socket).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
        }
    }
}

async fn handle_client_message(raw: &str, state: &GatewayState, socket: &mut WebSocket) {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            let _ = socket
                .send(Message::Text(
                    json!({"type": "error", "error": format!("invalid message: {e}")}).to_string(),
                ))
                .await;
            return;
        }
    };
    match parsed.get("type").and_then(Value::as_str) {
        Some("ping") => {
            let _ = socket.send(Message::Text(json!({"type": "pong"}).to_string())).await;
        }
        Some("status") => {
            let payload = json!({
                "type": "status",
                "pendingApprovals": state.approvals.pending().len(),
                "tasks": state.tasks.all().len(),
                "todayCost": state.cost.today().cost,
            });
            let _ = socket.send(Message::Text(payload.to_string())).await;
        }
        _ => {
            let _ = socket
                .send(Message::Text(json!({"type": "error", "error": "unknown message type"}).to_string()))
                .await;
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
