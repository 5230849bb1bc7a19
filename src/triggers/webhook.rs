//! Webhook listener: a shared loopback HTTP server routing by configured
//! path. When a trigger carries a shared secret, requests must present it via
//! `X-Webhook-Secret` or a GitHub-style `X-Hub-Signature-256` HMAC; a
//! mismatch yields 401.

use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, Uri},
    response::IntoResponse,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use tokio::sync::watch;

use crate::{error::CoreError, error::Result, security::token_matches, util::truncate_chars};

use super::{registry::TriggerRegistry, types::TriggerType};

/// Default loopback port for the webhook listener.
pub const DEFAULT_WEBHOOK_PORT: u16 = 18790;

/// Payload body preview cap forwarded to the session loop.
const BODY_PREVIEW_CHARS: usize = 3000;

// ─── HMAC ─────────────────────────────────────────────────────────────────────

/// Hex HMAC-SHA256 of `message` under `key` (the digest part of GitHub's
/// `sha256=…` signature header).
pub fn hmac_sha256_hex(key: &[u8], message: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .unwrap_or_else(|_| panic!("HMAC key of any length is accepted"));
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Check the shared secret against either accepted header.
fn secret_ok(secret: &str, headers: &HeaderMap, body: &[u8]) -> bool {
    if let Some(provided) = headers.get("x-webhook-secret").and_then(|v| v.to_str().ok()) {
        return token_matches(secret, provided);
    }
    if let Some(signature) = headers.get("x-hub-signature-256").and_then(|v| v.to_str().ok()) {
        let expected = format!("sha256={}", hmac_sha256_hex(secret.as_bytes(), body));
        return token_matches(&expected, signature);
    }
    false
}

// ─── Server ───────────────────────────────────────────────────────────────────

async fn handle(
    State(registry): State<Arc<TriggerRegistry>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let path = uri.path().to_string();
    let trigger = registry
        .enabled_of_type(TriggerType::Webhook)
        .into_iter()
        .find(|t| t.config_str("path") == Some(path.as_str()));

    let Some(trigger) = trigger else {
        return (StatusCode::NOT_FOUND, axum::Json(json!({"error": "no such hook"})));
    };

    if let Some(secret) = trigger.config_str("secret")
        && !secret_ok(secret, &headers, &body)
    {
        return (StatusCode::UNAUTHORIZED, axum::Json(json!({"error": "bad signature"})));
    }

    let body_text = truncate_chars(&String::from_utf8_lossy(&body), BODY_PREVIEW_CHARS);
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let payload = json!({
        "path": path,
        "contentType": content_type,
        "body": body_text,
    });

    match registry.record_fire(&trigger.id, payload) {
        Ok(()) => (StatusCode::OK, axum::Json(json!({"ok": true}))),
        Err(e) => {
            log::warn!("webhook '{}': fire failed: {e}", trigger.name);
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(json!({"error": "fire failed"})))
        }
    }
}

pub fn router(registry: Arc<TriggerRegistry>) -> Router {
    Router::new().fallback(handle).with_state(registry)
}

/// Serve the webhook listener on loopback until shutdown flips.
pub async fn serve(
    registry: Arc<TriggerRegistry>,
    port: u16,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .map_err(|e| CoreError::fatal(format!("webhook listener cannot bind port {port}: {e}")))?;
    log::info!("webhook listener on 127.0.0.1:{port}");

    axum::serve(listener, router(registry))
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await
        .map_err(|e| CoreError::transport(format!("webhook listener failed: {e}")))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
