//! Control-plane route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use crate::tasks::TaskStatus;

use super::server::GatewayState;

// ─── Public ───────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({
        "name": state.settings.get().agent_name,
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

// ─── Status / skills / memory ─────────────────────────────────────────────────

pub async fn status(State(state): State<GatewayState>) -> impl IntoResponse {
    let routes: Vec<_> = state.router.all().into_iter().cloned().collect();
    Json(json!({
        "name": state.settings.get().agent_name,
        "routes": routes,
        "skillCount": state.skills.len(),
        "memoryCount": state.memory.count().await,
        "pendingApprovals": state.approvals.pending().len(),
    }))
}

pub async fn skills(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({ "skills": &*state.skills }))
}

pub async fn memory(State(state): State<GatewayState>) -> impl IntoResponse {
    let entries = state.memory.bullets(100).await.unwrap_or_default();
    Json(json!({ "entries": entries }))
}

// ─── Settings ─────────────────────────────────────────────────────────────────

pub async fn get_settings(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(state.settings.get())
}

#[derive(Debug, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub patch: serde_json::Value,
    #[serde(default)]
    pub confirmations: Vec<String>,
}

pub async fn patch_settings(
    State(state): State<GatewayState>,
    Json(body): Json<SettingsPatch>,
) -> impl IntoResponse {
    match state.settings.apply_patch(body.patch, &body.confirmations) {
        Ok(outcome) => (StatusCode::OK, Json(json!(outcome))),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))),
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub key: String,
    pub value: String,
}

/// Issue a one-time confirmation token for a dangerous settings change.
/// `value` is parsed as JSON so `?value=false` names the boolean, not the
/// string.
pub async fn settings_confirm(
    State(state): State<GatewayState>,
    Query(query): Query<ConfirmQuery>,
) -> impl IntoResponse {
    let value: serde_json::Value = serde_json::from_str(&query.value)
        .unwrap_or(serde_json::Value::String(query.value.clone()));
    Json(json!({
        "key": query.key,
        "token": state.settings.confirmation_token(&query.key, &value),
    }))
}

// ─── Tasks ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TaskQuery {
    pub status: Option<String>,
}

pub async fn list_tasks(
    State(state): State<GatewayState>,
    Query(query): Query<TaskQuery>,
) -> impl IntoResponse {
    match query.status.as_deref() {
        Some(raw) => match TaskStatus::parse(raw) {
            Some(status) => {
                (StatusCode::OK, Json(json!({ "tasks": state.tasks.list_by_status(status) })))
            }
            None => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("unknown status '{raw}'") })),
            ),
        },
        None => (StatusCode::OK, Json(json!({ "tasks": state.tasks.all() }))),
    }
}

pub async fn get_task(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.tasks.get(&id) {
        Some(task) => (StatusCode::OK, Json(json!(task))),
        None => (StatusCode::NOT_FOUND, Json(json!({ "error": "no such task" }))),
    }
}

#[derive(Debug, Deserialize)]
pub struct TaskAction {
    pub action: String,
}

pub async fn task_action(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<TaskAction>,
) -> impl IntoResponse {
    let result = match body.action.as_str() {
        "cancel" => state
            .tasks
            .update_status(&id, TaskStatus::Cancelled, None, None, None)
            .map(|t| json!(t)),
        "pause" => state
            .tasks
            .update_status(&id, TaskStatus::Paused, None, None, None)
            .map(|t| json!(t)),
        "resume" => state
            .tasks
            .update_status(&id, TaskStatus::Pending, None, None, None)
            .map(|t| json!(t)),
        "delete" => state.tasks.delete(&id).map(|removed| json!({ "deleted": removed })),
        other => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("unknown action '{other}'") })),
            );
        }
    };
    match result {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))),
    }
}

// ─── Approvals ────────────────────────────────────────────────────────────────

pub async fn list_approvals(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({ "approvals": state.approvals.all() }))
}

#[derive(Debug, Deserialize)]
pub struct ApprovalResolution {
    pub approve: bool,
    #[serde(default)]
    pub resolver: Option<String>,
}

pub async fn resolve_approval(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    Json(body): Json<ApprovalResolution>,
) -> impl IntoResponse {
    let resolver = body.resolver.unwrap_or_else(|| "dashboard".to_string());
    match state.approvals.resolve(&id, body.approve, &resolver) {
        Ok(request) => (StatusCode::OK, Json(json!(request))),
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))),
    }
}

// ─── Costs ────────────────────────────────────────────────────────────────────

pub async fn costs_today(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!(state.cost.today()))
}

pub async fn costs_history(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({ "days": state.cost.history() }))
}

pub async fn costs_config(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!(state.cost.config()))
}

pub async fn set_costs_config(
    State(state): State<GatewayState>,
    Json(config): Json<crate::cost::BudgetConfig>,
) -> impl IntoResponse {
    match state.cost.set_config(config.clone()) {
        Ok(()) => (StatusCode::OK, Json(json!(config))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

// ─── Triggers ─────────────────────────────────────────────────────────────────

pub async fn list_triggers(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({ "triggers": state.triggers.all() }))
}

pub async fn toggle_trigger(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(current) = state.triggers.get(&id) else {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "no such trigger" })));
    };
    match state.triggers.set_enabled(&id, !current.enabled) {
        Ok(updated) => (StatusCode::OK, Json(json!(updated))),
        Err(e) => (StatusCode::NOT_FOUND, Json(json!({ "error": e.to_string() }))),
    }
}

pub async fn delete_trigger(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.triggers.remove(&id) {
        Ok(true) => (StatusCode::OK, Json(json!({ "deleted": true }))),
        Ok(false) => (StatusCode::NOT_FOUND, Json(json!({ "error": "no such trigger" }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

// ─── Agents / audit ───────────────────────────────────────────────────────────

pub async fn agents(State(state): State<GatewayState>) -> impl IntoResponse {
    let routes: Vec<_> = state.router.all().into_iter().cloned().collect();
    Json(json!({
        "agents": state.agents.snapshot(),
        "routes": routes,
    }))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub date: Option<String>,
}

pub async fn audit(
    State(state): State<GatewayState>,
    Query(query): Query<AuditQuery>,
) -> impl IntoResponse {
    let date = query.date.unwrap_or_else(crate::util::today_stamp);
    match state.audit.entries_for(&date) {
        Ok(entries) => (StatusCode::OK, Json(json!({ "date": date, "entries": entries }))),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))),
    }
}

pub async fn audit_dates(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({ "dates": state.audit.dates() }))
}

// ─── Fallback ─────────────────────────────────────────────────────────────────

pub async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" })))
}
