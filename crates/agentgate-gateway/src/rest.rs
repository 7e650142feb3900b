//! REST surface: work-order CRUD and run reads.

use crate::error::ApiErrorResponse;
use crate::state::GatewayState;
use agentgate_core::protocol::ApiEnvelope;
use agentgate_core::{
    Error, GatePlan, Result, WorkOrder, WorkOrderConstraints, WorkOrderStatus, WorkspaceSource,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub async fn health_live() -> impl IntoResponse {
    Json(serde_json::json!({"status": "alive"}))
}

pub async fn health_ready(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    match state.store.list_work_order_ids().await {
        Ok(_) => (StatusCode::OK, Json(serde_json::json!({"status": "ready"}))),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "not_ready"})),
        ),
    }
}

pub async fn health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "running": state.queue.running_count().await,
    }))
}

#[derive(Deserialize)]
pub struct ListWorkOrdersQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

fn parse_status(raw: &str) -> Option<WorkOrderStatus> {
    match raw {
        "queued" => Some(WorkOrderStatus::Queued),
        "running" => Some(WorkOrderStatus::Running),
        "waiting_for_children" => Some(WorkOrderStatus::WaitingForChildren),
        "integrating" => Some(WorkOrderStatus::Integrating),
        "succeeded" => Some(WorkOrderStatus::Succeeded),
        "failed" => Some(WorkOrderStatus::Failed),
        "canceled" => Some(WorkOrderStatus::Canceled),
        _ => None,
    }
}

pub async fn list_work_orders(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ListWorkOrdersQuery>,
) -> std::result::Result<impl IntoResponse, ApiErrorResponse> {
    let ids = state.store.list_work_order_ids().await.map_err(ApiErrorResponse)?;
    let status_filter = query.status.as_deref().and_then(parse_status);

    let mut orders = Vec::new();
    for id in ids {
        if let Some(wo) = state.store.try_read_work_order(&id).await.map_err(ApiErrorResponse)? {
            if status_filter.map(|s| s == wo.status).unwrap_or(true) {
                orders.push(wo);
            }
        }
    }
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(50).min(500);
    let page: Vec<WorkOrder> = orders.into_iter().skip(offset).take(limit).collect();

    Ok(Json(ApiEnvelope::ok(page)))
}

pub async fn get_work_order(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> std::result::Result<impl IntoResponse, ApiErrorResponse> {
    let wo = state
        .store
        .try_read_work_order(&id)
        .await
        .map_err(ApiErrorResponse)?
        .ok_or_else(|| ApiErrorResponse(Error::NotFound(format!("work order {id}"))))?;
    Ok(Json(ApiEnvelope::ok(wo)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWorkOrderRequest {
    pub task_prompt: String,
    pub workspace_source: WorkspaceSource,
    pub max_iterations: u32,
    pub max_wall_clock_seconds: u64,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub gate_plan: GatePlan,
    #[serde(default)]
    pub constraints: WorkOrderConstraints,
}

fn validate_create(req: &CreateWorkOrderRequest) -> Result<()> {
    if req.task_prompt.trim().len() < 10 {
        return Err(Error::Validation(
            "taskPrompt must be at least 10 characters".to_string(),
        ));
    }
    if !(1..=10).contains(&req.max_iterations) {
        return Err(Error::Validation("maxIterations must be in [1, 10]".to_string()));
    }
    if !(1..=86_400).contains(&req.max_wall_clock_seconds) {
        return Err(Error::Validation(
            "maxWallClockSeconds must be in [1, 86400]".to_string(),
        ));
    }
    Ok(())
}

pub async fn create_work_order(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<CreateWorkOrderRequest>,
) -> std::result::Result<impl IntoResponse, ApiErrorResponse> {
    validate_create(&req).map_err(ApiErrorResponse)?;

    let mut wo = WorkOrder::new_root(
        req.task_prompt,
        req.workspace_source,
        req.max_iterations,
        req.max_wall_clock_seconds,
        req.gate_plan,
    );
    wo.agent_type = req.agent_type;
    wo.constraints = req.constraints;

    state.store.write_work_order(&wo).await.map_err(ApiErrorResponse)?;
    state.tree.create_root(&wo).await.map_err(ApiErrorResponse)?;
    state.queue.enqueue(wo.id.0.clone()).await;
    info!(work_order_id = %wo.id, "work order admitted");

    Ok((StatusCode::CREATED, Json(ApiEnvelope::ok(wo))))
}

pub async fn cancel_work_order(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> std::result::Result<impl IntoResponse, ApiErrorResponse> {
    let mut wo = state
        .store
        .try_read_work_order(&id)
        .await
        .map_err(ApiErrorResponse)?
        .ok_or_else(|| ApiErrorResponse(Error::NotFound(format!("work order {id}"))))?;

    if wo.status.is_terminal() {
        return Err(ApiErrorResponse(Error::Conflict(format!(
            "work order {id} already in a terminal state"
        ))));
    }

    let was_running = wo.status == WorkOrderStatus::Running;
    wo.status = WorkOrderStatus::Canceled;
    wo.completed_at = Some(chrono::Utc::now());
    state.store.write_work_order(&wo).await.map_err(ApiErrorResponse)?;

    if was_running {
        state.queue.cancel(&id, "canceled by API request").await;
    }
    info!(work_order_id = %id, "work order canceled by request");

    Ok(Json(ApiEnvelope::ok(wo)))
}

#[derive(Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_runs(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ListRunsQuery>,
) -> std::result::Result<impl IntoResponse, ApiErrorResponse> {
    let ids = state.store.list_run_ids().await.map_err(ApiErrorResponse)?;
    let mut summaries = Vec::new();
    for id in ids {
        if let Some(summary) = state.store.try_read_run_summary(&id).await.map_err(ApiErrorResponse)? {
            summaries.push(summary);
        }
    }
    summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(50).min(500);
    let page: Vec<_> = summaries.into_iter().skip(offset).take(limit).collect();
    Ok(Json(ApiEnvelope::ok(page)))
}

pub async fn get_run(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> std::result::Result<impl IntoResponse, ApiErrorResponse> {
    let summary = state
        .store
        .try_read_run_summary(&id)
        .await
        .map_err(ApiErrorResponse)?
        .ok_or_else(|| ApiErrorResponse(Error::NotFound(format!("run {id}"))))?;
    Ok(Json(ApiEnvelope::ok(summary)))
}
