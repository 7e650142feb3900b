//! agentgate-gateway — the external HTTP/WebSocket surface: REST endpoints
//! for work orders and runs, an SSE stream per run, and a WebSocket for live
//! progress subscriptions.

pub mod auth;
pub mod error;
pub mod rest;
pub mod sse;
pub mod state;
pub mod ws;

use crate::state::GatewayState;
use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Rejects mutating requests (`POST`/`DELETE`) under `/api` when an API key
/// is configured and the `Authorization` header doesn't match.
async fn require_auth(
    State(state): State<Arc<GatewayState>>,
    request: Request,
    next: Next,
) -> Response {
    let mutating = matches!(*request.method(), Method::POST | Method::DELETE);
    if mutating {
        let header = request
            .headers()
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        if !state.auth.verify(header) {
            return error::unauthorized();
        }
    }
    next.run(request).await
}

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/api/v1/work-orders", get(rest::list_work_orders).post(rest::create_work_order))
        .route(
            "/api/v1/work-orders/:id",
            get(rest::get_work_order).delete(rest::cancel_work_order),
        )
        .route("/api/v1/runs", get(rest::list_runs))
        .route("/api/v1/runs/:id", get(rest::get_run))
        .route("/api/v1/runs/:id/stream", get(sse::stream_run))
        .route("/ws", get(ws::ws_upgrade))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .route("/health", get(rest::health))
        .route("/health/ready", get(rest::health_ready))
        .route("/health/live", get(rest::health_live))
        .fallback(not_found)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    error::ApiErrorResponse(agentgate_core::Error::NotFound("no such route".to_string()))
}

pub async fn serve(state: Arc<GatewayState>, bind_addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(state);
    info!(%bind_addr, "agentgate gateway listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApiKey;
    use agentgate_engine::{Coordinator, CoordinatorConfig, Dispatcher, TreeCoordinator, WorkOrderQueue};
    use agentgate_events::{BusConfig, MetricsCollector, ProgressBus};
    use agentgate_gates::{ApprovalSource, GateRegistry};
    use agentgate_sandbox::{SandboxConfig, SubprocessSandbox};
    use agentgate_store::{ArtifactStore, LeaseManager, Layout};
    use axum::body::Body;
    use axum::http::{Request as HttpRequest, StatusCode};
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    struct NoApprovals;
    impl ApprovalSource for NoApprovals {
        fn has_token(&self, _token: &str) -> bool {
            false
        }
    }

    async fn test_state(dir: &std::path::Path, auth: ApiKey) -> Arc<GatewayState> {
        let store = ArtifactStore::new(Layout::new(dir));
        let leases = Arc::new(LeaseManager::new(store.clone()));
        let sandbox = SubprocessSandbox::new(
            "gw-test",
            SandboxConfig {
                workspace_root: dir.to_path_buf(),
                ..Default::default()
            },
        );
        let bus = Arc::new(ProgressBus::new(BusConfig::default()));
        let metrics = Arc::new(MetricsCollector::new());
        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            leases.clone(),
            sandbox,
            Arc::new(agentgate_driver::MockAgentDriver::succeeding("done")),
            Arc::new(GateRegistry::new()),
            Arc::new(NoApprovals),
            bus.clone(),
            metrics.clone(),
            CoordinatorConfig::default(),
        ));
        let queue = Arc::new(WorkOrderQueue::new(store.clone(), leases, Default::default()));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            queue.clone(),
            coordinator,
            Duration::from_millis(50),
        ));
        let tree = Arc::new(TreeCoordinator::new(store.clone()));

        Arc::new(GatewayState {
            store,
            queue,
            dispatcher,
            tree,
            bus,
            metrics,
            auth,
            started_at: Arc::new(Instant::now()),
        })
    }

    #[tokio::test]
    async fn health_live_is_public_and_returns_ok() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), ApiKey(None)).await;
        let app = router(state);
        let response = app
            .oneshot(HttpRequest::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn create_work_order_without_key_configured_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), ApiKey(None)).await;
        let app = router(state);
        let body = serde_json::json!({
            "taskPrompt": "implement the thing end to end",
            "workspaceSource": {"type": "fresh", "dest_path": dir.path().join("ws").to_string_lossy()},
            "maxIterations": 3,
            "maxWallClockSeconds": 600,
        });
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/api/v1/work-orders")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn cancel_work_order_marks_canceled_and_keeps_it_from_running() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), ApiKey(None)).await;
        let queue = state.queue.clone();
        let dispatcher = state.dispatcher.clone();
        let store = state.store.clone();
        let app = router(state);

        let body = serde_json::json!({
            "taskPrompt": "implement the thing end to end",
            "workspaceSource": {"type": "fresh", "dest_path": dir.path().join("ws").to_string_lossy()},
            "maxIterations": 3,
            "maxWallClockSeconds": 600,
        });
        let create = app
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/api/v1/work-orders")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(create.status(), StatusCode::CREATED);
        let bytes = axum::body::to_bytes(create.into_body(), usize::MAX).await.unwrap();
        let created: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let cancel = app
            .oneshot(
                HttpRequest::builder()
                    .method("DELETE")
                    .uri(format!("/api/v1/work-orders/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(cancel.status(), StatusCode::OK);

        let wo = store.read_work_order(&id).await.unwrap();
        assert_eq!(wo.status, agentgate_core::WorkOrderStatus::Canceled);
        assert!(wo.completed_at.is_some());

        // The dispatcher still pops the id off the queue, but must not
        // start running a work order that was canceled while queued.
        dispatcher.dispatch_once().await;
        assert_eq!(queue.running_count().await, 0);
        let reloaded = store.read_work_order(&id).await.unwrap();
        assert_eq!(reloaded.status, agentgate_core::WorkOrderStatus::Canceled);
    }

    #[tokio::test]
    async fn create_work_order_with_mismatched_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), ApiKey(Some("secret".to_string()))).await;
        let app = router(state);
        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("DELETE")
                    .uri("/api/v1/work-orders/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
