//! Shared state handed to every axum handler.

use crate::auth::ApiKey;
use agentgate_engine::{Dispatcher, TreeCoordinator, WorkOrderQueue};
use agentgate_events::{MetricsCollector, ProgressBus};
use agentgate_store::ArtifactStore;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct GatewayState {
    pub store: ArtifactStore,
    pub queue: Arc<WorkOrderQueue>,
    pub dispatcher: Arc<Dispatcher>,
    pub tree: Arc<TreeCoordinator>,
    pub bus: Arc<ProgressBus>,
    pub metrics: Arc<MetricsCollector>,
    pub auth: ApiKey,
    pub started_at: Arc<Instant>,
}
