//! Dispatcher: the background loop that drains `WorkOrderQueue` through the
//! `Coordinator`, and the `ProcessHandle` the stale detector uses to reclaim
//! a run whose coordinator task died.
//!
//! Not named as its own component elsewhere; it is the glue the queue and
//! coordinator assume exists between "admitted" and "running".

use crate::convergence::StopSignal;
use crate::coordinator::Coordinator;
use crate::queue::{ProcessHandle, WorkOrderQueue};
use agentgate_core::{BuildError, ErrorKind, WorkOrderStatus};
use agentgate_store::ArtifactStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Liveness handle for one in-flight coordinator task; `kill` cancels its
/// token, `is_alive` reflects whether the task has finished. `request_stop`
/// additionally records a reason on the run's `StopSignal` so the
/// convergence controller reports `canceled` rather than a bare error.
struct RunHandle {
    alive: Arc<AtomicBool>,
    cancel: CancellationToken,
    stop: Arc<StopSignal>,
}

impl ProcessHandle for RunHandle {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn kill(&self) {
        self.cancel.cancel();
    }

    fn request_stop(&self, reason: &str) {
        self.stop.request(reason);
        self.cancel.cancel();
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: ArtifactStore,
    queue: Arc<WorkOrderQueue>,
    coordinator: Arc<Coordinator>,
    poll_interval: Duration,
}

impl Dispatcher {
    pub fn new(
        store: ArtifactStore,
        queue: Arc<WorkOrderQueue>,
        coordinator: Arc<Coordinator>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            coordinator,
            poll_interval,
        }
    }

    /// Admit and spawn as many pending work orders as current capacity
    /// allows, once. Returns the number admitted.
    pub async fn dispatch_once(&self) -> usize {
        let mut admitted = 0usize;
        while let Some(work_order_id) = self.queue.pop_ready().await {
            self.spawn_run(work_order_id).await;
            admitted += 1;
        }
        admitted
    }

    async fn spawn_run(&self, work_order_id: String) {
        let Ok(Some(work_order)) = self.store.try_read_work_order(&work_order_id).await else {
            warn!(work_order_id, "admitted work order vanished before dispatch");
            return;
        };
        if work_order.status.is_terminal() {
            info!(
                work_order_id,
                status = ?work_order.status,
                "dropping work order that reached a terminal state while queued"
            );
            return;
        }

        let cancel = CancellationToken::new();
        let alive = Arc::new(AtomicBool::new(true));
        let stop = Arc::new(StopSignal::new());
        self.queue
            .register_running(
                work_order_id.clone(),
                Arc::new(RunHandle {
                    alive: alive.clone(),
                    cancel: cancel.clone(),
                    stop: stop.clone(),
                }),
            )
            .await;

        let coordinator = self.coordinator.clone();
        let queue = self.queue.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            let mut wo = work_order;
            wo.status = WorkOrderStatus::Running;
            let _ = store.write_work_order(&wo).await;

            let result = coordinator.execute_work_order(wo.clone(), cancel, stop).await;
            alive.store(false, Ordering::SeqCst);
            queue.complete(&work_order_id).await;

            match result {
                Ok(summary) => {
                    wo.status = match summary.state {
                        agentgate_core::RunState::Succeeded => WorkOrderStatus::Succeeded,
                        agentgate_core::RunState::Canceled => WorkOrderStatus::Canceled,
                        _ => WorkOrderStatus::Failed,
                    };
                    wo.completed_at = summary.completed_at;
                }
                Err(e) => {
                    error!(work_order_id = %work_order_id, error = %e, "coordinator run failed before a run record existed");
                    wo.status = WorkOrderStatus::Failed;
                    wo.completed_at = Some(chrono::Utc::now());
                    wo.error = Some(BuildError::new(ErrorKind::SystemError, e.to_string()));
                }
            }
            let _ = store.write_work_order(&wo).await;
        });
    }

    /// Run the admission loop until `cancel` fires.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    self.dispatch_once().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::CoordinatorConfig;
    use agentgate_core::{GateCheck, GateOutcomePolicy, GatePlan, WorkOrder, WorkspaceSource};
    use agentgate_driver::MockAgentDriver;
    use agentgate_events::{MetricsCollector, ProgressBus};
    use agentgate_gates::{ApprovalSource, GateRegistry};
    use agentgate_sandbox::{SandboxConfig, SubprocessSandbox};
    use agentgate_store::{LeaseManager, Layout};

    struct NoApprovals;
    impl ApprovalSource for NoApprovals {
        fn has_token(&self, _token: &str) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn dispatch_once_runs_a_pending_work_order_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(Layout::new(dir.path()));
        let leases = Arc::new(LeaseManager::new(store.clone()));
        let sandbox = SubprocessSandbox::new(
            "t",
            SandboxConfig {
                workspace_root: dir.path().to_path_buf(),
                ..Default::default()
            },
        );
        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            leases.clone(),
            sandbox,
            Arc::new(MockAgentDriver::succeeding("done")),
            Arc::new(GateRegistry::new()),
            Arc::new(NoApprovals),
            Arc::new(ProgressBus::new(Default::default())),
            Arc::new(MetricsCollector::new()),
            CoordinatorConfig::default(),
        ));
        let queue = Arc::new(WorkOrderQueue::new(store.clone(), leases, Default::default()));

        let gate_plan = GatePlan {
            gates: vec![agentgate_core::Gate {
                name: "smoke".into(),
                check: GateCheck::CustomCommand {
                    command: "true".into(),
                    allowed_exit_codes: vec![],
                    timeout_seconds: 5,
                },
                on_failure: GateOutcomePolicy::default(),
                on_success: GateOutcomePolicy::default(),
                backoff: None,
            }],
            contract: Default::default(),
            policy: Default::default(),
        };
        let wo = WorkOrder::new_root(
            "build it",
            WorkspaceSource::Fresh {
                dest_path: dir.path().join("ws").to_string_lossy().into_owned(),
                template: None,
            },
            2,
            300,
            gate_plan,
        );
        store.write_work_order(&wo).await.unwrap();
        queue.enqueue(wo.id.0.clone()).await;

        let dispatcher = Dispatcher::new(store.clone(), queue.clone(), coordinator, Duration::from_millis(50));
        let admitted = dispatcher.dispatch_once().await;
        assert_eq!(admitted, 1);

        for _ in 0..50 {
            if queue.running_count().await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(queue.running_count().await, 0);

        let reloaded = store.read_work_order(wo.id.as_ref()).await.unwrap();
        assert_eq!(reloaded.status, WorkOrderStatus::Succeeded);
    }

    #[tokio::test]
    async fn spawn_run_skips_a_work_order_canceled_while_queued() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(Layout::new(dir.path()));
        let leases = Arc::new(LeaseManager::new(store.clone()));
        let sandbox = SubprocessSandbox::new(
            "t",
            SandboxConfig {
                workspace_root: dir.path().to_path_buf(),
                ..Default::default()
            },
        );
        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            leases.clone(),
            sandbox,
            Arc::new(MockAgentDriver::succeeding("done")),
            Arc::new(GateRegistry::new()),
            Arc::new(NoApprovals),
            Arc::new(ProgressBus::new(Default::default())),
            Arc::new(MetricsCollector::new()),
            CoordinatorConfig::default(),
        ));
        let queue = Arc::new(WorkOrderQueue::new(store.clone(), leases, Default::default()));

        let mut wo = WorkOrder::new_root(
            "build it",
            WorkspaceSource::Fresh {
                dest_path: dir.path().join("ws").to_string_lossy().into_owned(),
                template: None,
            },
            2,
            300,
            GatePlan::default(),
        );
        // Simulates a DELETE that arrived while the order was still queued.
        wo.status = WorkOrderStatus::Canceled;
        wo.completed_at = Some(chrono::Utc::now());
        store.write_work_order(&wo).await.unwrap();
        queue.enqueue(wo.id.0.clone()).await;

        let dispatcher = Dispatcher::new(store.clone(), queue.clone(), coordinator, Duration::from_millis(50));
        let admitted = dispatcher.dispatch_once().await;
        assert_eq!(admitted, 1, "pop_ready still yields the id; spawn_run must no-op it");
        assert_eq!(queue.running_count().await, 0);

        let reloaded = store.read_work_order(wo.id.as_ref()).await.unwrap();
        assert_eq!(reloaded.status, WorkOrderStatus::Canceled);
    }
}
