//! Work-order queue & stale detector: bounded concurrency admission
//! over `queued` work orders, and a periodic sweep that reclaims `running`
//! work orders whose process is gone or has overrun its budget.

use crate::retry::RetryPolicy;
use agentgate_core::{BuildError, Error, ErrorKind, Id, Result, WorkOrderStatus};
use agentgate_store::{ArtifactStore, LeaseManager};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub max_concurrent_runs: usize,
    pub max_retries: u32,
    pub stale_sweep_interval: Duration,
    pub max_running_time: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 1,
            max_retries: 5,
            stale_sweep_interval: Duration::from_secs(60),
            max_running_time: Duration::from_secs(4 * 3600),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Stale,
    Dead,
}

/// Liveness/termination handle for whatever process backs a running work
/// order. The coordinator registers one of these when a work order is
/// admitted so the stale detector can classify and reclaim it.
pub trait ProcessHandle: Send + Sync {
    fn is_alive(&self) -> bool;
    fn kill(&self);
    /// Ask a live process to stop cooperatively, for a graceful cancellation
    /// rather than the stale detector's hard reclaim. Default is a no-op for
    /// handles that only support `kill`.
    fn request_stop(&self, _reason: &str) {}
}

struct RunningEntry {
    work_order_id: String,
    started_at: Instant,
    process: Arc<dyn ProcessHandle>,
}

/// FIFO admission queue with workspace-lease-aware bounded concurrency.
pub struct WorkOrderQueue {
    store: ArtifactStore,
    leases: Arc<LeaseManager>,
    config: QueueConfig,
    retry: RetryPolicy,
    pending: Mutex<VecDeque<String>>,
    running: Mutex<Vec<RunningEntry>>,
    sweeping: Mutex<()>,
}

impl WorkOrderQueue {
    pub fn new(store: ArtifactStore, leases: Arc<LeaseManager>, config: QueueConfig) -> Self {
        Self {
            store,
            leases,
            config,
            retry: RetryPolicy::default(),
            pending: Mutex::new(VecDeque::new()),
            running: Mutex::new(Vec::new()),
            sweeping: Mutex::new(()),
        }
    }

    pub async fn enqueue(&self, work_order_id: impl Into<String>) {
        self.pending.lock().await.push_back(work_order_id.into());
    }

    pub async fn running_count(&self) -> usize {
        self.running.lock().await.len()
    }

    /// Pop the next pending work order id if capacity allows, without
    /// touching workspace leases. For callers (the dispatcher) whose
    /// workspace isn't known until the work order itself is read — unlike
    /// `try_admit`, which assumes the caller already knows which workspace
    /// it wants to lease.
    pub async fn pop_ready(&self) -> Option<String> {
        if self.running.lock().await.len() >= self.config.max_concurrent_runs {
            return None;
        }
        self.pending.lock().await.pop_front()
    }

    /// Attempt to admit the next pending work order into `running`, acquiring
    /// its workspace lease. Retries lease acquisition with backoff, re-queuing
    /// at the tail on a busy workspace; gives up with `workspace_error` after
    /// `max_retries` attempts.
    pub async fn try_admit(&self, workspace_id: &str, owner_run_id: &str, ttl: Duration) -> Result<Option<String>> {
        if self.running.lock().await.len() >= self.config.max_concurrent_runs {
            return Ok(None);
        }
        let Some(work_order_id) = self.pending.lock().await.pop_front() else {
            return Ok(None);
        };

        let workspace_id: Id = workspace_id.into();
        let owner_run_id: Id = owner_run_id.into();
        let mut attempt = 0u32;
        loop {
            match self.leases.acquire(&workspace_id, &owner_run_id, ttl).await? {
                Ok(_lease) => return Ok(Some(work_order_id)),
                Err(agentgate_store::AcquireError::Busy) => {
                    let decision = self.retry.decide(ErrorKind::WorkspaceError, attempt);
                    if !decision.should_retry || attempt >= self.config.max_retries {
                        if let Some(mut wo) = self.store.try_read_work_order(&work_order_id).await? {
                            wo.status = WorkOrderStatus::Failed;
                            wo.completed_at = Some(chrono::Utc::now());
                            wo.error = Some(BuildError::new(
                                ErrorKind::WorkspaceError,
                                "workspace lease unavailable after max retries",
                            ));
                            self.store.write_work_order(&wo).await?;
                        }
                        return Err(Error::Conflict(format!(
                            "{work_order_id}: workspace busy after {attempt} attempts"
                        )));
                    }
                    tokio::time::sleep(self.retry.delay(&decision)).await;
                    attempt += 1;
                    self.pending.lock().await.push_back(work_order_id.clone());
                    continue;
                }
            }
        }
    }

    pub async fn register_running(&self, work_order_id: impl Into<String>, process: Arc<dyn ProcessHandle>) {
        self.running.lock().await.push(RunningEntry {
            work_order_id: work_order_id.into(),
            started_at: Instant::now(),
            process,
        });
    }

    pub async fn complete(&self, work_order_id: &str) {
        self.running.lock().await.retain(|e| e.work_order_id != work_order_id);
    }

    /// Request cancellation of a running work order. Signals its process
    /// handle's cooperative stop and cancellation token; does not remove it
    /// from `running` — the dispatcher task still owns that once its
    /// coordinator run observes the stop and exits. Returns `false` if no
    /// such work order is currently running (e.g. it was still `queued`).
    pub async fn cancel(&self, work_order_id: &str, reason: &str) -> bool {
        let running = self.running.lock().await;
        match running.iter().find(|e| e.work_order_id == work_order_id) {
            Some(entry) => {
                entry.process.request_stop(reason);
                true
            }
            None => false,
        }
    }

    fn classify(&self, entry: &RunningEntry) -> HealthStatus {
        if !entry.process.is_alive() {
            return HealthStatus::Dead;
        }
        if entry.started_at.elapsed() > self.config.max_running_time {
            return HealthStatus::Stale;
        }
        HealthStatus::Healthy
    }

    /// Single-flighted sweep: classifies every running work order and forces
    /// non-healthy ones to `failed`, freeing their slot.
    pub async fn sweep(&self) -> Result<usize> {
        let _guard = self.sweeping.lock().await;
        let mut reclaimed = Vec::new();
        {
            let mut running = self.running.lock().await;
            let mut keep = Vec::new();
            for entry in running.drain(..) {
                match self.classify(&entry) {
                    HealthStatus::Healthy => keep.push(entry),
                    status => {
                        entry.process.kill();
                        reclaimed.push((entry.work_order_id, status));
                    }
                }
            }
            *running = keep;
        }

        let count = reclaimed.len();
        for (work_order_id, status) in reclaimed {
            warn!(work_order_id, ?status, "stale detector reclaiming work order");
            if let Some(mut wo) = self.store.try_read_work_order(&work_order_id).await? {
                wo.status = WorkOrderStatus::Failed;
                wo.completed_at = Some(chrono::Utc::now());
                wo.error = Some(BuildError::new(
                    ErrorKind::SystemError,
                    format!("Stale detection: process {status:?}"),
                ));
                self.store.write_work_order(&wo).await?;
            }
        }
        Ok(count)
    }

    pub async fn run_stale_detector(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.stale_sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        warn!(error = %e, "stale detector sweep failed");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    }
}

impl std::fmt::Debug for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Stale => "stale",
            HealthStatus::Dead => "dead",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_core::{GatePlan, WorkOrder, WorkspaceSource};
    use agentgate_store::Layout;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeProcess(AtomicBool);
    impl ProcessHandle for FakeProcess {
        fn is_alive(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
        fn kill(&self) {
            self.0.store(false, Ordering::SeqCst);
        }
    }

    fn setup() -> (tempfile::TempDir, ArtifactStore, Arc<LeaseManager>) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(Layout::new(dir.path()));
        let leases = Arc::new(LeaseManager::new(store.clone()));
        (dir, store, leases)
    }

    #[tokio::test]
    async fn admits_up_to_capacity_then_blocks() {
        let (_dir, store, leases) = setup();
        let queue = WorkOrderQueue::new(store.clone(), leases, QueueConfig::default());

        let wo = WorkOrder::new_root(
            "t",
            WorkspaceSource::Local { path: "/w".into() },
            3,
            3600,
            GatePlan::default(),
        );
        store.write_work_order(&wo).await.unwrap();
        queue.enqueue(wo.id.0.clone()).await;

        let admitted = queue
            .try_admit("ws-1", "run-1", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(admitted, Some(wo.id.0.clone()));

        queue
            .register_running(wo.id.0.clone(), Arc::new(FakeProcess(AtomicBool::new(true))))
            .await;
        assert_eq!(queue.running_count().await, 1);

        queue.enqueue("another".to_string()).await;
        let second = queue
            .try_admit("ws-2", "run-2", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn sweep_reclaims_dead_process() {
        let (_dir, store, leases) = setup();
        let queue = WorkOrderQueue::new(store.clone(), leases, QueueConfig::default());

        let wo = WorkOrder::new_root(
            "t",
            WorkspaceSource::Local { path: "/w".into() },
            3,
            3600,
            GatePlan::default(),
        );
        store.write_work_order(&wo).await.unwrap();
        queue
            .register_running(wo.id.0.clone(), Arc::new(FakeProcess(AtomicBool::new(false))))
            .await;

        let reclaimed = queue.sweep().await.unwrap();
        assert_eq!(reclaimed, 1);
        assert_eq!(queue.running_count().await, 0);

        let back = store.read_work_order(wo.id.as_ref()).await.unwrap();
        assert_eq!(back.status, WorkOrderStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_signals_a_running_process_without_removing_it() {
        let (_dir, store, leases) = setup();
        let queue = WorkOrderQueue::new(store, leases, QueueConfig::default());

        struct StoppableProcess {
            alive: AtomicBool,
            stopped_reason: std::sync::Mutex<Option<String>>,
        }
        impl ProcessHandle for StoppableProcess {
            fn is_alive(&self) -> bool {
                self.alive.load(Ordering::SeqCst)
            }
            fn kill(&self) {
                self.alive.store(false, Ordering::SeqCst);
            }
            fn request_stop(&self, reason: &str) {
                *self.stopped_reason.lock().unwrap() = Some(reason.to_string());
            }
        }

        let process = Arc::new(StoppableProcess {
            alive: AtomicBool::new(true),
            stopped_reason: std::sync::Mutex::new(None),
        });
        queue.register_running("wo-1", process.clone()).await;

        let found = queue.cancel("wo-1", "canceled by API request").await;
        assert!(found);
        assert_eq!(
            process.stopped_reason.lock().unwrap().as_deref(),
            Some("canceled by API request")
        );
        assert_eq!(queue.running_count().await, 1);

        let missing = queue.cancel("wo-nonexistent", "canceled by API request").await;
        assert!(!missing);
    }

    #[tokio::test]
    async fn sweep_leaves_healthy_running_untouched() {
        let (_dir, store, leases) = setup();
        let queue = WorkOrderQueue::new(store.clone(), leases, QueueConfig::default());
        queue
            .register_running("wo-1", Arc::new(FakeProcess(AtomicBool::new(true))))
            .await;
        let reclaimed = queue.sweep().await.unwrap();
        assert_eq!(reclaimed, 0);
        assert_eq!(queue.running_count().await, 1);
    }
}
