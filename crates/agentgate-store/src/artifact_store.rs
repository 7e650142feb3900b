//! Typed artifact store: the only place the kernel writes/reads
//! `WorkOrder`, `Run`, `Snapshot`, `IterationRecord`, `Tree`, `RunSummary`.

use crate::atomic::{append_line, read_json, try_read_json, write_json_atomic, write_text};
use crate::layout::Layout;
use agentgate_core::{
    GateFailure, GatePlan, GateResult, Id, IterationRecord, Lease, Result, Run, RunSummary,
    Snapshot, Tree, Workspace, WorkOrder,
};
use serde::{Deserialize, Serialize};

#[derive(Clone)]
pub struct ArtifactStore {
    layout: Layout,
}

impl ArtifactStore {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    // -- work orders --------------------------------------------------

    pub async fn write_work_order(&self, wo: &WorkOrder) -> Result<()> {
        write_json_atomic(&self.layout.work_order_path(wo.id.as_ref()), wo).await
    }

    pub async fn read_work_order(&self, id: &str) -> Result<WorkOrder> {
        read_json(&self.layout.work_order_path(id)).await
    }

    pub async fn try_read_work_order(&self, id: &str) -> Result<Option<WorkOrder>> {
        try_read_json(&self.layout.work_order_path(id)).await
    }

    pub async fn list_work_order_ids(&self) -> Result<Vec<String>> {
        let dir = self.layout.work_orders_dir();
        crate::atomic::ensure_dir(&dir).await?;
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = name.strip_suffix(".json") {
                    out.push(id.to_string());
                }
            }
        }
        Ok(out)
    }

    // -- workspaces -----------------------------------------------------

    pub async fn write_workspace(&self, ws: &Workspace) -> Result<()> {
        write_json_atomic(&self.layout.workspace_path(ws.id.as_ref()), ws).await
    }

    pub async fn read_workspace(&self, id: &str) -> Result<Workspace> {
        read_json(&self.layout.workspace_path(id)).await
    }

    // -- leases -----------------------------------------------------------

    pub async fn write_lease(&self, lease: &Lease) -> Result<()> {
        write_json_atomic(&self.layout.lease_path(lease.id.as_ref()), lease).await
    }

    pub async fn try_read_lease(&self, id: &str) -> Result<Option<Lease>> {
        try_read_json(&self.layout.lease_path(id)).await
    }

    pub async fn remove_lease(&self, id: &str) -> Result<()> {
        let path = self.layout.lease_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_lease_ids(&self) -> Result<Vec<String>> {
        let dir = self.layout.leases_dir();
        crate::atomic::ensure_dir(&dir).await?;
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = name.strip_suffix(".json") {
                    out.push(id.to_string());
                }
            }
        }
        Ok(out)
    }

    // -- runs -----------------------------------------------------------

    pub async fn write_run(&self, run: &Run) -> Result<()> {
        write_json_atomic(&self.layout.run_json(run.id.as_ref()), run).await
    }

    pub async fn read_run(&self, run_id: &str) -> Result<Run> {
        read_json(&self.layout.run_json(run_id)).await
    }

    pub async fn write_run_work_order(&self, run_id: &str, wo: &WorkOrder) -> Result<()> {
        write_json_atomic(&self.layout.run_work_order_json(run_id), wo).await
    }

    pub async fn write_run_gate_plan(&self, run_id: &str, plan: &GatePlan) -> Result<()> {
        write_json_atomic(&self.layout.run_gate_plan_json(run_id), plan).await
    }

    pub async fn write_run_summary(&self, run_id: &str, summary: &RunSummary) -> Result<()> {
        write_json_atomic(&self.layout.run_summary_json(run_id), summary).await
    }

    pub async fn read_run_summary(&self, run_id: &str) -> Result<RunSummary> {
        read_json(&self.layout.run_summary_json(run_id)).await
    }

    pub async fn try_read_run_summary(&self, run_id: &str) -> Result<Option<RunSummary>> {
        try_read_json(&self.layout.run_summary_json(run_id)).await
    }

    pub async fn list_run_ids(&self) -> Result<Vec<String>> {
        let dir = self.layout.runs_dir();
        crate::atomic::ensure_dir(&dir).await?;
        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    out.push(name.to_string());
                }
            }
        }
        Ok(out)
    }

    // -- iterations -------------------------------------------------------

    pub async fn write_iteration(&self, run_id: &str, record: &IterationRecord) -> Result<()> {
        write_json_atomic(&self.layout.iteration_json(run_id, record.iteration), record).await
    }

    pub async fn append_agent_log(&self, run_id: &str, iteration: u32, line: &str) -> Result<()> {
        append_line(&self.layout.agent_logs_txt(run_id, iteration), line).await
    }

    pub async fn write_patch_diff(&self, run_id: &str, iteration: u32, diff: &str) -> Result<()> {
        write_text(&self.layout.patch_diff(run_id, iteration), diff).await
    }

    pub async fn write_feedback(&self, run_id: &str, iteration: u32, feedback: &Feedback) -> Result<()> {
        write_json_atomic(&self.layout.feedback_json(run_id, iteration), feedback).await
    }

    pub async fn write_snapshot(&self, run_id: &str, iteration: u32, snapshot: &Snapshot) -> Result<()> {
        write_json_atomic(&self.layout.snapshot_json(run_id, iteration), snapshot).await
    }

    pub async fn write_verification_report(
        &self,
        run_id: &str,
        iteration: u32,
        report: &VerificationReport,
    ) -> Result<()> {
        write_json_atomic(&self.layout.verification_report_json(run_id, iteration), report).await
    }

    pub async fn write_verification_level_log(
        &self,
        run_id: &str,
        iteration: u32,
        level: &str,
        log: &str,
    ) -> Result<()> {
        write_text(&self.layout.verification_level_logs(run_id, iteration, level), log).await
    }

    // -- tree ---------------------------------------------------------------

    pub async fn write_tree(&self, tree: &Tree) -> Result<()> {
        write_json_atomic(&self.layout.tree_path(tree.root_id.as_ref()), tree).await
    }

    pub async fn try_read_tree(&self, root_id: &str) -> Result<Option<Tree>> {
        try_read_json(&self.layout.tree_path(root_id)).await
    }

    // -- audit ----------------------------------------------------------------

    pub async fn append_audit(&self, run_id: &str, entry: &AuditEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        append_line(&self.layout.audit_path(run_id), &line).await
    }

    // -- metrics ------------------------------------------------------------

    pub async fn write_metrics_snapshot(&self, value: &serde_json::Value) -> Result<()> {
        write_json_atomic(&self.layout.run_metrics_json(), value).await
    }
}

/// Feedback synthesized from gate failures, persisted per
/// iteration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Feedback {
    pub markdown: String,
    pub failures: Vec<GateFailure>,
}

/// Aggregated verification result for one iteration — one entry per level.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VerificationReport {
    pub results: Vec<GateResult>,
    pub passed: bool,
}

/// An append-only audit record (who/what/when) for a run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: chrono::DateTime<chrono::Utc>,
    pub actor: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(actor: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            at: chrono::Utc::now(),
            actor: actor.into(),
            action: action.into(),
            details: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_core::{RunState, WorkspaceSource, WorkspaceStatus};

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        (dir, ArtifactStore::new(layout))
    }

    #[tokio::test]
    async fn work_order_round_trips() {
        let (_dir, store) = store();
        let wo = WorkOrder::new_root(
            "do the thing",
            WorkspaceSource::Local { path: "/w".into() },
            3,
            3600,
            GatePlan::default(),
        );
        store.write_work_order(&wo).await.unwrap();
        let back = store.read_work_order(wo.id.as_ref()).await.unwrap();
        assert_eq!(back.id, wo.id);
        assert_eq!(back.task_prompt, wo.task_prompt);
    }

    #[tokio::test]
    async fn list_work_order_ids_reflects_writes() {
        let (_dir, store) = store();
        let wo = WorkOrder::new_root(
            "do the thing",
            WorkspaceSource::Local { path: "/w".into() },
            3,
            3600,
            GatePlan::default(),
        );
        store.write_work_order(&wo).await.unwrap();
        let ids = store.list_work_order_ids().await.unwrap();
        assert_eq!(ids, vec![wo.id.0.clone()]);
    }

    #[tokio::test]
    async fn missing_work_order_is_not_found() {
        let (_dir, store) = store();
        let err = store.read_work_order("nope").await.unwrap_err();
        assert!(matches!(err, agentgate_core::Error::NotFound(_)));
    }

    #[tokio::test]
    async fn run_and_iteration_layout() {
        let (_dir, store) = store();
        let run = Run::new(Id::new(), Id::new(), 3);
        store.write_run(&run).await.unwrap();
        let back = store.read_run(run.id.as_ref()).await.unwrap();
        assert_eq!(back.state, RunState::Queued);

        let record = IterationRecord {
            iteration: 1,
            phases: vec![],
            tokens: None,
            files_changed: 1,
            insertions: 1,
            deletions: 0,
            verification_passed: true,
            verification_levels: vec!["L0".into()],
            started_at: chrono::Utc::now(),
            completed_at: chrono::Utc::now(),
        };
        store.write_iteration(run.id.as_ref(), &record).await.unwrap();
        store
            .append_agent_log(run.id.as_ref(), 1, "hello")
            .await
            .unwrap();

        let iter_path = store.layout().iteration_json(run.id.as_ref(), 1);
        assert!(iter_path.exists());
    }

    #[tokio::test]
    async fn workspace_round_trips() {
        let (_dir, store) = store();
        let ws = Workspace {
            id: Id::new(),
            root_path: "/tmp/w".into(),
            source: WorkspaceSource::Local { path: "/tmp/w".into() },
            git_initialized: false,
            status: WorkspaceStatus::Ready,
        };
        store.write_workspace(&ws).await.unwrap();
        let back = store.read_workspace(ws.id.as_ref()).await.unwrap();
        assert_eq!(back.root_path, ws.root_path);
    }
}
