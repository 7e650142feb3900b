//! On-disk root layout:
//!
//! ```text
//! ${root}/
//!   work-orders/{id}.json
//!   workspaces/{id}.json
//!   leases/{id}.json
//!   runs/{runId}/{run,work-order,gate-plan,summary}.json
//!   runs/{runId}/iterations/{n}/{iteration.json,patch.diff,agent-logs.txt,feedback.json,snapshot.json}
//!   runs/{runId}/iterations/{n}/verification/{report.json,<level>-logs.txt}
//!   metrics/{iterations/{n}.json,run-metrics.json}
//!   trees/{rootId}.json
//!   audit/{runId}.json
//! ```

use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// `AGENTGATE_ROOT` defaults to `${HOME}/.agentgate` and is overridable.
    pub fn from_env() -> Self {
        let root = std::env::var("AGENTGATE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".agentgate")
            });
        Self::new(root)
    }

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn work_orders_dir(&self) -> PathBuf {
        self.root.join("work-orders")
    }

    pub fn work_order_path(&self, id: &str) -> PathBuf {
        self.work_orders_dir().join(format!("{id}.json"))
    }

    pub fn workspace_path(&self, id: &str) -> PathBuf {
        self.root.join("workspaces").join(format!("{id}.json"))
    }

    pub fn lease_path(&self, id: &str) -> PathBuf {
        self.root.join("leases").join(format!("{id}.json"))
    }

    pub fn leases_dir(&self) -> PathBuf {
        self.root.join("leases")
    }

    pub fn tree_path(&self, root_id: &str) -> PathBuf {
        self.root.join("trees").join(format!("{root_id}.json"))
    }

    pub fn audit_path(&self, run_id: &str) -> PathBuf {
        self.root.join("audit").join(format!("{run_id}.json"))
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.root.join("runs")
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.runs_dir().join(run_id)
    }

    pub fn run_json(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("run.json")
    }

    pub fn run_work_order_json(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("work-order.json")
    }

    pub fn run_gate_plan_json(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("gate-plan.json")
    }

    pub fn run_summary_json(&self, run_id: &str) -> PathBuf {
        self.run_dir(run_id).join("summary.json")
    }

    pub fn iteration_dir(&self, run_id: &str, n: u32) -> PathBuf {
        self.run_dir(run_id).join("iterations").join(n.to_string())
    }

    pub fn iteration_json(&self, run_id: &str, n: u32) -> PathBuf {
        self.iteration_dir(run_id, n).join("iteration.json")
    }

    pub fn agent_logs_txt(&self, run_id: &str, n: u32) -> PathBuf {
        self.iteration_dir(run_id, n).join("agent-logs.txt")
    }

    pub fn patch_diff(&self, run_id: &str, n: u32) -> PathBuf {
        self.iteration_dir(run_id, n).join("patch.diff")
    }

    pub fn feedback_json(&self, run_id: &str, n: u32) -> PathBuf {
        self.iteration_dir(run_id, n).join("feedback.json")
    }

    pub fn snapshot_json(&self, run_id: &str, n: u32) -> PathBuf {
        self.iteration_dir(run_id, n).join("snapshot.json")
    }

    pub fn verification_report_json(&self, run_id: &str, n: u32) -> PathBuf {
        self.iteration_dir(run_id, n)
            .join("verification")
            .join("report.json")
    }

    pub fn verification_level_logs(&self, run_id: &str, n: u32, level: &str) -> PathBuf {
        self.iteration_dir(run_id, n)
            .join("verification")
            .join(format!("{level}-logs.txt"))
    }

    pub fn metrics_iteration_json(&self, n: u32) -> PathBuf {
        self.root
            .join("metrics")
            .join("iterations")
            .join(format!("{n}.json"))
    }

    pub fn run_metrics_json(&self) -> PathBuf {
        self.root.join("metrics").join("run-metrics.json")
    }
}
