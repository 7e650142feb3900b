//! Data model: WorkOrder, Lease, Workspace, Run, Snapshot, Gate, GateResult,
//! IterationRecord, TreeNode, ProgressEvent.
//!
//! Every timestamp is `chrono::DateTime<Utc>`, serialized as ISO-8601 —
//! round-tripping through JSON must be the identity modulo that
//! normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cheaply cloneable string id, used for work orders, runs, snapshots, leases.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl Id {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// WorkOrder
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkOrderStatus {
    Queued,
    Running,
    WaitingForChildren,
    Integrating,
    Succeeded,
    Failed,
    Canceled,
}

impl WorkOrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkOrderStatus::Succeeded | WorkOrderStatus::Failed | WorkOrderStatus::Canceled
        )
    }
}

/// Permission level granted to the agent driver for a single run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

/// Constraints passed through to the agent driver for a work order's runs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkOrderConstraints {
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
    #[serde(default)]
    pub permission_mode: Option<PermissionMode>,
    pub additional_system_prompt: Option<String>,
}

/// The immutable input plus mutable status fields of a work order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: Id,
    pub task_prompt: String,
    pub workspace_source: WorkspaceSource,
    pub max_iterations: u32,
    pub max_wall_clock_seconds: u64,
    pub agent_type: Option<String>,
    pub gate_plan: GatePlan,
    #[serde(default)]
    pub constraints: WorkOrderConstraints,

    pub status: WorkOrderStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<crate::error::BuildError>,

    pub parent_id: Option<Id>,
    pub root_id: Id,
    pub depth: u32,
    pub sibling_index: u32,
}

impl WorkOrder {
    pub fn new_root(
        task_prompt: impl Into<String>,
        workspace_source: WorkspaceSource,
        max_iterations: u32,
        max_wall_clock_seconds: u64,
        gate_plan: GatePlan,
    ) -> Self {
        let id = Id::new();
        Self {
            root_id: id.clone(),
            id,
            task_prompt: task_prompt.into(),
            workspace_source,
            max_iterations,
            max_wall_clock_seconds,
            agent_type: None,
            gate_plan,
            constraints: WorkOrderConstraints::default(),
            status: WorkOrderStatus::Queued,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            parent_id: None,
            depth: 0,
            sibling_index: 0,
        }
    }

    pub fn new_child(
        parent: &WorkOrder,
        sibling_index: u32,
        task_prompt: impl Into<String>,
        workspace_source: WorkspaceSource,
        max_iterations: u32,
        max_wall_clock_seconds: u64,
        gate_plan: GatePlan,
    ) -> Self {
        Self {
            id: Id::new(),
            task_prompt: task_prompt.into(),
            workspace_source,
            max_iterations,
            max_wall_clock_seconds,
            agent_type: None,
            gate_plan,
            constraints: WorkOrderConstraints::default(),
            status: WorkOrderStatus::Queued,
            created_at: Utc::now(),
            completed_at: None,
            error: None,
            parent_id: Some(parent.id.clone()),
            root_id: parent.root_id.clone(),
            depth: parent.depth + 1,
            sibling_index,
        }
    }
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkspaceSource {
    Local {
        path: String,
    },
    Git {
        url: String,
        branch: Option<String>,
    },
    Fresh {
        dest_path: String,
        template: Option<String>,
    },
    GitHubRepo {
        owner: String,
        repo: String,
        branch: Option<String>,
    },
    GitHubNewRepo {
        owner: String,
        repo: String,
        private: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Provisioning,
    Ready,
    Leased,
    Released,
    Error,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Workspace {
    pub id: Id,
    pub root_path: String,
    pub source: WorkspaceSource,
    pub git_initialized: bool,
    pub status: WorkspaceStatus,
}

// ---------------------------------------------------------------------------
// Lease
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lease {
    pub id: Id,
    pub workspace_id: Id,
    pub owner_run_id: Id,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    Leased,
    Building,
    Snapshotting,
    Verifying,
    Feedback,
    Succeeded,
    Failed,
    Canceled,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RunState::Succeeded | RunState::Failed | RunState::Canceled
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Converged,
    Diverged,
    Stopped,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Run {
    pub id: Id,
    pub work_order_id: Id,
    pub workspace_id: Id,
    pub iteration: u32,
    pub max_iterations: u32,
    pub state: RunState,
    pub snapshot_before_sha: Option<String>,
    pub snapshot_after_sha: Option<String>,
    pub snapshot_ids: Vec<Id>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<RunResult>,
    pub error: Option<crate::error::BuildError>,
    pub session_id: Option<String>,
    pub pr_url: Option<String>,
    pub pr_number: Option<u64>,
}

impl Run {
    pub fn new(work_order_id: Id, workspace_id: Id, max_iterations: u32) -> Self {
        Self {
            id: Id::new(),
            work_order_id,
            workspace_id,
            iteration: 0,
            max_iterations,
            state: RunState::Queued,
            snapshot_before_sha: None,
            snapshot_after_sha: None,
            snapshot_ids: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            result: None,
            error: None,
            session_id: None,
            pr_url: None,
            pr_number: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Id,
    pub before_sha: String,
    pub after_sha: String,
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
    pub created_at: DateTime<Utc>,
    pub run_id: Id,
    pub iteration: u32,
}

// ---------------------------------------------------------------------------
// Gate / GatePlan / GateResult
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateAction {
    Continue,
    Stop,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateOutcomePolicy {
    pub action: GateAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl Default for GateOutcomePolicy {
    fn default() -> Self {
        Self {
            action: GateAction::Continue,
            feedback: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateCheck {
    VerificationLevels {
        levels: Vec<String>,
    },
    GitHubActions {
        workflows: Option<Vec<String>>,
        poll_interval: String,
        timeout: String,
    },
    CustomCommand {
        command: String,
        allowed_exit_codes: Vec<i32>,
        timeout_seconds: u64,
    },
    Approval {
        token: String,
        timeout: String,
    },
    Convergence {
        similarity_threshold: f64,
        consecutive_rounds: u32,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Gate {
    pub name: String,
    pub check: GateCheck,
    #[serde(default)]
    pub on_failure: GateOutcomePolicy,
    #[serde(default)]
    pub on_success: GateOutcomePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff: Option<BackoffConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
    pub jitter: bool,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            multiplier: 2.0,
            max_backoff_ms: 60_000,
            jitter: true,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GateContract {
    #[serde(default)]
    pub required_files: Vec<String>,
    #[serde(default)]
    pub forbidden_files: Vec<String>,
    #[serde(default)]
    pub naming_rules: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GatePolicy {
    #[serde(default)]
    pub network_allowed: bool,
    #[serde(default = "default_max_runtime")]
    pub max_runtime_seconds: u64,
    #[serde(default)]
    pub disallowed_commands: Vec<String>,
}

fn default_max_runtime() -> u64 {
    1800
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GatePlan {
    pub gates: Vec<Gate>,
    #[serde(default)]
    pub contract: GateContract,
    #[serde(default)]
    pub policy: GatePolicy,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateFailure {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl GateFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            file: None,
            line: None,
            details: None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateResult {
    pub gate_name: String,
    pub passed: bool,
    pub failures: Vec<GateFailure>,
    pub details: serde_json::Value,
    pub duration_ms: u64,
}

impl GateResult {
    pub fn pass(gate_name: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            gate_name: gate_name.into(),
            passed: true,
            failures: Vec::new(),
            details: serde_json::Value::Null,
            duration_ms,
        }
    }

    pub fn fail(
        gate_name: impl Into<String>,
        failures: Vec<GateFailure>,
        duration_ms: u64,
    ) -> Self {
        Self {
            gate_name: gate_name.into(),
            passed: false,
            failures,
            details: serde_json::Value::Null,
            duration_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// IterationRecord
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Build,
    Snapshot,
    Verify,
    Feedback,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub phase: Phase,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub phases: Vec<PhaseTiming>,
    pub tokens: Option<TokenUsage>,
    pub files_changed: u32,
    pub insertions: u32,
    pub deletions: u32,
    pub verification_passed: bool,
    pub verification_levels: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeStatus {
    Active,
    Waiting,
    Integrating,
    Completed,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeNode {
    pub work_order_id: Id,
    pub parent_id: Option<Id>,
    pub child_ids: Vec<Id>,
    pub status: WorkOrderStatus,
    pub depth: u32,
    pub sibling_index: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub integration_status: Option<IntegrationStatus>,
    pub integration_work_order_id: Option<Id>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tree {
    pub root_id: Id,
    pub nodes: HashMap<Id, TreeNode>,
}

impl Tree {
    pub fn new_root(root_id: Id) -> Self {
        let node = TreeNode {
            work_order_id: root_id.clone(),
            parent_id: None,
            child_ids: Vec::new(),
            status: WorkOrderStatus::Queued,
            depth: 0,
            sibling_index: 0,
            created_at: Utc::now(),
            completed_at: None,
            integration_status: None,
            integration_work_order_id: None,
        };
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), node);
        Self { root_id, nodes }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Tree-level status derivation rules, evaluated in priority order.
    pub fn status(&self) -> TreeStatus {
        let statuses: Vec<WorkOrderStatus> = self.nodes.values().map(|n| n.status).collect();
        if statuses
            .iter()
            .any(|s| matches!(s, WorkOrderStatus::Failed | WorkOrderStatus::Canceled))
        {
            return TreeStatus::Failed;
        }
        if statuses
            .iter()
            .any(|s| matches!(s, WorkOrderStatus::Running | WorkOrderStatus::Queued))
        {
            return TreeStatus::Active;
        }
        if statuses
            .iter()
            .any(|s| matches!(s, WorkOrderStatus::WaitingForChildren))
        {
            return TreeStatus::Waiting;
        }
        if statuses
            .iter()
            .any(|s| matches!(s, WorkOrderStatus::Integrating))
        {
            return TreeStatus::Integrating;
        }
        TreeStatus::Completed
    }

    pub fn are_all_children_complete(&self, parent: &Id) -> bool {
        match self.nodes.get(parent) {
            Some(node) => node
                .child_ids
                .iter()
                .all(|c| self.nodes.get(c).map(|n| n.status.is_terminal()).unwrap_or(false)),
            None => false,
        }
    }

    pub fn all_children_succeeded(&self, parent: &Id) -> bool {
        match self.nodes.get(parent) {
            Some(node) => !node.child_ids.is_empty()
                && node.child_ids.iter().all(|c| {
                    self.nodes
                        .get(c)
                        .map(|n| n.status == WorkOrderStatus::Succeeded)
                        .unwrap_or(false)
                }),
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// RunSummary
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Id,
    pub work_order_id: Id,
    pub state: RunState,
    pub iterations: u32,
    pub result: Option<RunResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pr_url: Option<String>,
}

// ---------------------------------------------------------------------------
// ProgressEvent
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEventKind {
    RunStarted,
    RunCompleted { result: RunResult },
    RunCanceled { reason: String },
    RunFailed { error: crate::error::BuildError },
    IterationStarted { iteration: u32 },
    IterationCompleted { iteration: u32, success: bool },
    PhaseStarted { phase: Phase },
    PhaseCompleted { phase: Phase, duration_ms: u64 },
    GateChecked { result: GateResult },
    DeliveryStarted,
    DeliveryCompleted { pr_url: Option<String> },
    AgentOutput { content: String },
    AgentToolCall { id: String, name: String },
    AgentToolResult { id: String, name: String, is_error: bool },
    FileChanged { path: String },
    Heartbeat,
}

impl ProgressEventKind {
    /// Critical events bypass the token-bucket in the progress bus.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            ProgressEventKind::RunFailed { .. } | ProgressEventKind::RunCanceled { .. }
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub work_order_id: Id,
    pub run_id: Id,
    pub correlation_id: Id,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ProgressEventKind,
}

impl ProgressEvent {
    pub fn new(work_order_id: Id, run_id: Id, kind: ProgressEventKind) -> Self {
        Self {
            work_order_id,
            run_id,
            correlation_id: Id::new(),
            timestamp: Utc::now(),
            kind,
        }
    }
}
