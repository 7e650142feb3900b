//! Context a gate runs against: identifiers, the gate contract, the latest
//! snapshot, and a handle to the sandbox the command gates run in.

use agentgate_core::{GateContract, Id, Snapshot};
use agentgate_sandbox::Sandbox;
use std::path::PathBuf;
use std::sync::Arc;

pub struct GateContext {
    pub work_order_id: Id,
    pub run_id: Id,
    pub iteration: u32,
    pub snapshot: Snapshot,
    pub workspace_path: PathBuf,
    pub sandbox: Arc<dyn Sandbox>,
    pub contract: GateContract,
    pub github_repo: Option<(String, String)>,
    pub github_token: Option<String>,
    pub approval_tokens: Arc<dyn ApprovalSource>,
    /// Agent textual output from this iteration and preceding ones, oldest
    /// first — consumed by the convergence gate.
    pub recent_agent_outputs: Vec<String>,
}

/// External approval signal source for the Approval gate. An
/// approval "arrives" when its token is recorded here — typically by the
/// HTTP surface handling an operator action.
pub trait ApprovalSource: Send + Sync {
    fn has_token(&self, token: &str) -> bool;
}
