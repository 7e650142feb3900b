//! Wire types for the agent driver plug.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentConstraints {
    pub max_turns: Option<u32>,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    #[serde(default)]
    pub disallowed_tools: Vec<String>,
    #[serde(default)]
    pub permission_mode: Option<PermissionMode>,
    pub additional_system_prompt: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentRequest {
    pub workspace_path: String,
    pub task_prompt: String,
    pub gate_plan_summary: String,
    #[serde(default)]
    pub constraints: AgentConstraints,
    pub prior_feedback: Option<String>,
    pub timeout_ms: u64,
    pub session_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub input: serde_json::Value,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StructuredOutput {
    pub result: Option<String>,
    pub session_id: Option<String>,
    pub usage: Option<TokenUsage>,
    pub model: Option<String>,
    pub total_cost_usd: Option<f64>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
    pub turns: u32,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub structured_output: StructuredOutput,
    pub duration_ms: u64,
    pub tokens_used: Option<TokenUsage>,
    pub session_id: Option<String>,
}

/// A capability flag advertised by a driver. The OAuth env-filter capability
/// is one such flag, checked before launching a subprocess driver that
/// requires a user-provided OAuth token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Streaming,
    SessionResume,
    OauthEnvFilter,
}
