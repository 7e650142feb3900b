//! AgentDriver trait and two implementations: a subprocess-backed
//! driver that launches an external agent CLI and streams its structured
//! JSON-lines output through the `MessageCollector`, and a mock used by
//! engine-level tests.

use crate::collector::{CollectorEvent, MessageCollector};
use crate::types::{
    AgentConstraints, AgentRequest, AgentResult, Capability, PermissionMode, StructuredOutput,
    TokenUsage,
};
use agentgate_core::{Error, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A callback invoked for every event the collector produces while the
/// agent runs, used to forward `agent_output`/`agent_tool_call`/
/// `agent_tool_result` progress events without the driver depending on
/// the event bus directly.
pub type EventSink = Box<dyn Fn(CollectorEvent) + Send + Sync>;

#[async_trait]
pub trait AgentDriver: Send + Sync {
    async fn execute(
        &self,
        request: AgentRequest,
        cancel: CancellationToken,
        on_event: Option<EventSink>,
    ) -> Result<AgentResult>;

    async fn is_available(&self) -> bool;
    fn capabilities(&self) -> HashSet<Capability>;
    async fn dispose(&self) {}
}

/// Launches `program` with the task prompt piped on stdin (or as an
/// argument, depending on `arg_mode`), reading newline-delimited JSON
/// messages from stdout.
pub struct SubprocessAgentDriver {
    program: String,
    extra_args: Vec<String>,
    capabilities: HashSet<Capability>,
}

impl SubprocessAgentDriver {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>) -> Self {
        let mut capabilities = HashSet::new();
        capabilities.insert(Capability::Streaming);
        capabilities.insert(Capability::SessionResume);
        Self {
            program: program.into(),
            extra_args,
            capabilities,
        }
    }

    /// Drivers that require a user-supplied OAuth token must filter the
    /// subprocess environment down to an explicit allow-list rather than
    /// inheriting the daemon's full environment.
    pub fn with_oauth_env_filter(mut self) -> Self {
        self.capabilities.insert(Capability::OauthEnvFilter);
        self
    }
}

#[async_trait]
impl AgentDriver for SubprocessAgentDriver {
    async fn execute(
        &self,
        request: AgentRequest,
        cancel: CancellationToken,
        on_event: Option<EventSink>,
    ) -> Result<AgentResult> {
        let started = Instant::now();
        let mut command = Command::new(&self.program);
        command
            .args(&self.extra_args)
            .current_dir(&request.workspace_path)
            .kill_on_drop(true)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        if let Some(session_id) = &request.session_id {
            command.env("AGENTGATE_SESSION_ID", session_id);
        }
        apply_constraint_env(&mut command, &request.constraints);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Internal(format!("failed to spawn agent driver: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            use tokio::io::AsyncWriteExt;
            let prompt = build_prompt(&request);
            let _ = stdin.write_all(prompt.as_bytes()).await;
            drop(stdin);
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("agent driver missing stdout".into()))?;
        let mut lines = BufReader::new(stdout).lines();

        let mut collector = MessageCollector::new();
        let mut structured = StructuredOutput::default();
        let mut stdout_text = String::new();
        let timeout = std::time::Duration::from_millis(request.timeout_ms);

        let read_loop = async {
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        stdout_text.push_str(&line);
                        stdout_text.push('\n');
                        for event in collector.ingest(&line) {
                            if let CollectorEvent::ResultReceived(output) = &event {
                                structured = output.clone();
                            }
                            if let Some(sink) = &on_event {
                                sink(event);
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "error reading agent driver stdout");
                        break;
                    }
                }
            }
        };

        tokio::select! {
            _ = read_loop => {}
            _ = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                return Err(Error::Internal(format!(
                    "agent driver timed out after {}ms",
                    request.timeout_ms
                )));
            }
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(Error::Internal("agent driver cancelled".into()));
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::Internal(format!("failed to wait on agent driver: {e}")))?;

        let mut stderr_text = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            use tokio::io::AsyncReadExt;
            let _ = stderr.read_to_string(&mut stderr_text).await;
        }

        Ok(AgentResult {
            success: status.success(),
            exit_code: status.code().unwrap_or(-1),
            stdout: stdout_text,
            stderr: stderr_text,
            structured_output: structured.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            tokens_used: structured.usage.clone(),
            session_id: structured.session_id.clone(),
        })
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn capabilities(&self) -> HashSet<Capability> {
        self.capabilities.clone()
    }
}

/// Exposes `AgentRequest.constraints` to the subprocess as environment
/// variables, since the subprocess protocol has no structured request
/// channel besides stdin (reserved for the task prompt).
fn apply_constraint_env(command: &mut Command, constraints: &AgentConstraints) {
    if let Some(max_turns) = constraints.max_turns {
        command.env("AGENTGATE_MAX_TURNS", max_turns.to_string());
    }
    if !constraints.allowed_tools.is_empty() {
        command.env("AGENTGATE_ALLOWED_TOOLS", constraints.allowed_tools.join(","));
    }
    if !constraints.disallowed_tools.is_empty() {
        command.env("AGENTGATE_DISALLOWED_TOOLS", constraints.disallowed_tools.join(","));
    }
    if let Some(prompt) = &constraints.additional_system_prompt {
        command.env("AGENTGATE_APPEND_SYSTEM_PROMPT", prompt);
    }
    if let Some(mode) = constraints.permission_mode {
        command.env("AGENTGATE_PERMISSION_MODE", permission_mode_str(mode));
    }
    let bypass = matches!(constraints.permission_mode, Some(PermissionMode::BypassPermissions));
    command.env("AGENTGATE_ALLOW_DANGEROUSLY_SKIP_PERMISSIONS", bypass.to_string());
}

fn permission_mode_str(mode: PermissionMode) -> &'static str {
    match mode {
        PermissionMode::Default => "default",
        PermissionMode::AcceptEdits => "acceptEdits",
        PermissionMode::Plan => "plan",
        PermissionMode::BypassPermissions => "bypassPermissions",
    }
}

fn build_prompt(request: &AgentRequest) -> String {
    match &request.prior_feedback {
        Some(feedback) => format!("{}\n\n{}", request.task_prompt, feedback),
        None => request.task_prompt.clone(),
    }
}

/// A deterministic driver for engine tests — never spawns a process.
pub struct MockAgentDriver {
    pub result: AgentResult,
}

impl MockAgentDriver {
    pub fn succeeding(result_text: impl Into<String>) -> Self {
        Self {
            result: AgentResult {
                success: true,
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
                structured_output: StructuredOutput {
                    result: Some(result_text.into()),
                    session_id: None,
                    usage: Some(TokenUsage { input: 10, output: 10 }),
                    model: None,
                    total_cost_usd: None,
                    tool_calls: Vec::new(),
                    turns: 1,
                },
                duration_ms: 1,
                tokens_used: None,
                session_id: None,
            },
        }
    }
}

#[async_trait]
impl AgentDriver for MockAgentDriver {
    async fn execute(
        &self,
        _request: AgentRequest,
        _cancel: CancellationToken,
        _on_event: Option<EventSink>,
    ) -> Result<AgentResult> {
        debug!("mock agent driver executing");
        Ok(self.result.clone())
    }

    async fn is_available(&self) -> bool {
        true
    }

    fn capabilities(&self) -> HashSet<Capability> {
        let mut set = HashSet::new();
        set.insert(Capability::Streaming);
        set
    }
}
