//! Custom command gate: runs a shell command in the sandbox; passes
//! iff the exit code is in the allowed set (default `{0}`) within timeout.

use agentgate_core::{GateFailure, GateResult};
use agentgate_sandbox::{ExecOpts, Sandbox};
use std::time::Instant;

pub async fn run_custom_command(
    command: &str,
    allowed_exit_codes: &[i32],
    timeout_seconds: u64,
    sandbox: &dyn Sandbox,
) -> GateResult {
    let started = Instant::now();
    let allowed = if allowed_exit_codes.is_empty() {
        vec![0]
    } else {
        allowed_exit_codes.to_vec()
    };

    let result = sandbox
        .execute(
            "bash",
            &["-c".to_string(), command.to_string()],
            ExecOpts {
                timeout_seconds: Some(timeout_seconds),
                ..Default::default()
            },
        )
        .await;

    let duration_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(exec) if exec.timed_out => GateResult::fail(
            "custom-command",
            vec![GateFailure::new(format!("command timed out after {timeout_seconds}s"))],
            duration_ms,
        ),
        Ok(exec) if allowed.contains(&exec.exit_code) => GateResult::pass("custom-command", duration_ms),
        Ok(exec) => GateResult::fail(
            "custom-command",
            vec![GateFailure::new(format!(
                "exit code {} not in allowed set {:?}: {}",
                exec.exit_code,
                allowed,
                exec.stderr.trim()
            ))],
            duration_ms,
        ),
        Err(e) => GateResult::fail(
            "custom-command",
            vec![GateFailure::new(format!("command errored: {e}"))],
            duration_ms,
        ),
    }
}
