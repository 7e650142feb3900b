//! Approval gate: waits for an external signal (token match) up to
//! timeout; otherwise `pending` is treated as a failure.

use crate::context::ApprovalSource;
use agentgate_core::{parse_duration_spec, GateFailure, GateResult};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub async fn run_approval(
    token: &str,
    timeout: &str,
    source: &dyn ApprovalSource,
    cancel: &CancellationToken,
) -> GateResult {
    let overall_timeout = parse_duration_spec(timeout, Duration::from_secs(3600));
    let poll_interval = Duration::from_secs(5);
    let started = Instant::now();

    loop {
        if source.has_token(token) {
            return GateResult::pass("approval", started.elapsed().as_millis() as u64);
        }
        if started.elapsed() >= overall_timeout {
            return GateResult::fail(
                "approval",
                vec![GateFailure::new("approval pending: timeout elapsed")],
                started.elapsed().as_millis() as u64,
            );
        }
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = cancel.cancelled() => {
                return GateResult::fail(
                    "approval",
                    vec![GateFailure::new("cancelled while awaiting approval")],
                    started.elapsed().as_millis() as u64,
                );
            }
        }
    }
}
