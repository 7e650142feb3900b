//! GitHub Actions gate: polls `workflow_runs?head_sha={afterSha}` on
//! a fixed interval until every selected workflow reaches `completed` with
//! conclusion `success`, or the timeout elapses.

use agentgate_core::{parse_duration_spec, GateFailure, GateResult};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, serde::Deserialize)]
struct WorkflowRunsResponse {
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct WorkflowRun {
    name: String,
    status: String,
    conclusion: Option<String>,
}

pub async fn run_github_actions(
    client: &reqwest::Client,
    owner: &str,
    repo: &str,
    token: Option<&str>,
    after_sha: &str,
    workflows: &Option<Vec<String>>,
    poll_interval: &str,
    timeout: &str,
    cancel: &CancellationToken,
) -> GateResult {
    let interval = parse_duration_spec(poll_interval, Duration::from_secs(30));
    let overall_timeout = parse_duration_spec(timeout, Duration::from_secs(3600));
    let started = Instant::now();

    loop {
        if started.elapsed() >= overall_timeout {
            return GateResult::fail(
                "github-actions",
                vec![GateFailure::new("timeout waiting for workflow runs")],
                started.elapsed().as_millis() as u64,
            );
        }

        match fetch_runs(client, owner, repo, token, after_sha).await {
            Ok(runs) => {
                let selected: Vec<&WorkflowRun> = runs
                    .iter()
                    .filter(|r| {
                        workflows
                            .as_ref()
                            .map(|names| names.contains(&r.name))
                            .unwrap_or(true)
                    })
                    .collect();

                if !selected.is_empty() && selected.iter().all(|r| r.status == "completed") {
                    let failed: Vec<GateFailure> = selected
                        .iter()
                        .filter(|r| r.conclusion.as_deref() != Some("success"))
                        .map(|r| {
                            GateFailure::new(format!(
                                "workflow '{}' concluded {}",
                                r.name,
                                r.conclusion.as_deref().unwrap_or("unknown")
                            ))
                        })
                        .collect();
                    let duration_ms = started.elapsed().as_millis() as u64;
                    return if failed.is_empty() {
                        GateResult::pass("github-actions", duration_ms)
                    } else {
                        GateResult::fail("github-actions", failed, duration_ms)
                    };
                }
                debug!(runs = selected.len(), "workflow runs still in progress");
            }
            Err(e) => warn!(error = %e, "failed to poll workflow runs"),
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => {
                return GateResult::fail(
                    "github-actions",
                    vec![GateFailure::new("cancelled while polling workflow runs")],
                    started.elapsed().as_millis() as u64,
                );
            }
        }
    }
}

async fn fetch_runs(
    client: &reqwest::Client,
    owner: &str,
    repo: &str,
    token: Option<&str>,
    after_sha: &str,
) -> Result<Vec<WorkflowRun>, reqwest::Error> {
    let url = format!("https://api.github.com/repos/{owner}/{repo}/actions/runs?head_sha={after_sha}");
    let mut request = client.get(&url).header("User-Agent", "agentgate");
    if let Some(token) = token {
        request = request.bearer_auth(token);
    }
    let response: WorkflowRunsResponse = request.send().await?.error_for_status()?.json().await?;
    Ok(response.workflow_runs)
}
