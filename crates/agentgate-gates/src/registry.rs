//! Gate registry: dispatches `Gate.check` by its `type` discriminant to the
//! matching runner. Unknown or misconfigured checks fail with
//! `gate_configuration`.

use crate::context::GateContext;
use crate::runners::{approval, convergence, custom_command, github_actions, verification};
use agentgate_core::{Gate, GateCheck, GateFailure, GateResult};
use tokio_util::sync::CancellationToken;

pub struct GateRegistry {
    http_client: reqwest::Client,
}

impl GateRegistry {
    pub fn new() -> Self {
        Self {
            http_client: reqwest::Client::new(),
        }
    }

    pub async fn run(
        &self,
        gate: &Gate,
        ctx: &GateContext,
        cancel: &CancellationToken,
    ) -> GateResult {
        let mut result = match &gate.check {
            GateCheck::VerificationLevels { levels } => {
                verification::run_levels(levels, &ctx.contract, &ctx.workspace_path, ctx.sandbox.as_ref()).await
            }
            GateCheck::GitHubActions {
                workflows,
                poll_interval,
                timeout,
            } => match &ctx.github_repo {
                Some((owner, repo)) => {
                    github_actions::run_github_actions(
                        &self.http_client,
                        owner,
                        repo,
                        ctx.github_token.as_deref(),
                        ctx.snapshot.after_sha.as_str(),
                        workflows,
                        poll_interval,
                        timeout,
                        cancel,
                    )
                    .await
                }
                None => GateResult::fail(
                    gate.name.as_str(),
                    vec![GateFailure::new("github_actions gate configured without a GitHub repo workspace")],
                    0,
                ),
            },
            GateCheck::CustomCommand {
                command,
                allowed_exit_codes,
                timeout_seconds,
            } => custom_command::run_custom_command(command, allowed_exit_codes, *timeout_seconds, ctx.sandbox.as_ref()).await,
            GateCheck::Approval { token, timeout } => {
                approval::run_approval(token, timeout, ctx.approval_tokens.as_ref(), cancel).await
            }
            GateCheck::Convergence {
                similarity_threshold,
                consecutive_rounds,
            } => convergence::run_convergence(&ctx.recent_agent_outputs, *similarity_threshold, *consecutive_rounds),
        };
        result.gate_name = gate.name.clone();
        result
    }
}

impl Default for GateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_core::{GateContract, GateOutcomePolicy, Id, Snapshot};
    use agentgate_sandbox::{SandboxConfig, SubprocessSandbox};
    use std::sync::Arc;

    struct NoApprovals;
    impl crate::context::ApprovalSource for NoApprovals {
        fn has_token(&self, _token: &str) -> bool {
            false
        }
    }

    fn context(dir: &std::path::Path) -> GateContext {
        let sandbox = SubprocessSandbox::new(
            "t",
            SandboxConfig {
                workspace_root: dir.to_path_buf(),
                ..Default::default()
            },
        );
        GateContext {
            work_order_id: Id::new(),
            run_id: Id::new(),
            iteration: 1,
            snapshot: Snapshot {
                id: Id::new(),
                before_sha: "a".into(),
                after_sha: "b".into(),
                files_changed: 1,
                insertions: 1,
                deletions: 0,
                created_at: chrono::Utc::now(),
                run_id: Id::new(),
                iteration: 1,
            },
            workspace_path: dir.to_path_buf(),
            sandbox,
            contract: GateContract::default(),
            github_repo: None,
            github_token: None,
            approval_tokens: Arc::new(NoApprovals),
            recent_agent_outputs: Vec::new(),
        }
    }

    #[tokio::test]
    async fn custom_command_gate_dispatches_and_names_result() {
        let dir = tempfile::tempdir().unwrap();
        let registry = GateRegistry::new();
        let gate = Gate {
            name: "smoke-test".into(),
            check: GateCheck::CustomCommand {
                command: "true".into(),
                allowed_exit_codes: vec![],
                timeout_seconds: 5,
            },
            on_failure: GateOutcomePolicy::default(),
            on_success: GateOutcomePolicy::default(),
            backoff: None,
        };
        let result = registry.run(&gate, &context(dir.path()), &CancellationToken::new()).await;
        assert!(result.passed);
        assert_eq!(result.gate_name, "smoke-test");
    }

    #[tokio::test]
    async fn github_actions_without_repo_fails_with_configuration_message() {
        let dir = tempfile::tempdir().unwrap();
        let registry = GateRegistry::new();
        let gate = Gate {
            name: "ci".into(),
            check: GateCheck::GitHubActions {
                workflows: None,
                poll_interval: "10s".into(),
                timeout: "1m".into(),
            },
            on_failure: GateOutcomePolicy::default(),
            on_success: GateOutcomePolicy::default(),
            backoff: None,
        };
        let result = registry.run(&gate, &context(dir.path()), &CancellationToken::new()).await;
        assert!(!result.passed);
        assert!(result.failures[0].message.contains("GitHub repo"));
    }
}
