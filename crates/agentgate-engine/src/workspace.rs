//! Workspace provisioning: turns a `WorkspaceSource` into a
//! ready `Workspace` inside the sandbox.

use agentgate_core::{Error, Id, Result, Workspace, WorkspaceSource, WorkspaceStatus};
use agentgate_sandbox::{ExecOpts, Sandbox};

pub(crate) fn strs(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn github_url(owner: &str, repo: &str, token: Option<&str>) -> String {
    match token {
        Some(t) => format!("https://{t}@github.com/{owner}/{repo}.git"),
        None => format!("https://github.com/{owner}/{repo}.git"),
    }
}

async fn git_clone(sandbox: &dyn Sandbox, url: &str, dest: &str, branch: &Option<String>) -> Result<()> {
    let mut args = strs(&["clone", url, dest]);
    if let Some(b) = branch {
        args.push("-b".to_string());
        args.push(b.clone());
    }
    let result = sandbox
        .execute("git", &args, ExecOpts::default())
        .await
        .map_err(|e| Error::Workspace(format!("git clone: {e}")))?;
    if result.exit_code != 0 {
        return Err(Error::Workspace(format!(
            "git clone failed (exit {}): {}",
            result.exit_code, result.stderr
        )));
    }
    Ok(())
}

/// Provision a workspace per the given source, returning it in `Ready` status.
pub async fn provision(
    source: &WorkspaceSource,
    sandbox: &dyn Sandbox,
    github_token: Option<&str>,
) -> Result<Workspace> {
    match source {
        WorkspaceSource::Local { path } => Ok(Workspace {
            id: Id::new(),
            root_path: path.clone(),
            source: source.clone(),
            git_initialized: false,
            status: WorkspaceStatus::Ready,
        }),

        WorkspaceSource::Fresh { dest_path, template } => {
            sandbox
                .execute("mkdir", &strs(&["-p", dest_path]), ExecOpts::default())
                .await
                .map_err(|e| Error::Workspace(format!("mkdir: {e}")))?;
            if let Some(tpl) = template {
                sandbox
                    .execute(
                        "cp",
                        &strs(&["-r", &format!("{tpl}/."), dest_path]),
                        ExecOpts::default(),
                    )
                    .await
                    .map_err(|e| Error::Workspace(format!("template copy: {e}")))?;
            }
            let init = sandbox
                .execute("git", &strs(&["-C", dest_path, "init"]), ExecOpts::default())
                .await
                .map_err(|e| Error::Workspace(format!("git init: {e}")))?;
            Ok(Workspace {
                id: Id::new(),
                root_path: dest_path.clone(),
                source: source.clone(),
                git_initialized: init.exit_code == 0,
                status: WorkspaceStatus::Ready,
            })
        }

        WorkspaceSource::Git { url, branch } => {
            let dest = format!("/tmp/agentgate-ws-{}", Id::new());
            git_clone(sandbox, url, &dest, branch).await?;
            Ok(Workspace {
                id: Id::new(),
                root_path: dest,
                source: source.clone(),
                git_initialized: true,
                status: WorkspaceStatus::Ready,
            })
        }

        WorkspaceSource::GitHubRepo { owner, repo, branch } => {
            let dest = format!("/tmp/agentgate-ws-{}", Id::new());
            let url = github_url(owner, repo, github_token);
            git_clone(sandbox, &url, &dest, branch).await?;
            Ok(Workspace {
                id: Id::new(),
                root_path: dest,
                source: source.clone(),
                git_initialized: true,
                status: WorkspaceStatus::Ready,
            })
        }

        WorkspaceSource::GitHubNewRepo { owner, repo, private } => {
            let dest = format!("/tmp/agentgate-ws-{}", Id::new());
            let visibility = if *private { "--private" } else { "--public" };
            let mut env = std::collections::HashMap::new();
            if let Some(t) = github_token {
                env.insert("GITHUB_TOKEN".to_string(), t.to_string());
            }
            let full_name = format!("{owner}/{repo}");
            let create = sandbox
                .execute(
                    "gh",
                    &strs(&["repo", "create", &full_name, visibility, "--clone"]),
                    ExecOpts {
                        env,
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| Error::Workspace(format!("gh repo create: {e}")))?;
            if create.exit_code != 0 {
                return Err(Error::Workspace(format!(
                    "gh repo create failed: {}",
                    create.stderr
                )));
            }
            sandbox
                .execute("mv", &strs(&[repo, &dest]), ExecOpts::default())
                .await
                .map_err(|e| Error::Workspace(format!("relocate new repo clone: {e}")))?;
            Ok(Workspace {
                id: Id::new(),
                root_path: dest,
                source: source.clone(),
                git_initialized: true,
                status: WorkspaceStatus::Ready,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgate_sandbox::{SandboxConfig, SubprocessSandbox};

    #[tokio::test]
    async fn local_source_resolves_without_sandbox_calls() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = SubprocessSandbox::new(
            "sb",
            SandboxConfig {
                workspace_root: dir.path().to_path_buf(),
                ..Default::default()
            },
        );
        let source = WorkspaceSource::Local {
            path: dir.path().to_string_lossy().into_owned(),
        };
        let ws = provision(&source, sandbox.as_ref(), None).await.unwrap();
        assert_eq!(ws.status, WorkspaceStatus::Ready);
    }

    #[tokio::test]
    async fn fresh_source_creates_directory_and_git_repo() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = SubprocessSandbox::new(
            "sb",
            SandboxConfig {
                workspace_root: dir.path().to_path_buf(),
                ..Default::default()
            },
        );
        let dest = dir.path().join("fresh");
        let source = WorkspaceSource::Fresh {
            dest_path: dest.to_string_lossy().into_owned(),
            template: None,
        };
        let ws = provision(&source, sandbox.as_ref(), None).await.unwrap();
        assert_eq!(ws.status, WorkspaceStatus::Ready);
        assert!(dest.join(".git").exists());
    }
}
