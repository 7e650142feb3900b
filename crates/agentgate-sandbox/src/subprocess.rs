//! Subprocess-backed sandbox: runs commands directly on the host inside the
//! workspace root. Ignores `ResourceLimits`/`NetworkMode` — it is the
//! fallback variant, not the isolation boundary.

use crate::{ExecOpts, ExecResult, FileStats, Sandbox, SandboxConfig, SandboxStatus};
use agentgate_core::{Error, Result};
use agentgate_store::validate_path;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const STATUS_RUNNING: u8 = 0;
const STATUS_STOPPED: u8 = 1;
const STATUS_DESTROYED: u8 = 2;
const STATUS_ERROR: u8 = 3;

pub struct SubprocessSandbox {
    id: String,
    workspace_root: PathBuf,
    status: AtomicU8,
    cancel: CancellationToken,
}

impl SubprocessSandbox {
    pub fn new(id: impl Into<String>, config: SandboxConfig) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            workspace_root: config.workspace_root,
            status: AtomicU8::new(STATUS_RUNNING),
            cancel: CancellationToken::new(),
        })
    }

    /// Cancel any in-flight `execute` call — used by run cancellation to
    /// force-kill the agent subprocess.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn resolve_cwd(&self, cwd: &Option<PathBuf>) -> Result<PathBuf> {
        match cwd {
            Some(candidate) => validate_path(&self.workspace_root, candidate)
                .map_err(|v| Error::Sandbox(format!("path_traversal: {v}"))),
            None => Ok(self.workspace_root.clone()),
        }
    }
}

#[async_trait]
impl Sandbox for SubprocessSandbox {
    fn id(&self) -> &str {
        &self.id
    }

    fn status(&self) -> SandboxStatus {
        match self.status.load(Ordering::SeqCst) {
            STATUS_RUNNING => SandboxStatus::Running,
            STATUS_STOPPED => SandboxStatus::Stopped,
            STATUS_DESTROYED => SandboxStatus::Destroyed,
            _ => SandboxStatus::Error,
        }
    }

    async fn execute(&self, cmd: &str, args: &[String], opts: ExecOpts) -> Result<ExecResult> {
        let cwd = self.resolve_cwd(&opts.cwd)?;
        let timeout_secs = opts.timeout_seconds.unwrap_or(120);

        debug!(sandbox_id = %self.id, %cmd, "executing in subprocess sandbox");

        let mut command = Command::new(cmd);
        command
            .args(args)
            .current_dir(&cwd)
            .envs(&opts.env)
            .kill_on_drop(true)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| Error::Sandbox(format!("failed to spawn {cmd}: {e}")))?;

        if let Some(stdin_data) = &opts.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                use tokio::io::AsyncWriteExt;
                let _ = stdin.write_all(stdin_data.as_bytes()).await;
            }
        }

        let started = Instant::now();
        let timeout_duration = std::time::Duration::from_secs(timeout_secs);

        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout_duration, child.wait_with_output()) => result,
            _ = self.cancel.cancelled() => {
                return Ok(ExecResult {
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: "process killed by cancellation".into(),
                    timed_out: false,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(output)) => Ok(ExecResult {
                exit_code: output.status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                timed_out: false,
                duration_ms,
            }),
            Ok(Err(e)) => Err(Error::Sandbox(format!("failed to wait on {cmd}: {e}"))),
            Err(_) => Ok(ExecResult {
                exit_code: -1,
                stdout: String::new(),
                stderr: format!("command timed out after {timeout_secs}s"),
                timed_out: true,
                duration_ms,
            }),
        }
    }

    async fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        let resolved = validate_path(&self.workspace_root, path)
            .map_err(|v| Error::Sandbox(format!("path_traversal: {v}")))?;
        Ok(tokio::fs::read(&resolved).await?)
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        let resolved = validate_path(&self.workspace_root, path)
            .map_err(|v| Error::Sandbox(format!("path_traversal: {v}")))?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&resolved, content).await?;
        Ok(())
    }

    async fn list_files(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let resolved = validate_path(&self.workspace_root, path)
            .map_err(|v| Error::Sandbox(format!("path_traversal: {v}")))?;
        let mut out = Vec::new();
        for entry in walkdir::WalkDir::new(&resolved)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            out.push(entry.path().to_path_buf());
        }
        Ok(out)
    }

    async fn get_stats(&self, path: &Path) -> Result<FileStats> {
        let resolved = validate_path(&self.workspace_root, path)
            .map_err(|v| Error::Sandbox(format!("path_traversal: {v}")))?;
        let metadata = tokio::fs::metadata(&resolved).await?;
        Ok(FileStats {
            size_bytes: metadata.len(),
            is_dir: metadata.is_dir(),
        })
    }

    async fn destroy(&self) -> Result<()> {
        self.status.store(STATUS_DESTROYED, Ordering::SeqCst);
        self.cancel.cancel();
        Ok(())
    }
}
