//! agentgate-sandbox — execution containers for the AI agent:
//! container-backed and subprocess-backed variants behind one `Sandbox`
//! trait, plus the resource-limit and network-mode config types the
//! container-backed variant enforces.

pub mod subprocess;

use agentgate_core::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    Creating,
    Running,
    Stopped,
    Destroyed,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    None,
    Bridge,
    Host,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_count: Option<f64>,
    pub memory_mb: Option<u64>,
    pub disk_mb: Option<u64>,
    pub timeout_seconds: Option<u64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_count: None,
            memory_mb: None,
            disk_mb: None,
            timeout_seconds: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    pub workspace_root: std::path::PathBuf,
    #[serde(default)]
    pub limits: ResourceLimits,
    #[serde(default = "default_network_mode")]
    pub network_mode: NetworkMode,
}

fn default_network_mode() -> NetworkMode {
    NetworkMode::None
}

#[derive(Clone, Debug, Default)]
pub struct ExecOpts {
    pub cwd: Option<std::path::PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout_seconds: Option<u64>,
    pub stdin: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub duration_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileStats {
    pub size_bytes: u64,
    pub is_dir: bool,
}

/// Capability set every sandbox backend exposes. Object-safe so the
/// engine can hold a `Box<dyn Sandbox>` regardless of backend.
#[async_trait]
pub trait Sandbox: Send + Sync {
    fn id(&self) -> &str;
    fn status(&self) -> SandboxStatus;

    async fn execute(&self, cmd: &str, args: &[String], opts: ExecOpts) -> Result<ExecResult>;
    async fn read_file(&self, path: &std::path::Path) -> Result<Vec<u8>>;
    async fn write_file(&self, path: &std::path::Path, content: &[u8]) -> Result<()>;
    async fn list_files(&self, path: &std::path::Path) -> Result<Vec<std::path::PathBuf>>;
    async fn get_stats(&self, path: &std::path::Path) -> Result<FileStats>;
    async fn destroy(&self) -> Result<()>;
}

pub use subprocess::SubprocessSandbox;
