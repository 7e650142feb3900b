//! Error taxonomy shared across the kernel.

use thiserror::Error;

/// Not every kind carries a payload — the taxonomy is what callers branch
/// on, the struct fields are what gets logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    WorkspaceError,
    SandboxError,
    AgentTimeout,
    AgentCrash,
    GateFailure,
    GateConfiguration,
    GithubError,
    SystemError,
}

impl ErrorKind {
    /// Default retryable set: `{agent_timeout, system_error, github_error}`.
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::AgentTimeout | ErrorKind::SystemError | ErrorKind::GithubError
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::WorkspaceError => "workspace_error",
            ErrorKind::SandboxError => "sandbox_error",
            ErrorKind::AgentTimeout => "agent_timeout",
            ErrorKind::AgentCrash => "agent_crash",
            ErrorKind::GateFailure => "gate_failure",
            ErrorKind::GateConfiguration => "gate_configuration",
            ErrorKind::GithubError => "github_error",
            ErrorKind::SystemError => "system_error",
        };
        f.write_str(s)
    }
}

/// A structured, recorded build failure, written to `run.json` and emitted
/// as `run_failed`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BuildError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl BuildError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for BuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for BuildError {}

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("sandbox error: {0}")]
    Sandbox(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("gate configuration error: {0}")]
    GateConfiguration(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Map to the error taxonomy used by the retry engine and the HTTP surface.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Workspace(_) => ErrorKind::WorkspaceError,
            Error::Sandbox(_) => ErrorKind::SandboxError,
            Error::GateConfiguration(_) => ErrorKind::GateConfiguration,
            Error::NotFound(_) | Error::Conflict(_) => ErrorKind::Validation,
            Error::Io(_) | Error::Json(_) | Error::Internal(_) => ErrorKind::SystemError,
        }
    }

    /// Map to the HTTP error code string used by the gateway.
    pub fn http_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "BAD_REQUEST",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            _ => "INTERNAL",
        }
    }
}
