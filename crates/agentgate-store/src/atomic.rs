//! Crash-safe JSON writes and append-only log writes:
//! every JSON write is write-temp-then-rename; every log write is
//! append-only; directory creation is recursive-idempotent; readers
//! tolerate absence by reporting `NotFound`.

use agentgate_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Recursively create a directory; a no-op if it already exists.
pub async fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).await?;
    Ok(())
}

/// Write `value` as pretty JSON to `path`, atomically: write to a sibling
/// `.tmp-<uuid>` file in the same directory, then rename over the target.
/// A crash mid-write leaves the original file (or no file) untouched.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        ensure_dir(dir).await?;
    }
    let tmp_path = tmp_sibling(path);
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp_path, &bytes).await?;
    fs::rename(&tmp_path, path).await.map_err(|e| {
        // best-effort cleanup of the dangling temp file
        let tmp = tmp_path.clone();
        tokio::spawn(async move {
            let _ = fs::remove_file(&tmp).await;
        });
        Error::Io(e)
    })?;
    Ok(())
}

fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".tmp-{}-{file_name}", uuid::Uuid::new_v4()))
}

/// Read and parse a JSON file. Absence is reported as `Error::NotFound`,
/// not propagated as a raw io error, per the reader-tolerance contract.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = match fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::NotFound(path.display().to_string()))
        }
        Err(e) => return Err(Error::Io(e)),
    };
    Ok(serde_json::from_slice(&bytes)?)
}

pub async fn try_read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_json(path).await {
        Ok(v) => Ok(Some(v)),
        Err(Error::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Append `line` (plus a trailing newline) to a log file, creating it and
/// its parent directory if needed.
pub async fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        ensure_dir(dir).await?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    if !line.ends_with('\n') {
        file.write_all(b"\n").await?;
    }
    Ok(())
}

/// Overwrite a log/text file wholesale (used for `patch.diff`, full agent
/// stdout dumps — not line-oriented, so not append_line).
pub async fn write_text(path: &Path, content: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        ensure_dir(dir).await?;
    }
    fs::write(path, content).await?;
    Ok(())
}
