// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipe Sink
//!
//! Scoped acquisition of a named pipe (FIFO) with guaranteed release.
//! Creation is idempotent: an existing FIFO at the target path is reused,
//! any other file type there is replaced. Opening the pipe for writing
//! blocks until a reader attaches; that syscall is not natively
//! cancellable, so we race it in a worker task against the shutdown token
//! rather than pretend we can interrupt it.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use sentinel_domain::{Result, SentinelError};

#[derive(Debug, Serialize)]
struct ReadySignal {
    ready: bool,
    timestamp: String,
    sentinel_version: String,
}

pub struct PipeSink {
    pipe_path: PathBuf,
    ready_signal_path: PathBuf,
}

impl PipeSink {
    pub fn new(pipe_path: impl Into<PathBuf>, ready_signal_path: impl Into<PathBuf>) -> Self {
        Self {
            pipe_path: pipe_path.into(),
            ready_signal_path: ready_signal_path.into(),
        }
    }

    pub fn pipe_path(&self) -> &Path {
        &self.pipe_path
    }

    /// Creates the FIFO at `pipe_path`, reusing an existing one in place.
    pub async fn ensure_pipe(&self) -> Result<()> {
        let path = self.pipe_path.clone();
        tokio::task::spawn_blocking(move || ensure_pipe_blocking(&path))
            .await
            .map_err(|e| SentinelError::internal(format!("pipe creation task panicked: {e}")))?
    }

    /// Opens the pipe for writing. Blocks until a reader attaches; races
    /// that block against `cancel` so shutdown is observed promptly even
    /// though the underlying `open()` cannot itself be interrupted.
    pub async fn open_for_write(&self, cancel: CancellationToken) -> Result<tokio::fs::File> {
        let path = self.pipe_path.clone();
        let open_task = tokio::task::spawn_blocking(move || {
            std::fs::OpenOptions::new()
                .write(true)
                .open(&path)
                .map_err(SentinelError::from)
        });

        tokio::select! {
            result = open_task => {
                let std_file = result.map_err(|e| SentinelError::internal(format!("pipe open task panicked: {e}")))??;
                Ok(tokio::fs::File::from_std(std_file))
            }
            _ = cancel.cancelled() => {
                tracing::warn!("pipe open-for-write cancelled before a reader attached");
                Err(SentinelError::Cancelled)
            }
        }
    }

    /// Writes the ready-signal file atomically: write to a sibling temp
    /// file, chmod 0644, then rename over the final path.
    pub async fn write_ready_signal(&self, sentinel_version: &str) -> Result<()> {
        let signal = ReadySignal {
            ready: true,
            timestamp: Utc::now().to_rfc3339(),
            sentinel_version: sentinel_version.to_string(),
        };
        let body = serde_json::to_vec(&signal).map_err(|e| SentinelError::internal(format!("ready signal serialization failed: {e}")))?;
        let final_path = self.ready_signal_path.clone();
        tokio::task::spawn_blocking(move || write_ready_signal_blocking(&final_path, &body))
            .await
            .map_err(|e| SentinelError::internal(format!("ready signal write task panicked: {e}")))?
    }
}

#[cfg(unix)]
fn ensure_pipe_blocking(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
        std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o755))?;
    }

    match std::fs::symlink_metadata(path) {
        Ok(meta) => {
            if is_fifo(&meta) {
                return Ok(());
            }
            std::fs::remove_file(path)?;
            create_fifo(path)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => create_fifo(path),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
fn is_fifo(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    meta.file_type().is_fifo()
}

#[cfg(unix)]
fn create_fifo(path: &Path) -> Result<()> {
    let c_path = std::ffi::CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|e| SentinelError::invalid_config(format!("pipe path contains a NUL byte: {e}")))?;
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(unix)]
fn write_ready_signal_blocking(final_path: &Path, body: &[u8]) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = final_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = final_path.with_extension("tmp");
    std::fs::write(&tmp_path, body)?;
    std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o644))?;
    std::fs::rename(&tmp_path, final_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::FileTypeExt;

    #[tokio::test]
    async fn creates_fifo_at_path() {
        let dir = tempfile::tempdir().unwrap();
        let pipe_path = dir.path().join("weights.pipe");
        let signal_path = dir.path().join("ready.json");
        let sink = PipeSink::new(&pipe_path, &signal_path);

        sink.ensure_pipe().await.unwrap();

        let meta = std::fs::symlink_metadata(&pipe_path).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[tokio::test]
    async fn recreating_an_existing_fifo_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let pipe_path = dir.path().join("weights.pipe");
        let signal_path = dir.path().join("ready.json");
        let sink = PipeSink::new(&pipe_path, &signal_path);

        sink.ensure_pipe().await.unwrap();
        sink.ensure_pipe().await.unwrap();

        let meta = std::fs::symlink_metadata(&pipe_path).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[tokio::test]
    async fn replaces_a_regular_file_at_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let pipe_path = dir.path().join("weights.pipe");
        let signal_path = dir.path().join("ready.json");
        std::fs::write(&pipe_path, b"not a pipe").unwrap();

        let sink = PipeSink::new(&pipe_path, &signal_path);
        sink.ensure_pipe().await.unwrap();

        let meta = std::fs::symlink_metadata(&pipe_path).unwrap();
        assert!(meta.file_type().is_fifo());
    }

    #[tokio::test]
    async fn ready_signal_is_valid_json_immediately_after_write() {
        let dir = tempfile::tempdir().unwrap();
        let pipe_path = dir.path().join("weights.pipe");
        let signal_path = dir.path().join("ready.json");
        let sink = PipeSink::new(&pipe_path, &signal_path);

        sink.write_ready_signal("0.1.0").await.unwrap();

        let contents = std::fs::read_to_string(&signal_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["ready"], serde_json::json!(true));
        assert_eq!(parsed["sentinel_version"], serde_json::json!("0.1.0"));
    }

    #[tokio::test]
    async fn open_for_write_is_cancellable_before_a_reader_attaches() {
        let dir = tempfile::tempdir().unwrap();
        let pipe_path = dir.path().join("weights.pipe");
        let signal_path = dir.path().join("ready.json");
        let sink = PipeSink::new(&pipe_path, &signal_path);
        sink.ensure_pipe().await.unwrap();

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        let result = sink.open_for_write(cancel).await;
        assert!(matches!(result, Err(SentinelError::Cancelled)));
    }
}
