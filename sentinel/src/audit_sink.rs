// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Sink
//!
//! Three places an [`AuditRecord`] can land: an append-mode JSON-lines
//! file with writes serialized behind a mutex, a
//! fixed-capacity in-memory ring buffer that overwrites its oldest entry,
//! and a no-op sink for when auditing is disabled.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use sentinel_domain::{AuditRecord, Result, SentinelError};

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<()>;
}

/// Appends one JSON object per line, serializing writes behind a mutex so
/// concurrent handlers never interleave partial lines.
pub struct FileSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        let mut line = serde_json::to_string(&record).map_err(|e| SentinelError::internal(format!("audit record serialization failed: {e}")))?;
        line.push('\n');
        let path = self.path.clone();

        let _guard = self.write_lock.lock().expect("audit file sink mutex poisoned");
        tokio::task::spawn_blocking(move || append_line(&path, &line))
            .await
            .map_err(|e| SentinelError::internal(format!("audit write task panicked: {e}")))?
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Keeps the most recent `capacity` records in memory, overwriting the
/// oldest entry once full.
pub struct RingBufferSink {
    capacity: usize,
    buffer: Mutex<VecDeque<AuditRecord>>,
}

impl RingBufferSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            buffer: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        }
    }

    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.buffer.lock().expect("ring buffer mutex poisoned").iter().cloned().collect()
    }
}

#[async_trait]
impl AuditSink for RingBufferSink {
    async fn record(&self, record: AuditRecord) -> Result<()> {
        let mut buffer = self.buffer.lock().expect("ring buffer mutex poisoned");
        if buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(record);
        Ok(())
    }
}

pub struct NoOpSink;

#[async_trait]
impl AuditSink for NoOpSink {
    async fn record(&self, _record: AuditRecord) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(path: &str) -> AuditRecord {
        AuditRecord {
            ts: Utc::now(),
            contract_id: "contract-1".into(),
            asset_id: "asset-1".into(),
            method: "POST".into(),
            path: path.into(),
            req_sha256: sentinel_domain::empty_body_sha256_hex(),
            status: 200,
            latency_ms: 10,
        }
    }

    #[tokio::test]
    async fn file_sink_appends_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = FileSink::new(&path);

        sink.record(sample("/a")).await.unwrap();
        sink.record(sample("/b")).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(parsed["status"], serde_json::json!(200));
        }
    }

    #[tokio::test]
    async fn ring_buffer_overwrites_oldest_once_full() {
        let sink = RingBufferSink::new(2);
        sink.record(sample("/1")).await.unwrap();
        sink.record(sample("/2")).await.unwrap();
        sink.record(sample("/3")).await.unwrap();

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].path, "/2");
        assert_eq!(snapshot[1].path, "/3");
    }

    #[tokio::test]
    async fn no_op_sink_accepts_every_record() {
        let sink = NoOpSink;
        sink.record(sample("/x")).await.unwrap();
    }
}
