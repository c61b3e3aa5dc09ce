// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Hardware Fingerprint Producer
//!
//! Hardware-fingerprint generation is an opaque external collaborator in
//! production - the real thing (a TPM quote, a confidential-compute
//! attestation measurement) belongs to a component outside this repo. What
//! lives here is a best-effort stable identifier: generated once, persisted
//! alongside the target directory, and reused on every subsequent boot so
//! the control plane sees a consistent `hw_id` for a given host.

use std::path::{Path, PathBuf};

use sentinel_domain::{Result, SentinelError};
use uuid::Uuid;

const FILENAME: &str = ".hardware_id";

/// Loads the persisted hardware id under `state_dir`, generating and
/// persisting a new one on first boot.
pub async fn load_or_create(state_dir: &Path) -> Result<String> {
    let path = id_path(state_dir);

    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            let id = contents.trim().to_string();
            if id.is_empty() {
                generate_and_persist(&path).await
            } else {
                Ok(id)
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => generate_and_persist(&path).await,
        Err(e) => Err(SentinelError::from(e)),
    }
}

fn id_path(state_dir: &Path) -> PathBuf {
    state_dir.join(FILENAME)
}

async fn generate_and_persist(path: &Path) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &id).await?;
    tracing::info!(hardware_id = %id, "generated new hardware id");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_boot_generates_and_persists_an_id() {
        let dir = tempfile::tempdir().unwrap();
        let id = load_or_create(dir.path()).await.unwrap();
        assert!(!id.is_empty());
        assert!(dir.path().join(FILENAME).exists());
    }

    #[tokio::test]
    async fn subsequent_boots_reuse_the_persisted_id() {
        let dir = tempfile::tempdir().unwrap();
        let first = load_or_create(dir.path()).await.unwrap();
        let second = load_or_create(dir.path()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn blank_file_is_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::create_dir_all(dir.path()).await.unwrap();
        tokio::fs::write(dir.path().join(FILENAME), "   \n").await.unwrap();
        let id = load_or_create(dir.path()).await.unwrap();
        assert!(!id.is_empty());
    }
}
