// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Audit Record
//!
//! One append-only record per proxied inference request. Sinks
//! (`sentinel::audit_sink`) decide where records land;
//! this module only defines their shape, which mirrors the wire JSON-lines
//! format field-for-field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// SHA-256 of an empty byte string, used when a request has no body.
pub fn empty_body_sha256_hex() -> String {
    hex::encode(Sha256::digest([]))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub ts: DateTime<Utc>,
    pub contract_id: String,
    pub asset_id: String,
    pub method: String,
    pub path: String,
    pub req_sha256: String,
    pub status: u16,
    pub latency_ms: u64,
}

impl AuditRecord {
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(status: u16) -> AuditRecord {
        AuditRecord {
            ts: Utc::now(),
            contract_id: "contract-1".into(),
            asset_id: "asset-1".into(),
            method: "POST".into(),
            path: "/v1/completions".into(),
            req_sha256: empty_body_sha256_hex(),
            status,
            latency_ms: 42,
        }
    }

    #[test]
    fn classifies_success_and_failure() {
        assert!(sample(200).is_success());
        assert!(sample(399).is_success());
        assert!(!sample(400).is_success());
        assert!(!sample(500).is_success());
    }

    #[test]
    fn empty_body_hash_is_well_known_sha256_of_empty_string() {
        assert_eq!(empty_body_sha256_hex(), "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    }

    #[test]
    fn sha256_hex_is_stable_for_same_input() {
        assert_eq!(sha256_hex(b"hello"), sha256_hex(b"hello"));
        assert_ne!(sha256_hex(b"hello"), sha256_hex(b"world"));
    }
}
