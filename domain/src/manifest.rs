// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Manifest
//!
//! The authoritative metadata for an encrypted weights artifact, downloaded
//! once during `Hydrate` and immutable thereafter. Field names mirror the
//! wire JSON exactly so (de)serialization needs no renaming layer.

use serde::{Deserialize, Serialize};

use crate::codec::{ALGORITHM_TAG, FORMAT_TAG, HEADER_LEN, MAX_CHUNK_BYTES, TAG_LEN};
use crate::error::{Result, SentinelError};

/// Max bytes of manifest JSON this sidecar will parse.
pub const MAX_MANIFEST_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub format: String,
    pub algo: String,
    pub chunk_bytes: u32,
    pub plaintext_bytes: u64,
    pub sha256_ciphertext: String,
    pub asset_id: String,
    pub weights_filename: String,
}

impl Manifest {
    /// Parses and validates a manifest JSON document, rejecting bodies over
    /// [`MAX_MANIFEST_BYTES`]. Unknown fields are ignored (serde's default).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_MANIFEST_BYTES {
            return Err(SentinelError::invalid_format(format!(
                "manifest body {} bytes exceeds {MAX_MANIFEST_BYTES}-byte limit",
                bytes.len()
            )));
        }
        let manifest: Manifest =
            serde_json::from_slice(bytes).map_err(|e| SentinelError::invalid_format(format!("malformed manifest json: {e}")))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validates the fields themselves, independent of how they were parsed.
    pub fn validate(&self) -> Result<()> {
        if self.format != FORMAT_TAG {
            return Err(SentinelError::invalid_format(format!(
                "manifest format must be {FORMAT_TAG:?}, got {:?}",
                self.format
            )));
        }
        if self.algo != ALGORITHM_TAG {
            return Err(SentinelError::invalid_format(format!(
                "manifest algo must be {ALGORITHM_TAG:?}, got {:?}",
                self.algo
            )));
        }
        if self.asset_id.trim().is_empty() {
            return Err(SentinelError::invalid_format("manifest asset_id is empty"));
        }
        if self.weights_filename.trim().is_empty() {
            return Err(SentinelError::invalid_format("manifest weights_filename is empty"));
        }
        if self.chunk_bytes == 0 || self.chunk_bytes > MAX_CHUNK_BYTES {
            return Err(SentinelError::ChunkSizeOutOfRange(self.chunk_bytes));
        }
        if self.sha256_ciphertext.len() != 64 || !self.sha256_ciphertext.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(SentinelError::invalid_format("manifest sha256_ciphertext must be 64 lowercase hex chars"));
        }
        if self.sha256_ciphertext.to_lowercase() != self.sha256_ciphertext {
            return Err(SentinelError::invalid_format("manifest sha256_ciphertext must be lowercase"));
        }
        Ok(())
    }

    /// The exact on-wire ciphertext size this manifest implies.
    pub fn expected_ciphertext_size(&self) -> u64 {
        expected_ciphertext_size(self.plaintext_bytes, self.chunk_bytes)
    }
}

/// Computes the on-wire ciphertext size for `plaintext_size` bytes of
/// payload chunked at `chunk_bytes`:
///
/// `32 + num_chunks * (4 + 16) + plaintext_size`
///
/// where `num_chunks = ceil(plaintext_size / chunk_bytes)`, and a
/// zero-length payload still produces exactly one (empty) chunk record —
/// except that a zero-length payload is special-cased to a bare 32-byte
/// header with no chunk records at all. Both rules are honored: zero
/// plaintext yields exactly `HEADER_LEN`.
pub fn expected_ciphertext_size(plaintext_size: u64, chunk_bytes: u32) -> u64 {
    if plaintext_size == 0 {
        return HEADER_LEN as u64;
    }
    let chunk_bytes = chunk_bytes as u64;
    let num_chunks = plaintext_size.div_ceil(chunk_bytes);
    HEADER_LEN as u64 + num_chunks * (4 + TAG_LEN as u64) + plaintext_size
}
