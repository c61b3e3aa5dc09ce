// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Decryption Key Material
//!
//! The 32-byte AES-256 key handed out by the Authorizer. Held in a buffer
//! type that zeroes on drop, forbids `Clone`, and never implements `Debug`
//! with its contents.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, SentinelError};

/// A 32-byte AES-256-GCM key that zeroes itself on drop.
///
/// Deliberately does not implement `Clone` or `Copy`: callers must pass it by
/// reference. Does not implement `Debug`/`Display` so it can never end up in
/// a log line by accident.
#[derive(ZeroizeOnDrop)]
pub struct DecryptionKey {
    bytes: [u8; 32],
}

impl DecryptionKey {
    /// Decodes a 64-character lowercase hex string into a 32-byte key.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let decoded = hex::decode(hex_str).map_err(|e| SentinelError::invalid_config(format!("invalid key hex: {e}")))?;
        Self::from_bytes(decoded)
    }

    /// Takes ownership of raw key bytes; the input `Vec` is zeroized before
    /// this function returns, whether it succeeds or fails.
    pub fn from_bytes(mut raw: Vec<u8>) -> Result<Self> {
        if raw.len() != 32 {
            let len = raw.len();
            raw.zeroize();
            return Err(SentinelError::InvalidKeyLength(len));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw);
        raw.zeroize();
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        assert!(DecryptionKey::from_bytes(vec![0u8; 31]).is_err());
        assert!(DecryptionKey::from_bytes(vec![0u8; 33]).is_err());
    }

    #[test]
    fn accepts_hex_golden_vector() {
        let golden = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
        // 16-hex-char pattern repeated 4 times = 64 chars = 32 bytes.
        assert_eq!(golden.len(), 64);
        let key = DecryptionKey::from_hex(golden).unwrap();
        assert_eq!(key.as_bytes().len(), 32);
        assert_eq!(&key.as_bytes()[0..4], &[0x01, 0x23, 0x45, 0x67]);
    }
}
