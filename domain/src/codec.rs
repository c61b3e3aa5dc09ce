// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # tbenc/v1 Codec
//!
//! Parses the `tbenc/v1` header and decrypts individual chunk records. This
//! module is pure: it operates entirely on in-memory byte slices and never
//! touches a file descriptor or a pipe. The streaming orchestration that
//! drives this codec chunk-by-chunk from a file into a named pipe lives in
//! `sentinel::decryptor`.
//!
//! ## Wire format
//!
//! ```text
//! Header (32 bytes):
//!   magic[8] = "TBENC001"
//!   version[2] (BE) = 1
//!   algorithm[1] = 1
//!   chunk_bytes[4] (BE)
//!   nonce_prefix[4]
//!   reserved[13]
//!
//! Chunk record (variable):
//!   pt_len[4] (BE)
//!   ciphertext_with_tag[pt_len + 16]
//! ```

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::{AeadInPlace, Aes256Gcm, KeyInit};

use crate::error::{Result, SentinelError};
use crate::key_material::DecryptionKey;

pub const MAGIC: &[u8; 8] = b"TBENC001";
pub const HEADER_LEN: usize = 32;
pub const VERSION: u16 = 1;

/// The manifest JSON `format` tag — distinct from the binary header's
/// 1-byte `algorithm` tag below.
pub const FORMAT_TAG: &str = "tbenc/v1";
/// The manifest JSON `algo` tag.
pub const ALGORITHM_TAG: &str = "aes-256-gcm-chunked";
pub const ALGORITHM: u8 = 1;
pub const MAX_CHUNK_BYTES: u32 = 64 * 1024 * 1024;
pub const TAG_LEN: usize = 16;
pub const LEN_PREFIX_LEN: usize = 4;

/// The immutable `tbenc/v1` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub algorithm: u8,
    pub chunk_bytes: u32,
    pub nonce_prefix: [u8; 4],
}

impl Header {
    /// Parses a 32-byte header buffer. Reserved bytes are present but not
    /// validated.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() != HEADER_LEN {
            return Err(SentinelError::invalid_format(format!(
                "header must be {HEADER_LEN} bytes, got {}",
                buf.len()
            )));
        }
        if &buf[0..8] != MAGIC {
            return Err(SentinelError::invalid_format("bad magic"));
        }
        let version = u16::from_be_bytes([buf[8], buf[9]]);
        if version != VERSION {
            return Err(SentinelError::UnsupportedVersion(version));
        }
        let algorithm = buf[10];
        if algorithm != ALGORITHM {
            return Err(SentinelError::UnsupportedAlgorithm(algorithm));
        }
        let chunk_bytes = u32::from_be_bytes([buf[11], buf[12], buf[13], buf[14]]);
        if chunk_bytes == 0 || chunk_bytes > MAX_CHUNK_BYTES {
            return Err(SentinelError::ChunkSizeOutOfRange(chunk_bytes));
        }
        let mut nonce_prefix = [0u8; 4];
        nonce_prefix.copy_from_slice(&buf[15..19]);
        // buf[19..32] is the 13-byte reserved tail; intentionally unread.
        Ok(Header {
            version,
            algorithm,
            chunk_bytes,
            nonce_prefix,
        })
    }

    /// Serializes the header back to its 32-byte wire form (reserved bytes
    /// zeroed). Used by tests and by any future encoder.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..8].copy_from_slice(MAGIC);
        out[8..10].copy_from_slice(&self.version.to_be_bytes());
        out[10] = self.algorithm;
        out[11..15].copy_from_slice(&self.chunk_bytes.to_be_bytes());
        out[15..19].copy_from_slice(&self.nonce_prefix);
        out
    }
}

/// Builds the 12-byte AEAD nonce for a chunk: 4-byte prefix || 8-byte BE index.
pub fn build_nonce(nonce_prefix: [u8; 4], chunk_index: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[0..4].copy_from_slice(&nonce_prefix);
    nonce[4..12].copy_from_slice(&chunk_index.to_be_bytes());
    nonce
}

/// Builds the AAD covering the header's immutable fields plus the per-chunk
/// `(chunk_index, pt_len)`, rebuilt deterministically so no AAD is ever
/// stored on the wire.
pub fn build_aad(header: &Header, chunk_index: u64, pt_len: u32) -> Vec<u8> {
    let mut aad = Vec::with_capacity(8 + 2 + 1 + 4 + 4 + 8 + 4);
    aad.extend_from_slice(MAGIC);
    aad.extend_from_slice(&header.version.to_be_bytes());
    aad.push(header.algorithm);
    aad.extend_from_slice(&header.chunk_bytes.to_be_bytes());
    aad.extend_from_slice(&header.nonce_prefix);
    aad.extend_from_slice(&chunk_index.to_be_bytes());
    aad.extend_from_slice(&pt_len.to_be_bytes());
    aad
}

/// Decrypts one chunk's ciphertext-with-tag in place, returning the
/// plaintext. `ciphertext_with_tag` must be exactly `pt_len + 16` bytes.
pub fn decrypt_chunk(
    key: &DecryptionKey,
    header: &Header,
    chunk_index: u64,
    pt_len: u32,
    ciphertext_with_tag: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext_with_tag.len() != pt_len as usize + TAG_LEN {
        return Err(SentinelError::invalid_format(format!(
            "chunk {chunk_index}: expected {} ciphertext+tag bytes, got {}",
            pt_len as usize + TAG_LEN,
            ciphertext_with_tag.len()
        )));
    }

    let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = build_nonce(header.nonce_prefix, chunk_index);
    let aad = build_aad(header, chunk_index, pt_len);

    let mut buffer = ciphertext_with_tag.to_vec();
    cipher
        .decrypt_in_place(GenericArray::from_slice(&nonce), &aad, &mut buffer)
        .map_err(|_| SentinelError::AuthenticationFailed { chunk_index })?;

    if buffer.len() != pt_len as usize {
        let actual = buffer.len();
        return Err(SentinelError::ChunkLengthMismatch {
            chunk_index,
            declared: pt_len,
            actual,
        });
    }
    Ok(buffer)
}

/// Encrypts one chunk of plaintext, producing `ciphertext || tag`. Exists so
/// the codec is round-trippable in tests against golden vectors; production
/// encryption happens upstream of this sidecar.
pub fn encrypt_chunk(key: &DecryptionKey, header: &Header, chunk_index: u64, plaintext: &[u8]) -> Result<Vec<u8>> {
    if plaintext.is_empty() || plaintext.len() as u64 > header.chunk_bytes as u64 {
        return Err(SentinelError::invalid_format(format!(
            "chunk {chunk_index}: plaintext length {} out of bounds for chunk_bytes {}",
            plaintext.len(),
            header.chunk_bytes
        )));
    }
    let cipher = Aes256Gcm::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = build_nonce(header.nonce_prefix, chunk_index);
    let aad = build_aad(header, chunk_index, plaintext.len() as u32);

    let mut buffer = plaintext.to_vec();
    cipher
        .encrypt_in_place(GenericArray::from_slice(&nonce), &aad, &mut buffer)
        .map_err(|e| SentinelError::internal(format!("encryption failed: {e:?}")))?;
    Ok(buffer)
}

/// Reads and decrypts one chunk record from an in-memory cursor: a 4-byte
/// BE length prefix followed by `len + 16` ciphertext-with-tag bytes.
/// Returns `Ok(None)` on a clean EOF exactly at a record boundary.
pub fn read_chunk_record(cursor: &mut std::io::Cursor<&[u8]>, header: &Header) -> Result<Option<(u64, Vec<u8>)>> {
    use std::io::Read;

    let mut len_buf = [0u8; LEN_PREFIX_LEN];
    match cursor.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let pt_len = u32::from_be_bytes(len_buf);
    if pt_len == 0 || pt_len > header.chunk_bytes {
        return Err(SentinelError::invalid_format(format!(
            "chunk record declares pt_len {pt_len}, chunk_bytes is {}",
            header.chunk_bytes
        )));
    }
    let mut body = vec![0u8; pt_len as usize + TAG_LEN];
    cursor.read_exact(&mut body)?;
    Ok(Some((pt_len as u64, body)))
}
