// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! A single, flat error enum for the sentinel domain. Each variant names a
//! specific failure mode from the lifecycle (codec, downloader, authorizer,
//! state machine, billing, proxy) so callers can match on `kind()` without
//! string parsing.
//!
//! ## Error Categories
//!
//! - **Codec**: `InvalidFormat`, `UnsupportedVersion`, `UnsupportedAlgorithm`,
//!   `AuthenticationFailed`, `ChunkLengthMismatch`
//! - **Downloader**: `HashMismatch`, `RangeTransient`, `SasExpired`,
//!   `DownloadTerminal`
//! - **Authorizer**: `AuthorizationDenied`, `AuthorizationTransient`
//! - **State machine**: `InvalidTransition`
//! - **Billing**: `BillingSuspendable`, `BillingTransient`
//! - **System**: `Io`, `Cancelled`, `InvalidConfiguration`, `Internal`

use thiserror::Error;

/// Domain-specific errors for the sentinel.
#[derive(Error, Debug, Clone)]
pub enum SentinelError {
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("unsupported tbenc version: {0}")]
    UnsupportedVersion(u16),

    #[error("unsupported algorithm tag: {0}")]
    UnsupportedAlgorithm(u8),

    #[error("chunk size {0} out of range [1, 67108864]")]
    ChunkSizeOutOfRange(u32),

    #[error("AEAD authentication failed at chunk {chunk_index}")]
    AuthenticationFailed { chunk_index: u64 },

    #[error("chunk {chunk_index}: plaintext length {declared} disagrees with decrypted size {actual}")]
    ChunkLengthMismatch {
        chunk_index: u64,
        declared: u32,
        actual: usize,
    },

    #[error("key material must be exactly 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("range transport transient error: {0}")]
    RangeTransient(String),

    #[error("SAS credential expired: {0}")]
    SasExpired(String),

    #[error("download failed terminally: {0}")]
    DownloadTerminal(String),

    #[error("authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("authorization transient error: {0}")]
    AuthorizationTransient(String),

    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: String, to: String },

    #[error("billing error requires suspension: {0}")]
    BillingSuspendable(String),

    #[error("billing transient error: {0}")]
    BillingTransient(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl SentinelError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Whether a caller may retry this error after backing off.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SentinelError::RangeTransient(_) | SentinelError::AuthorizationTransient(_) | SentinelError::BillingTransient(_)
        )
    }

    /// Whether this error should drive the state machine to `Suspended`.
    pub fn is_suspendable(&self) -> bool {
        matches!(
            self,
            SentinelError::AuthorizationDenied(_) | SentinelError::BillingSuspendable(_)
        )
    }
}

impl From<std::io::Error> for SentinelError {
    fn from(e: std::io::Error) -> Self {
        SentinelError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SentinelError>;
