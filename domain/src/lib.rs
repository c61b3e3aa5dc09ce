// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sentinel Domain
//!
//! The pure, I/O-free core of the TrustBridge sentinel: the `tbenc/v1` wire
//! codec, the data model exchanged with the Control Plane and billing
//! endpoint, the lifecycle state machine, and the zeroizing key-material
//! wrapper. Nothing in this crate opens a socket, a file, or spawns a task —
//! that is `sentinel-core`'s job. This crate depends on `aes-gcm` and `sha2`
//! directly because the codec and manifest checksum are wire-format
//! algorithms operating on byte buffers, not infrastructure adapters; see
//! `DESIGN.md` for why that differs from a strict "domain has zero crypto
//! dependencies" rule.
//!
//! ## Modules
//!
//! - [`error`] - the flat `SentinelError` taxonomy shared by every layer.
//! - [`key_material`] - the zeroizing, non-`Clone`, non-`Debug` key wrapper.
//! - [`codec`] - `tbenc/v1` header parsing and per-chunk AEAD encrypt/decrypt.
//! - [`manifest`] - the Control-Plane-issued asset descriptor and its
//!   `expected_ciphertext_size` invariant.
//! - [`auth`] - the authorization request/response contract.
//! - [`state`] - the `Boot -> Authorize -> Hydrate -> Decrypt -> Ready`
//!   lifecycle, with `Suspended` reachable from any state.
//! - [`audit`] - one record per proxied request.
//! - [`metrics`] - the usage snapshot reported to billing.

pub mod audit;
pub mod auth;
pub mod codec;
pub mod error;
pub mod key_material;
pub mod manifest;
pub mod metrics;
pub mod state;

pub use audit::{empty_body_sha256_hex, sha256_hex, AuditRecord};
pub use auth::{AuthorizationGrant, AuthorizationOutcome, AuthorizationRequest, AuthorizationResponseBody};
pub use codec::Header as TbencHeader;
pub use error::{Result, SentinelError};
pub use key_material::DecryptionKey;
pub use manifest::{expected_ciphertext_size, Manifest, MAX_MANIFEST_BYTES};
pub use metrics::UsageSnapshot;
pub use state::{State, StateMachine, Transition};
