// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sentinel Core
//!
//! The application and infrastructure layer of the TrustBridge sentinel:
//! everything that touches a file descriptor, a socket, or a clock. Built on
//! top of `sentinel-domain`'s pure types and algorithms.
//!
//! ## Module map
//!
//! - [`pipe_sink`] - named-pipe creation and the atomic ready-signal file.
//! - [`downloader`] - concurrent range-based fetch with retry/backoff.
//! - [`authorizer`] - the Control Plane authorization client.
//! - [`decryptor`] - drives the codec from a ciphertext file into the pipe.
//! - [`billing`] - lock-free usage counters and the periodic reporting agent.
//! - [`audit_sink`] - file, ring-buffer, and no-op audit sinks.
//! - [`gating_proxy`] - the reverse proxy and its middleware chain.
//! - [`health`] - the `/health`, `/readiness`, `/status` probe surface.
//! - [`orchestrator`] - sequences every component through the lifecycle.

pub mod audit_sink;
pub mod authorizer;
pub mod billing;
pub mod decryptor;
pub mod downloader;
pub mod gating_proxy;
pub mod health;
pub mod orchestrator;
pub mod pipe_sink;

pub use orchestrator::{AuditSinkConfig, Orchestrator, OrchestratorConfig};
