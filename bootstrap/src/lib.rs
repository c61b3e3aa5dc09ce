// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Sentinel Bootstrap
//!
//! The composition root for the `trustbridge-sentinel` binary. Sits outside
//! the domain/application layers (`sentinel-domain`, `sentinel-core`) and
//! owns everything those layers are deliberately ignorant of:
//!
//! - **CLI** ([`cli`]) - `--config-check`, `-v/--verbose`.
//! - **Configuration** ([`config`]) - environment-variable loading and
//!   validation into an `OrchestratorConfig`.
//! - **Logging** ([`logger`]) - process-wide `tracing` subscriber setup.
//! - **Hardware fingerprint** ([`hardware_id`]) - the stable per-host id
//!   stand-in for a real attestation measurement.
//! - **Signal handling** ([`signals`]) - SIGTERM/SIGINT/SIGHUP.
//! - **Shutdown coordination** ([`shutdown`]) - grace-period-bounded
//!   cancellation shared by every spawned task.
//! - **Exit codes** ([`exit_code`]) - `sysexits.h`-style process exit codes.
//!
//! This crate targets Unix only: the pipe sink is a POSIX named pipe and
//! signal handling uses `tokio::signal::unix`, so there is no platform
//! abstraction layer to pick between POSIX and Windows backends.

pub mod cli;
pub mod config;
pub mod exit_code;
pub mod hardware_id;
pub mod logger;
pub mod shutdown;
pub mod signals;

pub use cli::Cli;
pub use config::{ConfigError, SentinelConfig};
pub use exit_code::{map_error_to_exit_code, result_to_exit_code, ExitCode};
pub use shutdown::ShutdownCoordinator;
