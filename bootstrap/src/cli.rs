// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Command Line Interface
//!
//! The environment is the source of truth for configuration; the CLI
//! only controls how the process starts up around it -
//! `--config-check` to validate and print the resolved configuration
//! without running, and `-v/--verbose` to raise the log level.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "trustbridge-sentinel", version, about = "Security sidecar for confidential-compute inference VMs")]
pub struct Cli {
    /// Load and validate configuration, print the resolved values, then
    /// exit without starting the sentinel.
    #[arg(long)]
    pub config_check: bool,

    /// Raise the log level by one step per occurrence (info -> debug -> trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Applies `-v`/`-vv` on top of a base log level string.
    pub fn effective_log_level(&self, base: &str) -> String {
        match self.verbose {
            0 => base.to_string(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}
