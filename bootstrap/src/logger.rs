// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Logging Initialization
//!
//! Process-wide `tracing` setup. Every `sentinel-core`/`sentinel-domain`
//! component calls
//! the `tracing` macros directly on its own target, so there is nothing to
//! inject here beyond picking a subscriber and a filter once at startup.

use tracing_subscriber::{fmt, EnvFilter};

/// Output format for the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, for interactive terminals.
    Human,
    /// Newline-delimited JSON, for log aggregation pipelines.
    Json,
}

/// Initializes the global `tracing` subscriber from a level string
/// (`"trace"`, `"debug"`, `"info"`, `"warn"`, `"error"`) and a format.
///
/// Call exactly once, from `main`, before any component logs. A malformed
/// `level` falls back to the `tracing` default filter directive rather than
/// failing startup over a logging misconfiguration.
pub fn init(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt().with_env_filter(filter).with_target(true);

    let result = match format {
        LogFormat::Human => subscriber.try_init(),
        LogFormat::Json => subscriber.json().try_init(),
    };

    if let Err(e) = result {
        eprintln!("failed to initialize tracing subscriber: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_variants_are_distinct() {
        assert_ne!(LogFormat::Human, LogFormat::Json);
    }
}
