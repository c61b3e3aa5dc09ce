// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Signal Handling
//!
//! Listens for SIGTERM, SIGINT, and SIGHUP and drives the
//! [`crate::shutdown::ShutdownCoordinator`] from whichever arrives first.
//! Unix-only; there is no Windows target for this binary.

use tokio::signal::unix::{signal, SignalKind};

use crate::shutdown::ShutdownCoordinator;

/// Waits for the first of SIGTERM, SIGINT, or SIGHUP and initiates shutdown.
///
/// Runs until a signal arrives or the coordinator's token is already
/// cancelled by some other path (e.g. a fatal orchestrator error), so it can
/// be spawned alongside the main run loop without leaking a task.
pub async fn wait_for_signal_and_shut_down(coordinator: ShutdownCoordinator) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGINT handler");
            return;
        }
    };
    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to install SIGHUP handler");
            return;
        }
    };

    let token = coordinator.token();
    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
        _ = sighup.recv() => tracing::info!("received SIGHUP"),
        _ = token.cancelled() => return,
    }

    coordinator.initiate_shutdown();
}
