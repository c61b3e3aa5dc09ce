// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Entry point for the `trustbridge-sentinel` binary: parses the CLI,
//! loads configuration from the environment, wires up the orchestrator,
//! and runs it to completion or until a shutdown signal arrives.

use std::process::ExitCode;
use std::time::Duration;

use sentinel_bootstrap::logger::LogFormat;
use sentinel_bootstrap::shutdown::ShutdownCoordinator;
use sentinel_bootstrap::{hardware_id, logger, result_to_exit_code, signals, Cli, SentinelConfig};
use sentinel_core::Orchestrator;
use sentinel_domain::SentinelError;

const SENTINEL_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    let config = match SentinelConfig::load_from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return sentinel_bootstrap::ExitCode::Config.into();
        }
    };

    logger::init(&cli.effective_log_level(&config.log_level), LogFormat::Human);

    if cli.config_check {
        println!("configuration OK:");
        println!("  contract_id:            {}", config.contract_id);
        println!("  asset_id:               {}", config.asset_id);
        println!("  control_plane_endpoint: {}", config.control_plane_endpoint);
        println!("  upstream_base_url:      {}", config.upstream_base_url);
        println!("  proxy_bind_addr:        {}", config.proxy_bind_addr);
        println!("  health_bind_addr:       {}", config.health_bind_addr);
        println!("  target_dir:             {}", config.target_dir.display());
        println!("  download_concurrency:   {}", config.download_concurrency);
        println!("  download_chunk_size:    {}", config.download_chunk_size);
        println!("  billing_endpoint:       {}", config.billing_endpoint.as_deref().unwrap_or("(log-only)"));
        return sentinel_bootstrap::ExitCode::Ok.into();
    }

    let hardware_id = match hardware_id::load_or_create(&config.target_dir).await {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(error = %e, "failed to load or create hardware id");
            return sentinel_bootstrap::ExitCode::Config.into();
        }
    };

    let orchestrator_config = config.into_orchestrator_config(hardware_id, SENTINEL_VERSION.to_string());
    let orchestrator = Orchestrator::new(orchestrator_config);

    let grace_period = Duration::from_secs(shutdown_grace_period_secs());
    let coordinator = ShutdownCoordinator::new(grace_period);
    let signal_task = tokio::spawn(signals::wait_for_signal_and_shut_down(coordinator.clone()));

    let cancel = coordinator.token();
    let run_future = orchestrator.run(cancel.clone());
    tokio::pin!(run_future);

    let result = tokio::select! {
        result = &mut run_future => result,
        _ = cancel.cancelled() => {
            tracing::info!(?grace_period, "shutdown signal received, waiting for the orchestrator to wind down");
            match tokio::time::timeout(grace_period, &mut run_future).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("shutdown grace period expired, forcing exit");
                    Err(SentinelError::Cancelled)
                }
            }
        }
    };

    coordinator.initiate_shutdown();
    coordinator.complete_shutdown();
    let _ = signal_task.await;

    result_to_exit_code(result)
}

fn shutdown_grace_period_secs() -> u64 {
    std::env::var("TRUSTBRIDGE_SHUTDOWN_GRACE_PERIOD_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(sentinel_bootstrap::shutdown::DEFAULT_GRACE_PERIOD_SECS)
}
