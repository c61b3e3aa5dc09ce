// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Configuration Loading
//!
//! Loads and validates the sentinel's configuration from the process
//! environment. Every variable is read under a `TRUSTBRIDGE_` prefix;
//! paths must be absolute and URLs must carry an `http`/`https` scheme
//! with a non-empty host.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use sentinel_core::downloader::{DownloaderConfig, MAX_CHUNK_SIZE, MAX_CONCURRENCY, MIN_CHUNK_SIZE, MIN_CONCURRENCY};
use sentinel_core::orchestrator::{AuditSinkConfig, OrchestratorConfig};

/// Defaults applied when the corresponding `TRUSTBRIDGE_*` variable is unset.
mod defaults {
    pub const PROXY_BIND_ADDR: &str = "0.0.0.0:8443";
    pub const HEALTH_BIND_ADDR: &str = "0.0.0.0:8080";
    pub const DOWNLOAD_CONCURRENCY: usize = 4;
    pub const DOWNLOAD_CHUNK_SIZE: u64 = 8 * 1024 * 1024;
    pub const BILLING_INTERVAL_SECS: u64 = 60;
    pub const LOG_LEVEL: &str = "info";
}

/// A config-loading failure. Kept distinct from [`sentinel_domain::SentinelError`]
/// so a missing/malformed variable can name itself precisely before the
/// domain/application layers ever start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{var} must be an absolute path, got {value:?}")]
    PathNotAbsolute { var: &'static str, value: String },
    #[error("{var} must be an http(s) URL with a non-empty host, got {value:?}")]
    InvalidUrl { var: &'static str, value: String },
    #[error("{var} could not be parsed as a socket address: {source}")]
    InvalidSocketAddr {
        var: &'static str,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("{var} could not be parsed as an integer: {source}")]
    InvalidInt {
        var: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// The fully-loaded, validated configuration for one sentinel process.
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    pub contract_id: String,
    pub asset_id: String,
    pub attestation: Option<String>,
    pub control_plane_endpoint: String,
    pub billing_endpoint: Option<String>,
    pub billing_token: Option<String>,
    pub target_dir: PathBuf,
    pub pipe_path: PathBuf,
    pub ready_signal_path: PathBuf,
    pub upstream_base_url: String,
    pub proxy_bind_addr: SocketAddr,
    pub health_bind_addr: SocketAddr,
    pub download_concurrency: usize,
    pub download_chunk_size: u64,
    pub billing_interval: Duration,
    pub audit_log_path: Option<PathBuf>,
    pub log_level: String,
}

impl SentinelConfig {
    /// Reads and validates every variable from the process environment.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let contract_id = require("TRUSTBRIDGE_CONTRACT_ID")?;
        let asset_id = require("TRUSTBRIDGE_ASSET_ID")?;
        let attestation = optional("TRUSTBRIDGE_ATTESTATION");

        let control_plane_endpoint = require_url("TRUSTBRIDGE_CONTROL_PLANE_ENDPOINT")?;
        let billing_endpoint = optional_url("TRUSTBRIDGE_BILLING_ENDPOINT")?;
        let billing_token = optional("TRUSTBRIDGE_BILLING_TOKEN");

        let target_dir = require_absolute_path("TRUSTBRIDGE_TARGET_DIR")?;
        let pipe_path = require_absolute_path("TRUSTBRIDGE_PIPE_PATH")?;
        let ready_signal_path = require_absolute_path("TRUSTBRIDGE_READY_SIGNAL_PATH")?;
        let audit_log_path = optional("TRUSTBRIDGE_AUDIT_LOG_PATH").map(PathBuf::from);

        let upstream_base_url = require_url("TRUSTBRIDGE_UPSTREAM_URL")?;

        let proxy_bind_addr = parse_socket_addr("TRUSTBRIDGE_BIND_ADDR", defaults::PROXY_BIND_ADDR)?;
        let health_bind_addr = parse_socket_addr("TRUSTBRIDGE_HEALTH_BIND_ADDR", defaults::HEALTH_BIND_ADDR)?;

        let download_concurrency = parse_usize("TRUSTBRIDGE_DOWNLOAD_CONCURRENCY", defaults::DOWNLOAD_CONCURRENCY)?
            .clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        let download_chunk_size = parse_u64("TRUSTBRIDGE_DOWNLOAD_CHUNK_SIZE", defaults::DOWNLOAD_CHUNK_SIZE)?
            .clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        let billing_interval_secs = parse_u64("TRUSTBRIDGE_BILLING_INTERVAL_SECS", defaults::BILLING_INTERVAL_SECS)?;

        let log_level = env::var("TRUSTBRIDGE_LOG_LEVEL").unwrap_or_else(|_| defaults::LOG_LEVEL.to_string());

        Ok(Self {
            contract_id,
            asset_id,
            attestation,
            control_plane_endpoint,
            billing_endpoint,
            billing_token,
            target_dir,
            pipe_path,
            ready_signal_path,
            upstream_base_url,
            proxy_bind_addr,
            health_bind_addr,
            download_concurrency,
            download_chunk_size,
            billing_interval: Duration::from_secs(billing_interval_secs),
            audit_log_path,
            log_level,
        })
    }

    /// Builds the `sentinel-core` orchestrator configuration. `hardware_id`
    /// and `sentinel_version` are supplied separately since they are not
    /// environment-sourced (`hardware_id` is generated/persisted by
    /// [`crate::hardware_id`]; the version comes from `CARGO_PKG_VERSION`).
    pub fn into_orchestrator_config(self, hardware_id: String, sentinel_version: String) -> OrchestratorConfig {
        let audit_sink = match self.audit_log_path {
            Some(path) => AuditSinkConfig::File(path),
            None => AuditSinkConfig::RingBuffer(1024),
        };

        OrchestratorConfig {
            contract_id: self.contract_id,
            asset_id: self.asset_id,
            hardware_id,
            attestation: self.attestation,
            control_plane_endpoint: self.control_plane_endpoint,
            billing_endpoint: self.billing_endpoint,
            billing_token: self.billing_token,
            target_dir: self.target_dir,
            pipe_path: self.pipe_path,
            ready_signal_path: self.ready_signal_path,
            upstream_base_url: self.upstream_base_url,
            proxy_bind_addr: self.proxy_bind_addr,
            health_bind_addr: self.health_bind_addr,
            download: DownloaderConfig {
                concurrency: self.download_concurrency,
                chunk_size: self.download_chunk_size,
                ..DownloaderConfig::default()
            },
            audit_sink,
            billing_interval: self.billing_interval,
            sentinel_version,
        }
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::Missing(var))
}

fn optional(var: &'static str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

fn require_absolute_path(var: &'static str) -> Result<PathBuf, ConfigError> {
    let value = require(var)?;
    let path = PathBuf::from(&value);
    if !path.is_absolute() {
        return Err(ConfigError::PathNotAbsolute { var, value });
    }
    Ok(path)
}

fn is_valid_http_url(value: &str) -> bool {
    let rest = value.strip_prefix("https://").or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or("");
            !host.is_empty()
        }
        None => false,
    }
}

fn require_url(var: &'static str) -> Result<String, ConfigError> {
    let value = require(var)?;
    if !is_valid_http_url(&value) {
        return Err(ConfigError::InvalidUrl { var, value });
    }
    Ok(value)
}

fn optional_url(var: &'static str) -> Result<Option<String>, ConfigError> {
    match optional(var) {
        Some(value) if is_valid_http_url(&value) => Ok(Some(value)),
        Some(value) => Err(ConfigError::InvalidUrl { var, value }),
        None => Ok(None),
    }
}

fn parse_socket_addr(var: &'static str, default: &str) -> Result<SocketAddr, ConfigError> {
    let value = env::var(var).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|source| ConfigError::InvalidSocketAddr { var, source })
}

fn parse_usize(var: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(var) {
        Ok(value) => value.parse().map_err(|source| ConfigError::InvalidInt { var, source }),
        Err(_) => Ok(default),
    }
}

fn parse_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(value) => value.parse().map_err(|source| ConfigError::InvalidInt { var, source }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; tests that touch them must
    // not run concurrently with each other.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for var in [
            "TRUSTBRIDGE_CONTRACT_ID",
            "TRUSTBRIDGE_ASSET_ID",
            "TRUSTBRIDGE_ATTESTATION",
            "TRUSTBRIDGE_CONTROL_PLANE_ENDPOINT",
            "TRUSTBRIDGE_BILLING_ENDPOINT",
            "TRUSTBRIDGE_BILLING_TOKEN",
            "TRUSTBRIDGE_TARGET_DIR",
            "TRUSTBRIDGE_PIPE_PATH",
            "TRUSTBRIDGE_READY_SIGNAL_PATH",
            "TRUSTBRIDGE_AUDIT_LOG_PATH",
            "TRUSTBRIDGE_UPSTREAM_URL",
            "TRUSTBRIDGE_BIND_ADDR",
            "TRUSTBRIDGE_HEALTH_BIND_ADDR",
            "TRUSTBRIDGE_DOWNLOAD_CONCURRENCY",
            "TRUSTBRIDGE_DOWNLOAD_CHUNK_SIZE",
            "TRUSTBRIDGE_BILLING_INTERVAL_SECS",
            "TRUSTBRIDGE_LOG_LEVEL",
        ] {
            env::remove_var(var);
        }
    }

    fn set_minimal_valid_env() {
        env::set_var("TRUSTBRIDGE_CONTRACT_ID", "contract-1");
        env::set_var("TRUSTBRIDGE_ASSET_ID", "asset-1");
        env::set_var("TRUSTBRIDGE_CONTROL_PLANE_ENDPOINT", "https://control-plane.example.com");
        env::set_var("TRUSTBRIDGE_TARGET_DIR", "/var/lib/trustbridge/target");
        env::set_var("TRUSTBRIDGE_PIPE_PATH", "/var/lib/trustbridge/weights.pipe");
        env::set_var("TRUSTBRIDGE_READY_SIGNAL_PATH", "/var/lib/trustbridge/ready.json");
        env::set_var("TRUSTBRIDGE_UPSTREAM_URL", "http://127.0.0.1:9000");
    }

    #[test]
    fn loads_minimal_valid_configuration() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        set_minimal_valid_env();

        let config = SentinelConfig::load_from_env().unwrap();
        assert_eq!(config.contract_id, "contract-1");
        assert_eq!(config.download_concurrency, defaults::DOWNLOAD_CONCURRENCY);
        assert!(config.billing_endpoint.is_none());
        clear_env();
    }

    #[test]
    fn missing_required_variable_is_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let err = SentinelConfig::load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TRUSTBRIDGE_CONTRACT_ID")));
        clear_env();
    }

    #[test]
    fn relative_path_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        set_minimal_valid_env();
        env::set_var("TRUSTBRIDGE_TARGET_DIR", "relative/path");

        let err = SentinelConfig::load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::PathNotAbsolute { var: "TRUSTBRIDGE_TARGET_DIR", .. }));
        clear_env();
    }

    #[test]
    fn url_without_scheme_is_rejected() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        set_minimal_valid_env();
        env::set_var("TRUSTBRIDGE_CONTROL_PLANE_ENDPOINT", "control-plane.example.com");

        let err = SentinelConfig::load_from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl { var: "TRUSTBRIDGE_CONTROL_PLANE_ENDPOINT", .. }));
        clear_env();
    }

    #[test]
    fn download_concurrency_is_clamped_into_range() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        set_minimal_valid_env();
        env::set_var("TRUSTBRIDGE_DOWNLOAD_CONCURRENCY", "9999");

        let config = SentinelConfig::load_from_env().unwrap();
        assert_eq!(config.download_concurrency, MAX_CONCURRENCY);
        clear_env();
    }
}
