// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Orchestrator
//!
//! Drives the lifecycle state machine through
//! `Boot -> Authorize -> Hydrate -> Decrypt -> Ready` and wires every other
//! component's shutdown to a single hierarchical cancellation token.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use sentinel_domain::{DecryptionKey, Manifest, Result, SentinelError, State, StateMachine};

use crate::audit_sink::{AuditSink, FileSink, NoOpSink, RingBufferSink};
use crate::authorizer::{Authorizer, AuthorizerConfig};
use crate::billing::{Agent as BillingAgent, AnyReporter, Counters, HttpReporter, LogOnlyReporter, StaticTokenSource};
use crate::decryptor::{decrypt_to_pipe, DecryptRequest};
use crate::downloader::{Downloader, DownloaderConfig};
use crate::gating_proxy::{self, GatingProxyState};
use crate::health::{self, HealthState};
use crate::pipe_sink::PipeSink;

/// Where audit records land; mirrors [`AuditSink`]'s three variants.
pub enum AuditSinkConfig {
    File(PathBuf),
    RingBuffer(usize),
    Noop,
}

pub struct OrchestratorConfig {
    pub contract_id: String,
    pub asset_id: String,
    pub hardware_id: String,
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
    pub download: DownloaderConfig,
    pub audit_sink: AuditSinkConfig,
    pub billing_interval: Duration,
    pub sentinel_version: String,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    state_machine: Arc<StateMachine>,
    counters: Arc<Counters>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            state_machine: Arc::new(StateMachine::new()),
            counters: Arc::new(Counters::new()),
        }
    }

    pub fn state_machine(&self) -> Arc<StateMachine> {
        self.state_machine.clone()
    }

    /// Runs the full lifecycle: authorize, hydrate, decrypt, then serve
    /// until `cancel` fires. Returns once the proxy, health server, and
    /// billing agent have all wound down.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let grant = self.authorize(&cancel).await?;
        self.state_machine.advance(State::Hydrate, Utc::now())?;

        let manifest = self.hydrate(&grant, &cancel).await?;

        self.state_machine.advance(State::Decrypt, Utc::now())?;
        self.decrypt(&manifest, &grant, &cancel).await?;

        self.state_machine.advance(State::Ready, Utc::now())?;
        tracing::info!(asset_id = %self.config.asset_id, "sentinel is ready");

        self.serve(cancel).await;
        Ok(())
    }

    async fn authorize(&self, cancel: &CancellationToken) -> Result<sentinel_domain::AuthorizationGrant> {
        self.state_machine.advance(State::Authorize, Utc::now())?;

        let authorizer = Authorizer::new(AuthorizerConfig::new(self.config.control_plane_endpoint.clone()))?;
        let outcome = authorizer
            .authorize(&self.config.contract_id, &self.config.asset_id, &self.config.hardware_id, self.config.attestation.as_deref(), cancel)
            .await
            .map_err(|e| {
                if e.is_suspendable() {
                    self.state_machine.suspend(e.to_string(), Utc::now());
                }
                e
            })?;

        match outcome {
            sentinel_domain::AuthorizationOutcome::Authorized(grant) => Ok(grant),
            sentinel_domain::AuthorizationOutcome::Denied { reason } => {
                let reason = reason.unwrap_or_else(|| "authorization denied".to_string());
                self.state_machine.suspend(reason.clone(), Utc::now());
                Err(SentinelError::AuthorizationDenied(reason))
            }
        }
    }

    async fn hydrate(&self, grant: &sentinel_domain::AuthorizationGrant, cancel: &CancellationToken) -> Result<Manifest> {
        tokio::fs::create_dir_all(&self.config.target_dir).await?;

        let manifest = fetch_manifest(&grant.manifest_url).await?;

        let downloader = Downloader::new(self.config.download.clone())?;
        let ciphertext_path = self.config.target_dir.join(&manifest.weights_filename);
        downloader
            .download(&grant.sas_url, &ciphertext_path, &manifest.sha256_ciphertext, cancel.clone())
            .await?;

        Ok(manifest)
    }

    async fn decrypt(&self, manifest: &Manifest, grant: &sentinel_domain::AuthorizationGrant, cancel: &CancellationToken) -> Result<()> {
        let key = DecryptionKey::from_hex(&grant.decryption_key_hex)?;
        let pipe = PipeSink::new(&self.config.pipe_path, &self.config.ready_signal_path);
        pipe.ensure_pipe().await?;
        pipe.write_ready_signal(&self.config.sentinel_version).await?;

        let ciphertext_path = self.config.target_dir.join(&manifest.weights_filename);
        let request = DecryptRequest {
            ciphertext_path: &ciphertext_path,
            key: &key,
            total_plaintext_size: Some(manifest.plaintext_bytes),
            progress: None,
        };
        let outcome = decrypt_to_pipe(&pipe, request, cancel.clone()).await?;
        tracing::info!(bytes_written = outcome.bytes_written, "streaming decryption complete");
        Ok(())
    }

    fn build_audit_sink(&self) -> Arc<dyn AuditSink> {
        match &self.config.audit_sink {
            AuditSinkConfig::File(path) => Arc::new(FileSink::new(path.clone())),
            AuditSinkConfig::RingBuffer(capacity) => Arc::new(RingBufferSink::new(*capacity)),
            AuditSinkConfig::Noop => Arc::new(NoOpSink),
        }
    }

    fn build_reporter(&self) -> AnyReporter {
        match (&self.config.billing_endpoint, &self.config.billing_token) {
            (Some(endpoint), Some(token)) => AnyReporter::Http(HttpReporter::new(endpoint.clone(), StaticTokenSource(token.clone()))),
            _ => AnyReporter::LogOnly(LogOnlyReporter),
        }
    }

    async fn serve(&self, cancel: CancellationToken) {
        let audit_sink = self.build_audit_sink();
        let proxy_state = Arc::new(GatingProxyState::new(
            self.state_machine.clone(),
            self.counters.clone(),
            audit_sink,
            self.config.upstream_base_url.clone(),
            self.config.contract_id.clone(),
            self.config.asset_id.clone(),
        ));
        let proxy_router = gating_proxy::router(proxy_state);

        let health_state = Arc::new(HealthState::new(self.state_machine.clone(), self.config.asset_id.clone()));
        let health_router = health::router(health_state);

        let reporter = self.build_reporter();
        let agent = BillingAgent::new(self.counters.clone(), reporter, self.config.asset_id.clone(), "requests").with_interval(self.config.billing_interval);

        let state_machine = self.state_machine.clone();
        let agent_cancel = cancel.clone();
        let billing_task = tokio::spawn(async move {
            agent
                .run(agent_cancel, |reason| {
                    tracing::warn!(reason = %reason, "billing agent suspending sentinel");
                    state_machine.suspend(reason, Utc::now());
                })
                .await;
        });

        let proxy_cancel = cancel.clone();
        let proxy_addr = self.config.proxy_bind_addr;
        let proxy_task = tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(proxy_addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!(error = %e, "gating proxy failed to bind");
                    return;
                }
            };
            let _ = axum::serve(listener, proxy_router)
                .with_graceful_shutdown(async move { proxy_cancel.cancelled().await })
                .await;
        });

        let health_cancel = cancel.clone();
        let health_addr = self.config.health_bind_addr;
        let health_task = tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(health_addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!(error = %e, "health server failed to bind");
                    return;
                }
            };
            let _ = axum::serve(listener, health_router)
                .with_graceful_shutdown(async move { health_cancel.cancelled().await })
                .await;
        });

        cancel.cancelled().await;
        let _ = tokio::join!(billing_task, proxy_task, health_task);
    }
}

/// Fetches the manifest JSON directly: it is small (max 1 MiB) and carries
/// no whole-file checksum of its own, so it does not need the ranged
/// downloader's retry/integrity machinery.
async fn fetch_manifest(url: &str) -> Result<Manifest> {
    let client = reqwest::Client::new();
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| SentinelError::internal(format!("manifest fetch failed: {e}")))?;
    if !resp.status().is_success() {
        return Err(SentinelError::internal(format!("manifest fetch returned HTTP {}", resp.status())));
    }
    let bytes = resp.bytes().await.map_err(|e| SentinelError::internal(format!("manifest body read failed: {e}")))?;
    Manifest::parse(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(target_dir: PathBuf) -> OrchestratorConfig {
        OrchestratorConfig {
            contract_id: "contract-1".into(),
            asset_id: "asset-1".into(),
            hardware_id: "hw-1".into(),
            attestation: None,
            control_plane_endpoint: "http://127.0.0.1:1".into(),
            billing_endpoint: None,
            billing_token: None,
            target_dir: target_dir.clone(),
            pipe_path: target_dir.join("weights.pipe"),
            ready_signal_path: target_dir.join("ready.json"),
            upstream_base_url: "http://127.0.0.1:2".into(),
            proxy_bind_addr: "127.0.0.1:0".parse().unwrap(),
            health_bind_addr: "127.0.0.1:0".parse().unwrap(),
            download: DownloaderConfig::default(),
            audit_sink: AuditSinkConfig::Noop,
            billing_interval: Duration::from_secs(60),
            sentinel_version: "0.1.0".into(),
        }
    }

    #[tokio::test]
    async fn orchestrator_starts_in_boot_state() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(base_config(dir.path().to_path_buf()));
        assert_eq!(orchestrator.state_machine().current(), State::Boot);
    }

    #[tokio::test]
    async fn unreachable_control_plane_suspends_nothing_but_fails() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(base_config(dir.path().to_path_buf()));
        let cancel = CancellationToken::new();
        let result = orchestrator.run(cancel).await;
        assert!(result.is_err());
        assert_eq!(orchestrator.state_machine().current(), State::Authorize);
    }

    /// A minimal control plane stand-in that always answers 400, to exercise
    /// the terminal-denial path without a real Control Plane.
    async fn spawn_400_control_plane() -> SocketAddr {
        let router = axum::Router::new().route(
            "/api/v1/license/authorize",
            axum::routing::post(|| async { axum::http::StatusCode::BAD_REQUEST }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        addr
    }

    #[tokio::test]
    async fn terminal_denial_from_control_plane_suspends_the_state_machine() {
        let dir = tempfile::tempdir().unwrap();
        let addr = spawn_400_control_plane().await;
        let mut config = base_config(dir.path().to_path_buf());
        config.control_plane_endpoint = format!("http://{addr}");
        let orchestrator = Orchestrator::new(config);

        let cancel = CancellationToken::new();
        let result = orchestrator.run(cancel).await;

        assert!(matches!(result, Err(SentinelError::AuthorizationDenied(_))));
        assert_eq!(orchestrator.state_machine().current(), State::Suspended);
    }
}
