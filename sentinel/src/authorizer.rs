// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Authorizer
//!
//! The Control Plane authorization client. Retries
//! transient failures with exponential backoff and jitter; denials and
//! malformed responses are terminal and never retried.

use std::time::Duration;

use sentinel_domain::{AuthorizationGrant, AuthorizationOutcome, AuthorizationRequest, AuthorizationResponseBody, Result, SentinelError};
use tokio_util::sync::CancellationToken;

use crate::downloader::{backoff_for_attempt, redact_url};

#[derive(Debug, Clone)]
pub struct AuthorizerConfig {
    pub endpoint: String,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
}

impl AuthorizerConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_retries: 3,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
        }
    }
}

pub struct Authorizer {
    client: reqwest::Client,
    config: AuthorizerConfig,
}

impl Authorizer {
    pub fn new(config: AuthorizerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SentinelError::internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// POSTs `<endpoint>/api/v1/license/authorize` and classifies the
    /// response, retrying transient failures.
    pub async fn authorize(
        &self,
        contract_id: &str,
        asset_id: &str,
        hardware_id: &str,
        attestation: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AuthorizationOutcome> {
        let request = AuthorizationRequest {
            contract_id: contract_id.to_string(),
            asset_id: asset_id.to_string(),
            hw_id: hardware_id.to_string(),
            attestation: attestation.map(str::to_string),
            client_version: format!("trustbridge-sentinel/{}", env!("CARGO_PKG_VERSION")),
        };
        let url = format!("{}/api/v1/license/authorize", self.config.endpoint.trim_end_matches('/'));

        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(SentinelError::Cancelled);
            }
            match self.try_once(&url, &request).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_recoverable() && attempt < self.config.max_retries => {
                    tracing::warn!(attempt, error = %e, "authorization attempt failed transiently, retrying");
                    let delay = backoff_for_attempt(attempt, self.config.initial_backoff, self.config.max_backoff, jitter());
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(SentinelError::Cancelled),
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_once(&self, url: &str, request: &AuthorizationRequest) -> Result<AuthorizationOutcome> {
        let resp = self.client.post(url).json(request).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                SentinelError::AuthorizationTransient(redact_url(&e.to_string()))
            } else {
                SentinelError::AuthorizationTransient(redact_url(&e.to_string()))
            }
        })?;

        let status = resp.status().as_u16();
        match status {
            401 | 403 => {
                let body: serde_json::Value = resp.json().await.unwrap_or(serde_json::Value::Null);
                let reason = body.get("reason").and_then(|v| v.as_str()).map(str::to_string);
                Ok(AuthorizationOutcome::Denied { reason })
            }
            400 => Err(SentinelError::AuthorizationDenied(format!("HTTP 400 from {}", redact_url(url)))),
            429 | 500 | 502 | 503 | 504 => Err(SentinelError::AuthorizationTransient(format!("HTTP {status}"))),
            200 => {
                let body: AuthorizationResponseBody = resp
                    .json()
                    .await
                    .map_err(|e| SentinelError::invalid_format(format!("malformed authorization response: {e}")))?;
                body.classify()
            }
            other => Err(SentinelError::AuthorizationDenied(format!("unexpected HTTP status {other}"))),
        }
    }
}

fn jitter() -> f64 {
    use rand::Rng;
    rand::thread_rng().gen_range(-0.1..=0.1)
}

/// Wraps the grant fields needed by Hydrate, pulled out of
/// [`AuthorizationOutcome::Authorized`] for convenience at call sites.
pub fn grant_or_suspend_reason(outcome: AuthorizationOutcome) -> std::result::Result<AuthorizationGrant, String> {
    match outcome {
        AuthorizationOutcome::Authorized(grant) => Ok(grant),
        AuthorizationOutcome::Denied { reason } => Err(reason.unwrap_or_else(|| "denied".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_or_suspend_reason_unwraps_authorized() {
        let grant = AuthorizationGrant {
            sas_url: "https://x".into(),
            manifest_url: "https://y".into(),
            decryption_key_hex: "a".repeat(64),
            expires_at: chrono::Utc::now(),
        };
        let outcome = AuthorizationOutcome::Authorized(grant.clone());
        assert_eq!(grant_or_suspend_reason(outcome).unwrap(), grant);
    }

    #[test]
    fn grant_or_suspend_reason_surfaces_denial_reason() {
        let outcome = AuthorizationOutcome::Denied {
            reason: Some("subscription_inactive".into()),
        };
        assert_eq!(grant_or_suspend_reason(outcome).unwrap_err(), "subscription_inactive");
    }

    #[test]
    fn authorizer_config_has_sane_defaults() {
        let config = AuthorizerConfig::new("https://control-plane.example.com");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_backoff, Duration::from_secs(2));
        assert_eq!(config.max_backoff, Duration::from_secs(30));
    }
}
