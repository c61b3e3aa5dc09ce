// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Authorization Contract
//!
//! Request/response types exchanged with the Control Plane
//! (`POST /api/v1/license/authorize`). Authorization
//! is the sole gate into the `Hydrate` state; a denial is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sent to the Control Plane to authorize a deployment. Field names match
/// the wire JSON exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub contract_id: String,
    pub asset_id: String,
    pub hw_id: String,
    /// Optional TEE attestation evidence, forwarded verbatim. Generating it
    /// is out of scope for this sidecar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<String>,
    pub client_version: String,
}

/// The raw wire shape of the Control Plane's response, before it is
/// classified into [`AuthorizationOutcome`]. `status` drives which of the
/// other fields are meaningful, matching the Control Plane's loosely-typed
/// JSON rather than an internally tagged enum, since the wire format does
/// not nest the variant-specific fields under a payload key.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizationResponseBody {
    pub status: String,
    pub sas_url: Option<String>,
    pub manifest_url: Option<String>,
    pub decryption_key_hex: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

/// The grant returned on a successful authorization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthorizationGrant {
    pub sas_url: String,
    pub manifest_url: String,
    pub decryption_key_hex: String,
    pub expires_at: DateTime<Utc>,
}

/// The classified outcome of one authorization attempt.
#[derive(Debug, Clone)]
pub enum AuthorizationOutcome {
    Authorized(AuthorizationGrant),
    Denied { reason: Option<String> },
}

impl AuthorizationOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, AuthorizationOutcome::Authorized(_))
    }
}

impl AuthorizationResponseBody {
    /// Classifies an HTTP-200 response body into a concrete outcome.
    /// "authorized" requires non-empty `sas_url` and `decryption_key_hex`
    /// and a parseable expiry; missing required fields is an error even on
    /// a nominally-authorized response.
    pub fn classify(self) -> crate::error::Result<AuthorizationOutcome> {
        use crate::error::SentinelError;
        match self.status.as_str() {
            "authorized" => {
                let sas_url = self
                    .sas_url
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| SentinelError::invalid_format("authorized response missing sas_url"))?;
                let manifest_url = self
                    .manifest_url
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| SentinelError::invalid_format("authorized response missing manifest_url"))?;
                let decryption_key_hex = self
                    .decryption_key_hex
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| SentinelError::invalid_format("authorized response missing decryption_key_hex"))?;
                let expires_at = self
                    .expires_at
                    .ok_or_else(|| SentinelError::invalid_format("authorized response missing expires_at"))?;
                Ok(AuthorizationOutcome::Authorized(AuthorizationGrant {
                    sas_url,
                    manifest_url,
                    decryption_key_hex,
                    expires_at,
                }))
            }
            "denied" => Ok(AuthorizationOutcome::Denied { reason: self.reason }),
            other => Err(SentinelError::invalid_format(format!("unrecognized authorization status {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_outcome_is_not_authorized() {
        let outcome = AuthorizationOutcome::Denied {
            reason: Some("subscription_inactive".into()),
        };
        assert!(!outcome.is_authorized());
    }

    #[test]
    fn request_serializes_without_attestation_field_when_absent() {
        let req = AuthorizationRequest {
            contract_id: "c-1".into(),
            asset_id: "a-1".into(),
            hw_id: "fp-1".into(),
            attestation: None,
            client_version: "trustbridge-sentinel/0.1.0".into(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("attestation"));
    }

    #[test]
    fn classifies_well_formed_authorized_response() {
        let body = AuthorizationResponseBody {
            status: "authorized".into(),
            sas_url: Some("https://store.example.com/weights?sig=abc".into()),
            manifest_url: Some("https://store.example.com/manifest.json?sig=abc".into()),
            decryption_key_hex: Some("0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcd".into()),
            expires_at: Some(Utc::now()),
            reason: None,
        };
        let outcome = body.classify().unwrap();
        assert!(outcome.is_authorized());
    }

    #[test]
    fn authorized_status_with_missing_fields_is_an_error() {
        let body = AuthorizationResponseBody {
            status: "authorized".into(),
            sas_url: None,
            manifest_url: Some("https://store.example.com/manifest.json".into()),
            decryption_key_hex: Some("0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcd".into()),
            expires_at: Some(Utc::now()),
            reason: None,
        };
        assert!(body.classify().is_err());
    }

    #[test]
    fn denied_status_carries_through_reason() {
        let body = AuthorizationResponseBody {
            status: "denied".into(),
            sas_url: None,
            manifest_url: None,
            decryption_key_hex: None,
            expires_at: None,
            reason: Some("subscription_inactive".into()),
        };
        let outcome = body.classify().unwrap();
        match outcome {
            AuthorizationOutcome::Denied { reason } => assert_eq!(reason.as_deref(), Some("subscription_inactive")),
            _ => panic!("expected Denied"),
        }
    }

    #[test]
    fn unrecognized_status_is_an_error() {
        let body = AuthorizationResponseBody {
            status: "pending".into(),
            sas_url: None,
            manifest_url: None,
            decryption_key_hex: None,
            expires_at: None,
            reason: None,
        };
        assert!(body.classify().is_err());
    }
}
