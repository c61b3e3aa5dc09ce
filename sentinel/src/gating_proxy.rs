// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Gating Proxy
//!
//! The HTTP reverse proxy in front of the upstream inference runtime.
//! Requests pass through state-gate, billing, and audit before being
//! forwarded; each stage may short-circuit the chain with its own status
//! code.
//!
//! Bodies are read fully into memory so the audit middleware can hash them
//! — an explicit bounded-size assumption for inference requests. True
//! connection-hijack passthrough for protocol upgrades is out of scope
//! for that reason; see `DESIGN.md`.

use std::sync::Arc;
use std::time::Instant;

use axum::body::{to_bytes, Body};
use axum::extract::State as AxumState;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use chrono::Utc;

use sentinel_domain::{sha256_hex, AuditRecord, SentinelError, StateMachine};

use crate::audit_sink::AuditSink;
use crate::billing::Counters;

const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

pub struct GatingProxyState {
    pub state_machine: Arc<StateMachine>,
    pub counters: Arc<Counters>,
    pub audit_sink: Arc<dyn AuditSink>,
    pub upstream_base_url: String,
    pub contract_id: String,
    pub asset_id: String,
    client: reqwest::Client,
}

impl GatingProxyState {
    pub fn new(
        state_machine: Arc<StateMachine>,
        counters: Arc<Counters>,
        audit_sink: Arc<dyn AuditSink>,
        upstream_base_url: impl Into<String>,
        contract_id: impl Into<String>,
        asset_id: impl Into<String>,
    ) -> Self {
        Self {
            state_machine,
            counters,
            audit_sink,
            upstream_base_url: upstream_base_url.into(),
            contract_id: contract_id.into(),
            asset_id: asset_id.into(),
            client: reqwest::Client::new(),
        }
    }
}

/// Requires `state.state_machine.is_ready()` — the startup precondition
/// to refuse to start serving traffic unless Ready. Callers build the
/// router only after reaching Ready.
pub fn router(state: Arc<GatingProxyState>) -> Router {
    Router::new().fallback(handle).with_state(state)
}

async fn handle(AxumState(state): AxumState<Arc<GatingProxyState>>, method: Method, uri: Uri, headers: HeaderMap, body: Body) -> Response {
    // State gate (outermost).
    if state.state_machine.is_suspended() {
        return StatusCode::FORBIDDEN.into_response();
    }
    if !state.state_machine.is_ready() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let start = Instant::now();
    let body_bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    // Billing: count the inbound request before forwarding.
    state.counters.record_request(body_bytes.len() as u64);

    let req_sha256 = if body_bytes.is_empty() {
        sentinel_domain::empty_body_sha256_hex()
    } else {
        sha256_hex(&body_bytes)
    };

    let path = uri.path_and_query().map(|pq| pq.as_str().to_string()).unwrap_or_else(|| uri.path().to_string());
    let response = forward(&state, &method, &path, &headers, body_bytes).await;

    let (status, response, response_body_len) = match response {
        Ok((status, resp, len)) => (status, resp, len),
        Err(_) => (StatusCode::BAD_GATEWAY, StatusCode::BAD_GATEWAY.into_response(), 0),
    };

    let latency_ms = start.elapsed().as_millis() as u64;
    state.counters.record_response(status.as_u16(), response_body_len);

    let record = AuditRecord {
        ts: Utc::now(),
        contract_id: state.contract_id.clone(),
        asset_id: state.asset_id.clone(),
        method: method.to_string(),
        path,
        req_sha256,
        status: status.as_u16(),
        latency_ms,
    };
    let sink = state.audit_sink.clone();
    tokio::spawn(async move {
        if let Err(e) = sink.record(record).await {
            tracing::warn!(error = %e, "audit record write failed");
        }
    });

    response
}

async fn forward(state: &Arc<GatingProxyState>, method: &Method, path: &str, headers: &HeaderMap, body: axum::body::Bytes) -> Result<(StatusCode, Response, u64), SentinelError> {
    let url = format!("{}{}", state.upstream_base_url.trim_end_matches('/'), path);
    let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes()).map_err(|e| SentinelError::internal(format!("invalid method: {e}")))?;

    let mut builder = state.client.request(reqwest_method, &url);
    for (name, value) in headers.iter() {
        if name == axum::http::header::HOST {
            continue;
        }
        builder = builder.header(name.as_str(), value.as_bytes());
    }
    builder = builder.body(body.to_vec());

    let upstream_resp = builder.send().await.map_err(|e| SentinelError::internal(format!("upstream request failed: {e}")))?;
    let status = StatusCode::from_u16(upstream_resp.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream_resp.headers().iter() {
        if let (Ok(n), Ok(v)) = (
            axum::http::HeaderName::from_bytes(name.as_str().as_bytes()),
            axum::http::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            response_headers.append(n, v);
        }
    }

    let upstream_body = upstream_resp.bytes().await.map_err(|e| SentinelError::internal(format!("upstream body read failed: {e}")))?;
    let upstream_body_len = upstream_body.len() as u64;

    let mut response = Response::builder().status(status);
    if let Some(response_headers_mut) = response.headers_mut() {
        *response_headers_mut = response_headers;
    }
    let response = response
        .body(Body::from(upstream_body))
        .map_err(|e| SentinelError::internal(format!("failed building proxied response: {e}")))?;

    Ok((status, response, upstream_body_len))
}
