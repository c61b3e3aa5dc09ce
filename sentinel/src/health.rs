// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Health Probe Surface
//!
//! `/health`, `/readiness`, `/status`. Served on its own
//! listener, separate from the gating proxy, so orchestrator health checks
//! keep working even while the proxy itself refuses traffic.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State as AxumState;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use serde::Serialize;

use sentinel_domain::{State, StateMachine};

pub struct HealthState {
    pub state_machine: Arc<StateMachine>,
    pub asset_id: String,
    pub start_time: DateTime<Utc>,
    started_at: Instant,
}

impl HealthState {
    pub fn new(state_machine: Arc<StateMachine>, asset_id: impl Into<String>) -> Self {
        Self {
            state_machine,
            asset_id: asset_id.into(),
            start_time: Utc::now(),
            started_at: Instant::now(),
        }
    }
}

#[derive(Serialize)]
struct StatusBody {
    state: String,
    asset_id: String,
    uptime: String,
    uptime_ms: u128,
    start_time: DateTime<Utc>,
    ready: bool,
    suspended: bool,
}

pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health).fallback(method_not_allowed))
        .route("/readiness", get(readiness).fallback(method_not_allowed))
        .route("/status", get(status).fallback(method_not_allowed))
        .with_state(state)
}

async fn method_not_allowed(method: Method) -> Response {
    let _ = method;
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

async fn health(AxumState(state): AxumState<Arc<HealthState>>) -> StatusCode {
    if state.state_machine.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn readiness(AxumState(state): AxumState<Arc<HealthState>>) -> StatusCode {
    if state.state_machine.is_at_least(State::Decrypt) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn status(AxumState(state): AxumState<Arc<HealthState>>) -> axum::Json<StatusBody> {
    let current = state.state_machine.current();
    let uptime = state.started_at.elapsed();
    axum::Json(StatusBody {
        state: format!("{current:?}"),
        asset_id: state.asset_id.clone(),
        uptime: format!("{}s", uptime.as_secs()),
        uptime_ms: uptime.as_millis(),
        start_time: state.start_time,
        ready: state.state_machine.is_ready(),
        suspended: state.state_machine.is_suspended(),
    })
}
