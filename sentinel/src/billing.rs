// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Billing Meter and Agent
//!
//! Lock-free request/byte counters plus a periodic agent
//! that snapshots them and reports usage to the Control Plane. A handful of
//! named billing failures are suspendable; everything else is treated as
//! transient and retried on the next tick.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use sentinel_domain::{Result, SentinelError, UsageSnapshot};

const SUSPENDABLE_REASONS: &[&str] = &[
    "quota exceeded",
    "subscription inactive",
    "billing disabled",
    "resource not found",
    "unauthorized",
];

/// Classifies a Billing Plane failure message against a list of named
/// suspendable reasons. Unrecognized messages are transient and eligible
/// for retry.
pub fn classify_billing_failure(message: &str) -> SentinelError {
    let lower = message.to_lowercase();
    if SUSPENDABLE_REASONS.iter().any(|reason| lower.contains(reason)) {
        SentinelError::BillingSuspendable(message.to_string())
    } else {
        SentinelError::BillingTransient(message.to_string())
    }
}

/// Lock-free usage counters for a single metering period.
pub struct Counters {
    request_count: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    period_start: Mutex<chrono::DateTime<Utc>>,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    pub fn new() -> Self {
        Self {
            request_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            period_start: Mutex::new(Utc::now()),
        }
    }

    pub fn record_request(&self, bytes_in: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(bytes_in, Ordering::Relaxed);
    }

    /// Classifies `status`: 2xx increments success, >=400 increments
    /// error; 1xx/3xx contribute bytes but count toward neither, preserving
    /// the `ErrorCount + SuccessCount <= RequestCount` invariant.
    pub fn record_response(&self, status: u16, bytes_out: u64) {
        if (200..300).contains(&status) {
            self.success_count.fetch_add(1, Ordering::Relaxed);
        } else if status >= 400 {
            self.error_count.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_out.fetch_add(bytes_out, Ordering::Relaxed);
    }

    /// Reads the counters without resetting them.
    pub fn peek(&self) -> UsageSnapshot {
        let period_start = *self.period_start.lock().expect("counters mutex poisoned");
        UsageSnapshot {
            request_count: self.request_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            period_start,
            period_end: Utc::now(),
        }
    }

    /// Reads the counters and resets them to zero, opening a new period
    /// starting at the snapshot's `period_end`.
    pub fn snapshot(&self) -> UsageSnapshot {
        let now = Utc::now();
        let mut period_start = self.period_start.lock().expect("counters mutex poisoned");
        let snapshot = UsageSnapshot {
            request_count: self.request_count.swap(0, Ordering::Relaxed),
            success_count: self.success_count.swap(0, Ordering::Relaxed),
            error_count: self.error_count.swap(0, Ordering::Relaxed),
            bytes_in: self.bytes_in.swap(0, Ordering::Relaxed),
            bytes_out: self.bytes_out.swap(0, Ordering::Relaxed),
            period_start: *period_start,
            period_end: now,
        };
        *period_start = now;
        snapshot
    }
}

/// A single billed usage event, shaped per the metering endpoint's wire
/// contract (not the internal [`UsageSnapshot`] field names).
#[derive(Debug, Clone, serde::Serialize)]
pub struct UsageEvent {
    #[serde(rename = "resourceId")]
    pub resource_id: String,
    pub quantity: f64,
    pub dimension: String,
    #[serde(rename = "effectiveStartTime")]
    pub effective_start_time: chrono::DateTime<Utc>,
    #[serde(rename = "planId", skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
}

impl UsageEvent {
    pub fn from_snapshot(resource_id: &str, dimension: &str, snapshot: &UsageSnapshot, plan_id: Option<String>) -> Self {
        Self {
            resource_id: resource_id.to_string(),
            quantity: snapshot.quantity_for_dimension(dimension),
            dimension: dimension.to_string(),
            effective_start_time: snapshot.period_start,
            plan_id,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct UsageEventResponse {
    status: String,
}

/// Supplies the bearer token for a billing report call, fetched lazily so a
/// short-lived token is never cached past its use.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String>;
}

/// A token source backed by a single configured value. Useful when the
/// Billing Plane is authenticated with a long-lived shared secret rather
/// than a refreshed credential.
pub struct StaticTokenSource(pub String);

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Delivers usage events to the Billing Plane. Implementations classify
/// their own failures into suspendable vs. transient via
/// [`classify_billing_failure`].
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, event: &UsageEvent) -> Result<()>;
}

/// Posts usage events as JSON to a Billing Plane endpoint, fetching a
/// bearer token from `tokens` immediately before each call.
pub struct HttpReporter<T: TokenSource> {
    client: reqwest::Client,
    endpoint: String,
    tokens: T,
}

impl<T: TokenSource> HttpReporter<T> {
    pub fn new(endpoint: impl Into<String>, tokens: T) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            tokens,
        }
    }
}

#[async_trait]
impl<T: TokenSource> Reporter for HttpReporter<T> {
    async fn report(&self, event: &UsageEvent) -> Result<()> {
        let url = format!("{}/api/v1/billing/usage", self.endpoint.trim_end_matches('/'));
        let token = self.tokens.token().await?;
        let resp = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(event)
            .send()
            .await
            .map_err(|e| classify_billing_failure(&e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_billing_failure(&format!("HTTP {status}: {body}")));
        }

        let body: UsageEventResponse = resp
            .json()
            .await
            .map_err(|e| SentinelError::internal(format!("malformed usage response: {e}")))?;
        match body.status.as_str() {
            "Accepted" | "Duplicate" => Ok(()),
            "Expired" => Err(SentinelError::BillingTransient("usage event expired".to_string())),
            other => Err(classify_billing_failure(other)),
        }
    }
}

/// Logs usage events instead of delivering them; used when no Billing Plane
/// endpoint is configured.
pub struct LogOnlyReporter;

#[async_trait]
impl Reporter for LogOnlyReporter {
    async fn report(&self, event: &UsageEvent) -> Result<()> {
        tracing::info!(
            resource_id = %event.resource_id,
            dimension = %event.dimension,
            quantity = event.quantity,
            "usage event (log-only reporter)"
        );
        Ok(())
    }
}

/// Picks between the HTTP-backed and log-only reporters at runtime without
/// forcing `Agent` itself to be generic over every call site's choice.
pub enum AnyReporter {
    Http(HttpReporter<StaticTokenSource>),
    LogOnly(LogOnlyReporter),
}

#[async_trait]
impl Reporter for AnyReporter {
    async fn report(&self, event: &UsageEvent) -> Result<()> {
        match self {
            AnyReporter::Http(r) => r.report(event).await,
            AnyReporter::LogOnly(r) => r.report(event).await,
        }
    }
}

/// Deadline for the on-shutdown final report: shorter than the normal
/// per-tick report so the agent cannot stall process exit.
const FINAL_REPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Drives periodic metering: every tick, snapshots the counters, reports
/// them, and on a suspendable failure invokes `on_suspend` with the reason.
pub struct Agent<R: Reporter> {
    counters: std::sync::Arc<Counters>,
    reporter: R,
    asset_id: String,
    dimension: String,
    plan_id: Option<String>,
    interval: Duration,
}

impl<R: Reporter> Agent<R> {
    pub fn new(counters: std::sync::Arc<Counters>, reporter: R, asset_id: impl Into<String>, dimension: impl Into<String>) -> Self {
        Self {
            counters,
            reporter,
            asset_id: asset_id.into(),
            dimension: dimension.into(),
            plan_id: None,
            interval: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_plan_id(mut self, plan_id: impl Into<String>) -> Self {
        self.plan_id = Some(plan_id.into());
        self
    }

    /// Runs until `cancel` fires, reporting one final snapshot on the way
    /// out so no usage is lost at shutdown.
    pub async fn run(&self, cancel: CancellationToken, mut on_suspend: impl FnMut(String)) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.report_once(&mut on_suspend).await;
                }
                _ = cancel.cancelled() => {
                    if tokio::time::timeout(FINAL_REPORT_TIMEOUT, self.report_once(&mut on_suspend)).await.is_err() {
                        tracing::warn!("final billing report timed out, exiting anyway");
                    }
                    break;
                }
            }
        }
    }

    async fn report_once(&self, on_suspend: &mut impl FnMut(String)) {
        let snapshot = self.counters.snapshot();
        if snapshot.is_empty() {
            return;
        }
        let event = UsageEvent::from_snapshot(&self.asset_id, &self.dimension, &snapshot, self.plan_id.clone());
        if let Err(e) = self.reporter.report(&event).await {
            tracing::warn!(error = %e, "billing report failed");
            if e.is_suspendable() {
                on_suspend(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn quota_exceeded_is_suspendable() {
        let err = classify_billing_failure("quota exceeded for contract");
        assert!(err.is_suspendable());
    }

    #[test]
    fn unrecognized_failure_is_transient() {
        let err = classify_billing_failure("connection reset by peer");
        assert!(!err.is_suspendable());
        assert!(err.is_recoverable());
    }

    #[test]
    fn counters_classify_success_and_error_responses() {
        let counters = Counters::new();
        counters.record_request(100);
        counters.record_response(200, 500);
        counters.record_request(50);
        counters.record_response(500, 0);

        let snapshot = counters.peek();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.success_count, 1);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.bytes_in, 150);
        assert_eq!(snapshot.bytes_out, 500);
    }

    #[test]
    fn record_response_excludes_1xx_and_3xx_from_success_and_error() {
        // ErrorCount + SuccessCount <= RequestCount, with 1xx/3xx excluded from both.
        let counters = Counters::new();
        counters.record_request(10);
        counters.record_response(101, 5);
        counters.record_request(10);
        counters.record_response(304, 5);

        let snapshot = counters.peek();
        assert_eq!(snapshot.request_count, 2);
        assert_eq!(snapshot.success_count, 0);
        assert_eq!(snapshot.error_count, 0);
        assert_eq!(snapshot.bytes_out, 10);
    }

    #[test]
    fn snapshot_resets_counters_to_zero() {
        let counters = Counters::new();
        counters.record_request(10);
        counters.record_response(200, 20);

        let first = counters.snapshot();
        assert_eq!(first.request_count, 1);

        let second = counters.peek();
        assert!(second.is_empty());
    }

    struct FailingReporter;

    #[async_trait]
    impl Reporter for FailingReporter {
        async fn report(&self, _event: &UsageEvent) -> Result<()> {
            Err(classify_billing_failure("subscription inactive"))
        }
    }

    #[tokio::test]
    async fn agent_invokes_on_suspend_for_suspendable_reporter_errors() {
        let counters = Arc::new(Counters::new());
        counters.record_request(1);
        counters.record_response(200, 1);

        let agent = Agent::new(counters, FailingReporter, "asset-1", "requests").with_interval(Duration::from_millis(10));

        let suspended = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let suspended_clone = suspended.clone();
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(25)).await;
            cancel_clone.cancel();
        });

        agent
            .run(cancel, |_reason| {
                suspended_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            })
            .await;

        assert!(suspended.load(std::sync::atomic::Ordering::SeqCst));
    }

    struct SlowReporter;

    #[async_trait]
    impl Reporter for SlowReporter {
        async fn report(&self, _event: &UsageEvent) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn final_report_on_shutdown_is_bounded_by_timeout() {
        let counters = Arc::new(Counters::new());
        counters.record_request(1);
        counters.record_response(200, 1);

        let agent = Agent::new(counters, SlowReporter, "asset-1", "requests").with_interval(Duration::from_secs(3600));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(11), agent.run(cancel, |_reason| {})).await;
        assert!(result.is_ok(), "agent.run() must return once the final report's own timeout elapses");
    }
}
