// /////////////////////////////////////////////////////////////////////////////
// TrustBridge Sentinel
// Copyright (c) 2025 A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Usage Metrics
//!
//! The billing-period snapshot reported to the metering endpoint. The
//! live, concurrently-updated atomic counters
//! this snapshot is derived from live in `sentinel::billing::Counters`,
//! since atomics are an infrastructure concern; this value object is what
//! crosses the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageSnapshot {
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

impl UsageSnapshot {
    /// Invariant: 1xx/3xx responses are excluded from both success and
    /// error, so their sum may be strictly less than the total.
    pub fn counts_are_consistent(&self) -> bool {
        self.success_count + self.error_count <= self.request_count
    }

    /// Whether this period saw zero traffic, per the skip-empty-reports
    /// rule.
    pub fn is_empty(&self) -> bool {
        self.request_count == 0 && self.bytes_in == 0 && self.bytes_out == 0
    }

    /// Maps a metering `dimension` string to the quantity it reports.
    pub fn quantity_for_dimension(&self, dimension: &str) -> f64 {
        match dimension {
            "bytes" => (self.bytes_in + self.bytes_out) as f64,
            "gb_transferred" => (self.bytes_in + self.bytes_out) as f64 / (1u64 << 30) as f64,
            "requests" => self.request_count as f64,
            _ => self.request_count as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UsageSnapshot {
        UsageSnapshot {
            request_count: 10,
            success_count: 8,
            error_count: 2,
            bytes_in: 1000,
            bytes_out: (1u64 << 30) * 2,
            period_start: Utc::now(),
            period_end: Utc::now(),
        }
    }

    #[test]
    fn consistent_counts_pass_invariant() {
        assert!(sample().counts_are_consistent());
    }

    #[test]
    fn counts_exceeding_total_are_flagged() {
        let mut s = sample();
        s.success_count = 9;
        s.error_count = 9;
        assert!(!s.counts_are_consistent());
    }

    #[test]
    fn empty_snapshot_has_no_traffic() {
        let mut s = sample();
        s.request_count = 0;
        s.bytes_in = 0;
        s.bytes_out = 0;
        assert!(s.is_empty());
    }

    #[test]
    fn dimension_mapping_computes_expected_quantities() {
        let s = sample();
        assert_eq!(s.quantity_for_dimension("requests"), 10.0);
        assert_eq!(s.quantity_for_dimension("bytes"), (s.bytes_in + s.bytes_out) as f64);
        assert_eq!(s.quantity_for_dimension("gb_transferred"), (s.bytes_in + s.bytes_out) as f64 / (1u64 << 30) as f64);
        assert_eq!(s.quantity_for_dimension("unknown"), 10.0);
    }
}
