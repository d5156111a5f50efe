// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Correction throughput metering.

use std::time::{Duration, Instant};

/// Reporting interval.
pub const RATE_INTERVAL: Duration = Duration::from_millis(1000);

/// Throughput over one elapsed interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateReport {
    /// Bytes accumulated in the interval.
    pub bytes: u64,
    /// Interval length.
    pub elapsed: Duration,
    /// Throughput in KiB/s.
    pub kib_per_sec: f64,
}

/// Byte counter that reports once more than [`RATE_INTERVAL`] has elapsed.
///
/// Purely observational: nothing in the relay depends on its output.
#[derive(Debug)]
pub struct RateMeter {
    bytes: u64,
    since: Instant,
}

impl RateMeter {
    /// Start metering at `now`.
    pub fn new(now: Instant) -> Self {
        Self { bytes: 0, since: now }
    }

    /// Bytes accumulated in the current interval.
    pub fn pending_bytes(&self) -> u64 {
        self.bytes
    }

    /// Record `bytes` observed at `now`.
    pub fn record(&mut self, bytes: usize, now: Instant) -> Option<RateReport> {
        self.bytes = self.bytes.saturating_add(bytes as u64);

        let elapsed = now.saturating_duration_since(self.since);
        if elapsed <= RATE_INTERVAL {
            return None;
        }

        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let report = RateReport {
            bytes: self.bytes,
            elapsed,
            kib_per_sec: self.bytes as f64 / elapsed_ms * 1000.0 / 1024.0,
        };

        tracing::debug!("RTCM bandwidth: {:.2} KiB/s", report.kib_per_sec);

        self.bytes = 0;
        self.since = now;
        Some(report)
    }
}
