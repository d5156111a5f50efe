// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bridge liveness heartbeat scheduling.

use std::time::{Duration, Instant};

/// Minimum spacing between heartbeats.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1000);

/// Decides when a heartbeat must precede the next bridge send.
#[derive(Debug, Default)]
pub struct HeartbeatScheduler {
    last_sent: Option<Instant>,
}

impl HeartbeatScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time of the last heartbeat, if any was sent.
    pub fn last_sent(&self) -> Option<Instant> {
        self.last_sent
    }

    /// Whether a heartbeat is due at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_sent {
            None => true,
            Some(last) => now.saturating_duration_since(last) > HEARTBEAT_INTERVAL,
        }
    }

    /// Check and claim the heartbeat slot: returns `true` and resets the clock
    /// when a heartbeat is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.last_sent = Some(now);
            true
        } else {
            false
        }
    }
}
