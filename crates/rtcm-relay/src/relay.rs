// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core relay implementation.
//!
//! The relay turns correction blobs into frames, fans them out to every
//! reachable destination and mirrors them onto the optional bridge.

use crate::bridge::{Bridge, BridgeTransport};
use crate::codec::{self, Frame, SequenceCounter};
use crate::config::RelayConfig;
use crate::destination::{DestinationRegistry, DestinationRouter};
use crate::inbound::InboundRelay;
use crate::mavlink::MavPacket;
use crate::rate::RateMeter;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Notify};

/// Input to the dispatch loop.
#[derive(Debug, Clone)]
pub enum RelayEvent {
    /// A freshly produced correction blob.
    Blob(Vec<u8>),
    /// A packet observed on the primary channel.
    Inbound(MavPacket),
}

/// Relay statistics.
#[derive(Debug)]
pub struct RelayStats {
    /// Blobs accepted from the source.
    pub blobs: AtomicU64,
    /// Blob bytes accepted from the source.
    pub bytes_in: AtomicU64,
    /// Packets delivered to destinations.
    pub frames_sent: AtomicU64,
    /// Destination sends that failed.
    pub send_errors: AtomicU64,
    /// Frames written to the bridge.
    pub bridge_frames: AtomicU64,
    /// Heartbeats written to the bridge.
    pub heartbeats: AtomicU64,
    /// Inbound frames re-emitted.
    pub inbound_relayed: AtomicU64,
    /// Inbound packets ignored.
    pub inbound_ignored: AtomicU64,
    /// Relay creation time.
    pub created: Instant,
}

impl RelayStats {
    pub fn new() -> Self {
        Self {
            blobs: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            send_errors: AtomicU64::new(0),
            bridge_frames: AtomicU64::new(0),
            heartbeats: AtomicU64::new(0),
            inbound_relayed: AtomicU64::new(0),
            inbound_ignored: AtomicU64::new(0),
            created: Instant::now(),
        }
    }

    /// Get snapshot of current stats.
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            blobs: self.blobs.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            bridge_frames: self.bridge_frames.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
            inbound_relayed: self.inbound_relayed.load(Ordering::Relaxed),
            inbound_ignored: self.inbound_ignored.load(Ordering::Relaxed),
            uptime_secs: self.created.elapsed().as_secs(),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of relay statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    pub blobs: u64,
    pub bytes_in: u64,
    pub frames_sent: u64,
    pub send_errors: u64,
    pub bridge_frames: u64,
    pub heartbeats: u64,
    pub inbound_relayed: u64,
    pub inbound_ignored: u64,
    pub uptime_secs: u64,
}

impl RelayStatsSnapshot {
    /// Average correction input rate in bytes per second.
    pub fn bytes_per_second(&self) -> f64 {
        if self.uptime_secs > 0 {
            self.bytes_in as f64 / self.uptime_secs as f64
        } else {
            0.0
        }
    }
}

/// Handle to control a running relay.
#[derive(Clone)]
pub struct RelayHandle {
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    stats: Arc<RelayStats>,
}

impl RelayHandle {
    /// Check if the relay is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Request the relay to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.shutdown.notify_one();
    }

    /// Current statistics.
    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }
}

/// Correction relay.
pub struct RtcmRelay {
    name: String,
    registry: Arc<dyn DestinationRegistry>,
    router: DestinationRouter,
    sequence: SequenceCounter,
    rate: RateMeter,
    bridge: Option<Bridge>,
    listen: bool,
    system_id: u8,
    stats: Arc<RelayStats>,
    running: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl RtcmRelay {
    /// Create a relay. Opens the bridge if one is configured; a bridge that
    /// fails to open is logged and left disabled.
    pub fn new(config: &RelayConfig, registry: Arc<dyn DestinationRegistry>) -> Self {
        let system_id = config.identity.system_id;
        let bridge = config
            .forward
            .bridge_target()
            .and_then(|target| BridgeTransport::open_or_disable(&target))
            .map(|transport| Bridge::new(transport, system_id));

        Self {
            name: config.name.clone(),
            registry,
            router: DestinationRouter::new(system_id, config.identity.component_id),
            sequence: SequenceCounter::new(),
            rate: RateMeter::new(Instant::now()),
            bridge,
            listen: config.listen.enabled,
            system_id,
            stats: Arc::new(RelayStats::new()),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Replace the bridge with an already opened transport.
    pub fn with_bridge(mut self, transport: BridgeTransport) -> Self {
        self.bridge = Some(Bridge::new(transport, self.system_id));
        self
    }

    /// Enable or disable inbound acceptance.
    pub fn with_listen(mut self, enabled: bool) -> Self {
        self.listen = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_bridge(&self) -> bool {
        self.bridge.is_some()
    }

    /// Shared statistics.
    pub fn stats(&self) -> Arc<RelayStats> {
        self.stats.clone()
    }

    /// Control handle.
    pub fn handle(&self) -> RelayHandle {
        RelayHandle {
            running: self.running.clone(),
            shutdown: self.shutdown.clone(),
            stats: self.stats.clone(),
        }
    }

    /// Relay one correction blob.
    pub fn handle_blob(&mut self, blob: &[u8]) {
        self.handle_blob_at(blob, Instant::now());
    }

    /// Relay one correction blob observed at `now`.
    pub fn handle_blob_at(&mut self, blob: &[u8], now: Instant) {
        let frames = codec::encode(blob, self.sequence.advance());

        self.stats.blobs.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_in
            .fetch_add(blob.len() as u64, Ordering::Relaxed);
        self.rate.record(blob.len(), now);

        tracing::trace!("Blob of {} bytes -> {} frame(s)", blob.len(), frames.len());
        self.dispatch_frames(&frames, now);
    }

    /// Relay a packet seen on the primary channel.
    pub fn handle_inbound(&mut self, packet: &MavPacket) {
        self.handle_inbound_at(packet, Instant::now());
    }

    /// Relay a packet seen on the primary channel at `now`.
    ///
    /// Matching frames are re-emitted unchanged. The blob sequence is not
    /// advanced and nothing is metered.
    pub fn handle_inbound_at(&mut self, packet: &MavPacket, now: Instant) {
        if !self.listen {
            return;
        }

        match InboundRelay::accept(packet) {
            Some(frame) => {
                self.stats.inbound_relayed.fetch_add(1, Ordering::Relaxed);
                self.dispatch_frames(std::slice::from_ref(&frame), now);
            }
            None => {
                self.stats.inbound_ignored.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Send frames to every reachable destination, then to the bridge.
    pub fn dispatch_frames(&mut self, frames: &[Frame], now: Instant) {
        let destinations = self.registry.reachable();
        let outcome = self.router.route(frames, &destinations);
        self.stats
            .frames_sent
            .fetch_add(outcome.sent as u64, Ordering::Relaxed);
        self.stats
            .send_errors
            .fetch_add(outcome.failed as u64, Ordering::Relaxed);

        if let Some(bridge) = self.bridge.as_mut() {
            for frame in frames {
                let sent = bridge.forward(frame, now);
                if sent.heartbeat_sent {
                    self.stats.heartbeats.fetch_add(1, Ordering::Relaxed);
                }
                if sent.frame_sent {
                    self.stats.bridge_frames.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Process one event.
    pub fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Blob(blob) => self.handle_blob(&blob),
            RelayEvent::Inbound(packet) => self.handle_inbound(&packet),
        }
    }

    /// Drain `events` until the channel closes or the handle stops the relay.
    pub async fn run(mut self, mut events: mpsc::Receiver<RelayEvent>) {
        self.running.store(true, Ordering::Relaxed);
        tracing::info!(
            "Relay '{}' started (bridge: {}, listen: {})",
            self.name,
            self.bridge
                .as_ref()
                .map(|b| b.description().to_string())
                .unwrap_or_else(|| "none".to_string()),
            self.listen
        );

        let shutdown = self.shutdown.clone();
        while self.running.load(Ordering::Relaxed) {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = shutdown.notified() => break,
            }
        }

        self.running.store(false, Ordering::Relaxed);
        tracing::info!("Relay '{}' stopped", self.name);
    }
}

impl Drop for RtcmRelay {
    fn drop(&mut self) {
        if let Some(bridge) = self.bridge.take() {
            tracing::debug!("Closing RTCM bridge {}", bridge.description());
        }
    }
}
