// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Destination registry and fan-out routing.
//!
//! The router owns no destinations: each cycle it is handed the registry's
//! current snapshot, so membership may change freely between calls.

use crate::codec::Frame;
use crate::link::Link;
use crate::mavlink::MavPacket;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// One reachable receiving device.
#[derive(Clone)]
pub struct Destination {
    /// Display name (unique within a registry).
    pub name: String,
    /// MAVLink channel identity; owns its own packet sequence.
    pub channel: u8,
    link: Arc<dyn Link>,
}

impl Destination {
    pub fn new(name: impl Into<String>, channel: u8, link: Arc<dyn Link>) -> Self {
        Self {
            name: name.into(),
            channel,
            link,
        }
    }

    /// Transmit over this destination's link.
    pub fn send(&self, packet: &[u8]) -> std::io::Result<usize> {
        self.link.send(packet)
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("peer", &self.link.peer())
            .finish()
    }
}

/// Source of the currently reachable destinations.
pub trait DestinationRegistry: Send + Sync {
    /// Snapshot of reachable destinations, in transmission order.
    fn reachable(&self) -> Vec<Destination>;
}

/// Mutable in-memory registry.
#[derive(Debug, Default)]
pub struct SharedRegistry {
    destinations: RwLock<Vec<Destination>>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a destination, replacing any with the same name.
    pub fn insert(&self, destination: Destination) {
        let mut list = self.destinations.write();
        if let Some(existing) = list.iter_mut().find(|d| d.name == destination.name) {
            *existing = destination;
        } else {
            list.push(destination);
        }
    }

    /// Remove a destination by name.
    pub fn remove(&self, name: &str) -> bool {
        let mut list = self.destinations.write();
        let before = list.len();
        list.retain(|d| d.name != name);
        list.len() != before
    }

    pub fn len(&self) -> usize {
        self.destinations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.read().is_empty()
    }
}

impl DestinationRegistry for SharedRegistry {
    fn reachable(&self) -> Vec<Destination> {
        self.destinations.read().clone()
    }
}

/// Per-channel packet sequence numbers.
#[derive(Debug, Clone)]
pub struct ChannelSequences {
    next: [u8; 256],
}

impl ChannelSequences {
    pub fn new() -> Self {
        Self { next: [0; 256] }
    }

    /// Claim the next sequence number on `channel`.
    pub fn next(&mut self, channel: u8) -> u8 {
        let slot = &mut self.next[channel as usize];
        let seq = *slot;
        *slot = seq.wrapping_add(1);
        seq
    }
}

impl Default for ChannelSequences {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    pub sent: usize,
    pub failed: usize,
}

/// Fans frames out to every destination, one packet per (frame, destination).
#[derive(Debug)]
pub struct DestinationRouter {
    system_id: u8,
    component_id: u8,
    sequences: ChannelSequences,
}

impl DestinationRouter {
    /// Create a router sending as `system_id`/`component_id`.
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
            sequences: ChannelSequences::new(),
        }
    }

    /// Transmit every frame to every destination.
    ///
    /// Order is frame-major: all destinations receive frame 0 before any
    /// receives frame 1. Failures are logged and counted, never returned.
    pub fn route(&mut self, frames: &[Frame], destinations: &[Destination]) -> RouteOutcome {
        let mut outcome = RouteOutcome::default();

        for frame in frames {
            let msg = frame.to_message();
            for dest in destinations {
                let packet = MavPacket::from_message(
                    self.sequences.next(dest.channel),
                    self.system_id,
                    self.component_id,
                    &msg,
                );
                let sent = packet
                    .to_bytes()
                    .map_err(|e| e.to_string())
                    .and_then(|bytes| dest.send(&bytes).map_err(|e| e.to_string()));

                match sent {
                    Ok(_) => outcome.sent += 1,
                    Err(err) => {
                        outcome.failed += 1;
                        tracing::debug!("Send to {} failed: {}", dest.name, err);
                    }
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;
    use crate::link::testing::RecordingLink;
    use crate::mavlink::{GpsRtcmData, PacketParser};

    fn destination(name: &str, channel: u8) -> (Destination, Arc<RecordingLink>) {
        let link = RecordingLink::new(name);
        (Destination::new(name, channel, link.clone()), link)
    }

    #[test]
    fn test_three_destinations_two_frames() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        struct OrderLink {
            name: &'static str,
            order: Arc<parking_lot::Mutex<Vec<(&'static str, u8)>>>,
        }
        impl Link for OrderLink {
            fn send(&self, packet: &[u8]) -> std::io::Result<usize> {
                let parsed = PacketParser::new().push(packet);
                let msg: GpsRtcmData = parsed[0].message().expect("rtcm");
                self.order.lock().push((self.name, msg.data[0]));
                Ok(packet.len())
            }
            fn peer(&self) -> String {
                self.name.to_string()
            }
        }

        let dests: Vec<Destination> = ["a", "b", "c"]
            .into_iter()
            .enumerate()
            .map(|(i, name)| {
                Destination::new(
                    name,
                    i as u8 + 1,
                    Arc::new(OrderLink {
                        name,
                        order: order.clone(),
                    }),
                )
            })
            .collect();

        let mut frames = codec::encode(&[0x11], 0);
        frames.extend(codec::encode(&[0x22], 1));

        let mut router = DestinationRouter::new(255, 190);
        let outcome = router.route(&frames, &dests);

        assert_eq!(outcome, RouteOutcome { sent: 6, failed: 0 });
        assert_eq!(
            *order.lock(),
            vec![
                ("a", 0x11),
                ("b", 0x11),
                ("c", 0x11),
                ("a", 0x22),
                ("b", 0x22),
                ("c", 0x22),
            ]
        );
    }

    #[test]
    fn test_removed_destination_not_sent() {
        let registry = SharedRegistry::new();
        let (a, link_a) = destination("a", 1);
        let (b, link_b) = destination("b", 2);
        registry.insert(a);
        registry.insert(b);

        let frames = codec::encode(&[1, 2, 3], 0);
        let mut router = DestinationRouter::new(255, 190);

        router.route(&frames, &registry.reachable());
        assert!(registry.remove("b"));
        router.route(&frames, &registry.reachable());

        assert_eq!(link_a.packets().len(), 2);
        assert_eq!(link_b.packets().len(), 1);
    }

    #[test]
    fn test_failure_does_not_stop_others() {
        let failing = Destination::new("down", 1, RecordingLink::failing("down"));
        let (up, link) = destination("up", 2);

        let mut router = DestinationRouter::new(255, 190);
        let outcome = router.route(&codec::encode(&[7; 10], 0), &[failing, up]);

        assert_eq!(outcome, RouteOutcome { sent: 1, failed: 1 });
        assert_eq!(link.packets().len(), 1);
    }

    #[test]
    fn test_sequence_per_channel() {
        let (a, link_a) = destination("a", 1);
        let (b, link_b) = destination("b", 2);
        let mut router = DestinationRouter::new(255, 190);

        let frames = codec::encode(&[0u8; 400], 0);
        router.route(&frames, &[a.clone(), b]);
        router.route(&frames, &[a]);

        let seqs = |link: &RecordingLink| -> Vec<u8> {
            link.packets()
                .iter()
                .map(|p| PacketParser::new().push(p)[0].sequence)
                .collect()
        };
        assert_eq!(seqs(&link_a), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(seqs(&link_b), vec![0, 1, 2]);
    }

    #[test]
    fn test_packets_carry_identity() {
        let (a, link) = destination("a", 1);
        let mut router = DestinationRouter::new(42, 190);
        router.route(&codec::encode(&[5; 3], 4), &[a]);

        let packet = PacketParser::new().push(&link.packets()[0]).remove(0);
        assert_eq!(packet.system_id, 42);
        assert_eq!(packet.component_id, 190);
        let msg: GpsRtcmData = packet.message().expect("rtcm");
        assert_eq!(msg.flags, 4 << 3);
        assert_eq!(msg.bytes(), &[5, 5, 5]);
    }

    #[test]
    fn test_registry_insert_replaces_by_name() {
        let registry = SharedRegistry::new();
        registry.insert(destination("a", 1).0);
        registry.insert(destination("a", 3).0);

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.reachable()[0].channel, 3);
        assert!(!registry.remove("missing"));
    }
}
