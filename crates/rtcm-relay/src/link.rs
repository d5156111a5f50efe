// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Primary channel links.
//!
//! A [`Link`] carries serialized packets to one receiving device. Sends are
//! fire-and-forget: the router logs and counts failures, nothing retries.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;

/// Outbound path to one receiving device.
pub trait Link: Send + Sync {
    /// Transmit one serialized packet.
    fn send(&self, packet: &[u8]) -> io::Result<usize>;

    /// Human readable peer description (for logs).
    fn peer(&self) -> String;
}

/// Datagram link over a shared UDP socket.
///
/// Every vehicle link shares the primary socket so replies and inbound
/// correction frames arrive on one port.
#[derive(Debug, Clone)]
pub struct UdpLink {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
}

impl UdpLink {
    pub fn new(socket: Arc<UdpSocket>, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }
}

impl Link for UdpLink {
    fn send(&self, packet: &[u8]) -> io::Result<usize> {
        self.socket.send_to(packet, self.peer)
    }

    fn peer(&self) -> String {
        format!("udp://{}", self.peer)
    }
}
