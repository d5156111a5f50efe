// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Secondary bridge transport (UDP endpoint or serial line).
//!
//! Exactly one target is chosen at construction. Opening is best effort: a
//! target that cannot be opened leaves the relay without a bridge for its
//! whole lifetime.

use crate::codec::Frame;
use crate::error::Result;
use crate::heartbeat::HeartbeatScheduler;
use crate::mavlink::{Heartbeat, MavPacket, MAV_COMP_ID_RTCM};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use socket2::{Domain, Protocol, Socket, Type};
use std::fmt;
use std::io::{self, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

/// Requested socket send buffer for the UDP bridge.
pub const BRIDGE_SEND_BUFFER: usize = 256 * 1024;

/// Serial bridge line speed.
pub const SERIAL_BAUD_RATE: u32 = 57_600;

/// Where mirrored frames go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeTarget {
    /// Unicast UDP datagrams.
    Network { host: String, port: u16 },
    /// Serial line, 8-N-1, no flow control.
    Serial { device_path: String, baud_rate: u32 },
}

impl BridgeTarget {
    pub fn network(host: impl Into<String>, port: u16) -> Self {
        Self::Network {
            host: host.into(),
            port,
        }
    }

    pub fn serial(device_path: impl Into<String>) -> Self {
        Self::Serial {
            device_path: device_path.into(),
            baud_rate: SERIAL_BAUD_RATE,
        }
    }
}

impl fmt::Display for BridgeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { host, port } => write!(f, "udp://{}:{}", host, port),
            Self::Serial {
                device_path,
                baud_rate,
            } => write!(f, "serial://{}@{}", device_path, baud_rate),
        }
    }
}

/// Byte sink behind a bridge.
pub trait BridgeSink: Send {
    /// Write one serialized packet.
    fn write_packet(&mut self, bytes: &[u8]) -> io::Result<usize>;
}

struct UdpSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpSink {
    fn open(host: &str, port: u16) -> io::Result<Self> {
        let target = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no address for {}:{}", host, port),
            )
        })?;

        let socket = Socket::new(Domain::for_address(target), Type::DGRAM, Some(Protocol::UDP))?;
        if let Err(err) = socket.set_send_buffer_size(BRIDGE_SEND_BUFFER) {
            tracing::debug!("Bridge send buffer hint rejected: {}", err);
        }

        let bind_addr: SocketAddr = if target.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        socket.bind(&bind_addr.into())?;
        socket.set_nonblocking(true)?;

        Ok(Self {
            socket: socket.into(),
            target,
        })
    }
}

impl BridgeSink for UdpSink {
    fn write_packet(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.socket.send_to(bytes, self.target)
    }
}

struct SerialSink {
    port: Box<dyn SerialPort>,
}

impl SerialSink {
    fn open(device_path: &str, baud_rate: u32) -> std::result::Result<Self, serialport::Error> {
        let port = serialport::new(device_path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()?;
        Ok(Self { port })
    }
}

impl BridgeSink for SerialSink {
    fn write_packet(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.port.write_all(bytes)?;
        Ok(bytes.len())
    }
}

/// An opened bridge sink.
pub struct BridgeTransport {
    sink: Box<dyn BridgeSink>,
    description: String,
}

impl BridgeTransport {
    /// Open `target`.
    pub fn open(target: &BridgeTarget) -> Result<Self> {
        let sink: Box<dyn BridgeSink> = match target {
            BridgeTarget::Network { host, port } => Box::new(UdpSink::open(host, *port)?),
            BridgeTarget::Serial {
                device_path,
                baud_rate,
            } => Box::new(SerialSink::open(device_path, *baud_rate)?),
        };
        Ok(Self {
            sink,
            description: target.to_string(),
        })
    }

    /// Open `target`, or log a warning and return `None`. Never retried.
    pub fn open_or_disable(target: &BridgeTarget) -> Option<Self> {
        match Self::open(target) {
            Ok(transport) => {
                tracing::info!("Forwarding RTCM to {}", target);
                Some(transport)
            }
            Err(err) => {
                tracing::warn!("Error opening RTCM bridge {}: {} (bridge disabled)", target, err);
                None
            }
        }
    }

    /// Wrap an arbitrary sink.
    pub fn from_sink(sink: Box<dyn BridgeSink>, description: impl Into<String>) -> Self {
        Self {
            sink,
            description: description.into(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Write once. No retry, no flush.
    pub fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.sink.write_packet(bytes)
    }
}

impl fmt::Debug for BridgeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeTransport")
            .field("description", &self.description)
            .finish()
    }
}

/// What one bridge forward produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardOutcome {
    pub heartbeat_sent: bool,
    pub frame_sent: bool,
}

/// Bridge transport with its heartbeat schedule and channel sequence.
///
/// Everything on the bridge is sent as component [`MAV_COMP_ID_RTCM`].
#[derive(Debug)]
pub struct Bridge {
    transport: BridgeTransport,
    heartbeat: HeartbeatScheduler,
    system_id: u8,
    sequence: u8,
}

impl Bridge {
    pub fn new(transport: BridgeTransport, system_id: u8) -> Self {
        Self {
            transport,
            heartbeat: HeartbeatScheduler::new(),
            system_id,
            sequence: 0,
        }
    }

    pub fn description(&self) -> &str {
        self.transport.description()
    }

    fn next_sequence(&mut self) -> u8 {
        let seq = self.sequence;
        self.sequence = seq.wrapping_add(1);
        seq
    }

    fn send_packet(&mut self, packet: MavPacket) -> bool {
        let result = packet
            .to_bytes()
            .map_err(|e| e.to_string())
            .and_then(|bytes| self.transport.send(&bytes).map_err(|e| e.to_string()));
        match result {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!("Bridge write to {} failed: {}", self.description(), err);
                false
            }
        }
    }

    /// Mirror one frame, preceded by a heartbeat when one is due.
    pub fn forward(&mut self, frame: &Frame, now: Instant) -> ForwardOutcome {
        let mut outcome = ForwardOutcome::default();

        if self.heartbeat.poll(now) {
            let seq = self.next_sequence();
            let packet =
                MavPacket::from_message(seq, self.system_id, MAV_COMP_ID_RTCM, &Heartbeat::rtcm());
            outcome.heartbeat_sent = self.send_packet(packet);
        }

        let seq = self.next_sequence();
        let packet =
            MavPacket::from_message(seq, self.system_id, MAV_COMP_ID_RTCM, &frame.to_message());
        outcome.frame_sent = self.send_packet(packet);
        if outcome.frame_sent {
            tracing::trace!("Sent GPS_RTCM_DATA to {}", self.description());
        }

        outcome
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use crate::codec;
    use crate::mavlink::{PacketParser, MSG_ID_GPS_RTCM_DATA, MSG_ID_HEARTBEAT};

    fn recording_bridge() -> (Bridge, RecordingSink) {
        let sink = RecordingSink::default();
        let transport = BridgeTransport::from_sink(Box::new(sink.clone()), "mock");
        (Bridge::new(transport, 255), sink)
    }

    fn message_ids(sink: &RecordingSink) -> Vec<u32> {
        sink.packets()
            .iter()
            .flat_map(|p| PacketParser::new().push(p))
            .map(|p| p.message_id)
            .collect()
    }

    #[test]
    fn test_first_forward_sends_heartbeat_first() {
        let (mut bridge, sink) = recording_bridge();
        let frame = codec::encode(&[1, 2, 3], 0).remove(0);

        let outcome = bridge.forward(&frame, Instant::now());

        assert!(outcome.heartbeat_sent && outcome.frame_sent);
        assert_eq!(message_ids(&sink), vec![MSG_ID_HEARTBEAT, MSG_ID_GPS_RTCM_DATA]);

        let packets: Vec<MavPacket> = sink
            .packets()
            .iter()
            .flat_map(|p| PacketParser::new().push(p))
            .collect();
        assert!(packets.iter().all(|p| p.component_id == MAV_COMP_ID_RTCM));
        assert_eq!(packets[0].sequence, 0);
        assert_eq!(packets[1].sequence, 1);
        assert_eq!(
            packets[0].message::<Heartbeat>().expect("heartbeat"),
            Heartbeat::rtcm()
        );
    }

    #[test]
    fn test_heartbeat_between_sends_1500ms_apart() {
        let (mut bridge, sink) = recording_bridge();
        let frame = codec::encode(&[9], 0).remove(0);
        let t0 = Instant::now();

        bridge.forward(&frame, t0);
        sink.written.lock().clear();
        bridge.forward(&frame, t0 + Duration::from_millis(1500));

        assert_eq!(message_ids(&sink), vec![MSG_ID_HEARTBEAT, MSG_ID_GPS_RTCM_DATA]);
    }

    #[test]
    fn test_no_heartbeat_between_sends_500ms_apart() {
        let (mut bridge, sink) = recording_bridge();
        let frame = codec::encode(&[9], 0).remove(0);
        let t0 = Instant::now();

        bridge.forward(&frame, t0);
        sink.written.lock().clear();
        bridge.forward(&frame, t0 + Duration::from_millis(500));

        assert_eq!(message_ids(&sink), vec![MSG_ID_GPS_RTCM_DATA]);
    }

    #[test]
    fn test_network_bridge_delivers() {
        let rx = UdpSocket::bind("127.0.0.1:0").expect("bind");
        rx.set_read_timeout(Some(Duration::from_secs(2)))
            .expect("timeout");
        let port = rx.local_addr().expect("addr").port();

        let mut transport =
            BridgeTransport::open(&BridgeTarget::network("127.0.0.1", port)).expect("open");
        transport.send(&[0xFD, 0x01]).expect("send");

        let mut buf = [0u8; 8];
        let (n, _) = rx.recv_from(&mut buf).expect("recv");
        assert_eq!(&buf[..n], &[0xFD, 0x01]);
    }

    #[test]
    fn test_missing_serial_device_disables_bridge() {
        let target = BridgeTarget::serial("/dev/rtcm-relay-does-not-exist");
        assert!(BridgeTransport::open_or_disable(&target).is_none());
    }

    #[test]
    fn test_target_display() {
        assert_eq!(
            BridgeTarget::network("10.0.0.1", 14550).to_string(),
            "udp://10.0.0.1:14550"
        );
        assert_eq!(
            BridgeTarget::serial("/dev/ttyUSB0").to_string(),
            "serial:///dev/ttyUSB0@57600"
        );
    }
}
