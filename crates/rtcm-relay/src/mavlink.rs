// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! MAVLink wire format for the two messages the relay speaks.
//!
//! ## Packet Format (v2, as emitted)
//!
//! ```text
//! +------+-----+--------+--------+-----+-----+------+--------+---------+-------+
//! | 0xFD | LEN | INCOMP | COMPAT | SEQ | SYS | COMP | MSG_ID | PAYLOAD | CRC16 |
//! +------+-----+--------+--------+-----+-----+------+--------+---------+-------+
//!    1B    1B     1B       1B      1B    1B    1B      3B      0-255B    2B
//! ```
//!
//! - Trailing zero bytes of the payload are truncated (at least one byte is kept).
//! - CRC16 is X.25 (MCRF4XX) over LEN..PAYLOAD followed by the message CRC extra.
//!
//! v1 packets (`0xFE`, one-byte message id, no truncation) are accepted when
//! parsing but never emitted.

use crate::error::WireError;

/// MAVLink v1 start marker.
pub const MAVLINK_V1_STX: u8 = 0xFE;

/// MAVLink v2 start marker.
pub const MAVLINK_V2_STX: u8 = 0xFD;

const V1_HEADER_LEN: usize = 6;
const V2_HEADER_LEN: usize = 10;
const CRC_LEN: usize = 2;
const SIGNATURE_LEN: usize = 13;
const INCOMPAT_FLAG_SIGNED: u8 = 0x01;

/// `HEARTBEAT` message id.
pub const MSG_ID_HEARTBEAT: u32 = 0;

/// `GPS_RTCM_DATA` message id.
pub const MSG_ID_GPS_RTCM_DATA: u32 = 233;

/// Capacity of the `GPS_RTCM_DATA.data` field.
pub const RTCM_DATA_LEN: usize = 180;

const GPS_RTCM_DATA_PAYLOAD_LEN: usize = 2 + RTCM_DATA_LEN;
const HEARTBEAT_PAYLOAD_LEN: usize = 9;

/// Component id reserved for correction traffic on the bridge.
pub const MAV_COMP_ID_RTCM: u8 = 253;

/// Vehicle type advertised by bridge heartbeats.
pub const MAV_TYPE_RTCM: u8 = 40;

/// `MAV_AUTOPILOT_GENERIC`.
pub const MAV_AUTOPILOT_GENERIC: u8 = 0;

/// Protocol version carried in heartbeats.
pub const MAVLINK_VERSION: u8 = 3;

#[derive(Debug, Clone, Copy)]
struct MessageInfo {
    crc_extra: u8,
    payload_len: usize,
}

fn message_info(message_id: u32) -> Option<MessageInfo> {
    match message_id {
        MSG_ID_HEARTBEAT => Some(MessageInfo {
            crc_extra: 50,
            payload_len: HEARTBEAT_PAYLOAD_LEN,
        }),
        MSG_ID_GPS_RTCM_DATA => Some(MessageInfo {
            crc_extra: 35,
            payload_len: GPS_RTCM_DATA_PAYLOAD_LEN,
        }),
        _ => None,
    }
}

/// Accumulate one byte into an X.25 checksum.
pub fn crc_accumulate(byte: u8, crc: u16) -> u16 {
    let mut tmp = byte ^ (crc & 0xFF) as u8;
    tmp ^= tmp << 4;
    let tmp = tmp as u16;
    (crc >> 8) ^ (tmp << 8) ^ (tmp << 3) ^ (tmp >> 4)
}

/// X.25 checksum of a byte slice.
pub fn crc_x25(data: &[u8]) -> u16 {
    data.iter().fold(0xFFFF, |crc, &b| crc_accumulate(b, crc))
}

fn packet_crc(covered: &[u8], crc_extra: u8) -> u16 {
    crc_accumulate(crc_extra, crc_x25(covered))
}

/// A message type with a fixed MAVLink id and payload layout.
pub trait MavMessage: Sized {
    /// Message id.
    const ID: u32;

    /// Serialize to the untruncated wire payload.
    fn to_payload(&self) -> Vec<u8>;

    /// Deserialize from a (possibly truncated) wire payload.
    fn from_payload(payload: &[u8]) -> Result<Self, WireError>;
}

/// A framed MAVLink packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MavPacket {
    /// Per-channel sequence number.
    pub sequence: u8,
    /// Sender system id.
    pub system_id: u8,
    /// Sender component id.
    pub component_id: u8,
    /// Message id.
    pub message_id: u32,
    /// Untruncated payload.
    pub payload: Vec<u8>,
}

impl MavPacket {
    /// Build a packet carrying `message`.
    pub fn from_message<M: MavMessage>(
        sequence: u8,
        system_id: u8,
        component_id: u8,
        message: &M,
    ) -> Self {
        Self {
            sequence,
            system_id,
            component_id,
            message_id: M::ID,
            payload: message.to_payload(),
        }
    }

    /// Decode the payload as `M`.
    pub fn message<M: MavMessage>(&self) -> Result<M, WireError> {
        if self.message_id != M::ID {
            return Err(WireError::UnexpectedMessage {
                expected: M::ID,
                actual: self.message_id,
            });
        }
        M::from_payload(&self.payload)
    }

    /// Serialize as a MAVLink v2 packet.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let info =
            message_info(self.message_id).ok_or(WireError::UnknownMessage(self.message_id))?;

        let mut len = self.payload.len();
        if len > u8::MAX as usize {
            return Err(WireError::PayloadTooLong { len });
        }
        while len > 1 && self.payload[len - 1] == 0 {
            len -= 1;
        }
        let payload: &[u8] = if self.payload.is_empty() {
            &[0]
        } else {
            &self.payload[..len]
        };

        let mut buf = Vec::with_capacity(V2_HEADER_LEN + payload.len() + CRC_LEN);
        buf.push(MAVLINK_V2_STX);
        buf.push(payload.len() as u8);
        buf.push(0); // incompat flags
        buf.push(0); // compat flags
        buf.push(self.sequence);
        buf.push(self.system_id);
        buf.push(self.component_id);
        buf.extend_from_slice(&self.message_id.to_le_bytes()[..3]);
        buf.extend_from_slice(payload);

        let crc = packet_crc(&buf[1..], info.crc_extra);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }
}

/// `GPS_RTCM_DATA` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpsRtcmData {
    /// Packed fragment header.
    pub flags: u8,
    /// Number of valid bytes in `data`.
    pub len: u8,
    /// Correction bytes, zero padded.
    pub data: [u8; RTCM_DATA_LEN],
}

impl GpsRtcmData {
    /// Valid portion of `data`.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..(self.len as usize).min(RTCM_DATA_LEN)]
    }
}

impl MavMessage for GpsRtcmData {
    const ID: u32 = MSG_ID_GPS_RTCM_DATA;

    fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(GPS_RTCM_DATA_PAYLOAD_LEN);
        out.push(self.flags);
        out.push(self.len);
        out.extend_from_slice(&self.data);
        out
    }

    fn from_payload(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() > GPS_RTCM_DATA_PAYLOAD_LEN {
            return Err(WireError::PayloadTooLong { len: payload.len() });
        }
        let mut full = [0u8; GPS_RTCM_DATA_PAYLOAD_LEN];
        full[..payload.len()].copy_from_slice(payload);

        let mut data = [0u8; RTCM_DATA_LEN];
        data.copy_from_slice(&full[2..]);
        Ok(Self {
            flags: full[0],
            len: full[1],
            data,
        })
    }
}

/// `HEARTBEAT` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub custom_mode: u32,
    pub mav_type: u8,
    pub autopilot: u8,
    pub base_mode: u8,
    pub system_status: u8,
    pub mavlink_version: u8,
}

impl Heartbeat {
    /// Liveness heartbeat sent by the correction bridge.
    pub const fn rtcm() -> Self {
        Self {
            custom_mode: 0,
            mav_type: MAV_TYPE_RTCM,
            autopilot: MAV_AUTOPILOT_GENERIC,
            base_mode: 0,
            system_status: 0,
            mavlink_version: MAVLINK_VERSION,
        }
    }
}

impl MavMessage for Heartbeat {
    const ID: u32 = MSG_ID_HEARTBEAT;

    fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEARTBEAT_PAYLOAD_LEN);
        out.extend_from_slice(&self.custom_mode.to_le_bytes());
        out.push(self.mav_type);
        out.push(self.autopilot);
        out.push(self.base_mode);
        out.push(self.system_status);
        out.push(self.mavlink_version);
        out
    }

    fn from_payload(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() > HEARTBEAT_PAYLOAD_LEN {
            return Err(WireError::PayloadTooLong { len: payload.len() });
        }
        let mut p = [0u8; HEARTBEAT_PAYLOAD_LEN];
        p[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            custom_mode: u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
            mav_type: p[4],
            autopilot: p[5],
            base_mode: p[6],
            system_status: p[7],
            mavlink_version: p[8],
        })
    }
}

enum ParseStep {
    Incomplete,
    Packet(MavPacket, usize),
    /// Bad checksum or length: resync one byte past the start marker.
    Corrupt,
    /// Well-formed header for a message we do not know: skip it whole.
    Unknown(usize),
}

/// Streaming packet parser.
///
/// Bytes may be pushed in arbitrary chunks; garbage between packets is skipped.
#[derive(Debug, Default)]
pub struct PacketParser {
    buf: Vec<u8>,
    dropped: u64,
}

impl PacketParser {
    /// Create an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets discarded so far (bad CRC, bad length, unknown id).
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Discard any partially received packet.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    /// Feed bytes, returning every complete packet.
    pub fn push(&mut self, data: &[u8]) -> Vec<MavPacket> {
        self.buf.extend_from_slice(data);
        let mut packets = Vec::new();

        loop {
            let Some(start) = self
                .buf
                .iter()
                .position(|&b| b == MAVLINK_V1_STX || b == MAVLINK_V2_STX)
            else {
                self.buf.clear();
                break;
            };
            if start > 0 {
                self.buf.drain(..start);
            }

            match self.step() {
                ParseStep::Incomplete => break,
                ParseStep::Packet(packet, consumed) => {
                    self.buf.drain(..consumed);
                    packets.push(packet);
                }
                ParseStep::Corrupt => {
                    self.dropped += 1;
                    self.buf.drain(..1);
                }
                ParseStep::Unknown(consumed) => {
                    self.dropped += 1;
                    self.buf.drain(..consumed);
                }
            }
        }

        packets
    }

    fn step(&self) -> ParseStep {
        let buf = &self.buf;
        if buf.len() < 2 {
            return ParseStep::Incomplete;
        }
        let payload_len = buf[1] as usize;

        let (header_len, total, sequence, system_id, component_id, message_id) =
            if buf[0] == MAVLINK_V2_STX {
                if buf.len() < V2_HEADER_LEN {
                    return ParseStep::Incomplete;
                }
                let signature = if buf[2] & INCOMPAT_FLAG_SIGNED != 0 {
                    SIGNATURE_LEN
                } else {
                    0
                };
                (
                    V2_HEADER_LEN,
                    V2_HEADER_LEN + payload_len + CRC_LEN + signature,
                    buf[4],
                    buf[5],
                    buf[6],
                    u32::from_le_bytes([buf[7], buf[8], buf[9], 0]),
                )
            } else {
                if buf.len() < V1_HEADER_LEN {
                    return ParseStep::Incomplete;
                }
                (
                    V1_HEADER_LEN,
                    V1_HEADER_LEN + payload_len + CRC_LEN,
                    buf[2],
                    buf[3],
                    buf[4],
                    buf[5] as u32,
                )
            };

        if buf.len() < total {
            return ParseStep::Incomplete;
        }

        let Some(info) = message_info(message_id) else {
            return ParseStep::Unknown(total);
        };
        if payload_len > info.payload_len {
            return ParseStep::Corrupt;
        }

        let crc_start = header_len + payload_len;
        let expected = packet_crc(&buf[1..crc_start], info.crc_extra);
        let received = u16::from_le_bytes([buf[crc_start], buf[crc_start + 1]]);
        if expected != received {
            return ParseStep::Corrupt;
        }

        let mut payload = buf[header_len..crc_start].to_vec();
        payload.resize(info.payload_len, 0);

        ParseStep::Packet(
            MavPacket {
                sequence,
                system_id,
                component_id,
                message_id,
                payload,
            },
            total,
        )
    }
}
