// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Correction blob fragmentation.
//!
//! ## Header Format
//!
//! ```text
//!   7   6   5   4   3   2   1   0
//! +---+---+---+---+---+---+---+---+
//! |    sequence_id    | frag  | F |
//! +---+---+---+---+---+---+---+---+
//! ```
//!
//! - `F`: set when the blob needed more than one frame
//! - `frag`: fragment index within the blob, modulo 4
//! - `sequence_id`: blob counter, modulo 32
//!
//! A blob larger than `4 * FRAME_CAPACITY` reuses fragment index 0 for its
//! fifth frame. Receivers cannot tell that apart from a new blob; the two-bit
//! field is kept as-is to stay wire compatible.

use crate::error::CodecError;
use crate::mavlink::{GpsRtcmData, RTCM_DATA_LEN};

/// Maximum payload bytes per frame.
pub const FRAME_CAPACITY: usize = RTCM_DATA_LEN;

const FRAGMENTED_BIT: u8 = 0x01;
const FRAGMENT_SHIFT: u8 = 1;
const FRAGMENT_MASK: u8 = 0x03;
const SEQUENCE_SHIFT: u8 = 3;
const SEQUENCE_MASK: u8 = 0x1F;

/// Unpacked frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameHeader {
    pub fragmented: bool,
    /// 0-3
    pub fragment_index: u8,
    /// 0-31
    pub sequence_id: u8,
}

impl FrameHeader {
    /// Header for an unfragmented blob.
    pub const fn single(sequence_id: u8) -> Self {
        Self {
            fragmented: false,
            fragment_index: 0,
            sequence_id: sequence_id & SEQUENCE_MASK,
        }
    }

    /// Header for fragment `position` of a blob (wraps modulo 4).
    pub const fn fragment(sequence_id: u8, position: usize) -> Self {
        Self {
            fragmented: true,
            fragment_index: (position % 4) as u8,
            sequence_id: sequence_id & SEQUENCE_MASK,
        }
    }

    /// Pack into one byte.
    pub const fn pack(self) -> u8 {
        let mut byte = (self.sequence_id & SEQUENCE_MASK) << SEQUENCE_SHIFT;
        byte |= (self.fragment_index & FRAGMENT_MASK) << FRAGMENT_SHIFT;
        if self.fragmented {
            byte |= FRAGMENTED_BIT;
        }
        byte
    }

    /// Unpack from one byte.
    pub const fn unpack(byte: u8) -> Self {
        Self {
            fragmented: byte & FRAGMENTED_BIT != 0,
            fragment_index: (byte >> FRAGMENT_SHIFT) & FRAGMENT_MASK,
            sequence_id: (byte >> SEQUENCE_SHIFT) & SEQUENCE_MASK,
        }
    }
}

/// One header byte plus up to [`FRAME_CAPACITY`] payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a frame, rejecting oversized payloads.
    pub fn new(header: FrameHeader, payload: Vec<u8>) -> Result<Self, CodecError> {
        if payload.len() > FRAME_CAPACITY {
            return Err(CodecError::PayloadTooLarge {
                len: payload.len(),
                max: FRAME_CAPACITY,
            });
        }
        Ok(Self { header, payload })
    }

    pub fn header(&self) -> FrameHeader {
        self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Wire layout: header byte followed by the payload.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.payload.len());
        out.push(self.header.pack());
        out.extend_from_slice(&self.payload);
        out
    }

    /// Parse the wire layout produced by [`Frame::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let (&header, payload) = bytes.split_first().ok_or(CodecError::EmptyFrame)?;
        Self::new(FrameHeader::unpack(header), payload.to_vec())
    }

    /// Convert into the MAVLink message body.
    pub fn to_message(&self) -> GpsRtcmData {
        let mut data = [0u8; RTCM_DATA_LEN];
        data[..self.payload.len()].copy_from_slice(&self.payload);
        GpsRtcmData {
            flags: self.header.pack(),
            len: self.payload.len() as u8,
            data,
        }
    }

    /// Convert from the MAVLink message body; the header byte is kept verbatim.
    pub fn from_message(msg: &GpsRtcmData) -> Result<Self, CodecError> {
        let len = msg.len as usize;
        if len > FRAME_CAPACITY {
            return Err(CodecError::PayloadTooLarge {
                len,
                max: FRAME_CAPACITY,
            });
        }
        Self::new(FrameHeader::unpack(msg.flags), msg.data[..len].to_vec())
    }
}

/// Split a blob into frames sharing `sequence_id`.
pub fn encode(blob: &[u8], sequence_id: u8) -> Vec<Frame> {
    if blob.len() <= FRAME_CAPACITY {
        return vec![Frame {
            header: FrameHeader::single(sequence_id),
            payload: blob.to_vec(),
        }];
    }

    blob.chunks(FRAME_CAPACITY)
        .enumerate()
        .map(|(position, chunk)| Frame {
            header: FrameHeader::fragment(sequence_id, position),
            payload: chunk.to_vec(),
        })
        .collect()
}

/// Split a frame back into its header fields and payload. No reassembly.
pub fn decode(frame: &Frame) -> (FrameHeader, &[u8]) {
    (frame.header, &frame.payload)
}

/// Rolling 5-bit blob counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceCounter {
    next: u8,
}

impl SequenceCounter {
    pub const fn new() -> Self {
        Self { next: 0 }
    }

    /// Sequence id for the next blob.
    pub const fn current(&self) -> u8 {
        self.next
    }

    /// Advance once per blob, wrapping 31 -> 0.
    pub fn advance(&mut self) -> u8 {
        let id = self.next;
        self.next = (self.next + 1) & SEQUENCE_MASK;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn test_header_bit_layout() {
        let header = FrameHeader {
            fragmented: true,
            fragment_index: 2,
            sequence_id: 17,
        };
        assert_eq!(header.pack(), (17 << 3) | (2 << 1) | 1);
        assert_eq!(FrameHeader::unpack(header.pack()), header);
        assert_eq!(FrameHeader::single(31).pack(), 0xF8);
    }

    #[test]
    fn test_small_blob_single_frame() {
        for len in [0, 1, 100, FRAME_CAPACITY] {
            let data = blob(len);
            let frames = encode(&data, 5);
            assert_eq!(frames.len(), 1);

            let (header, payload) = decode(&frames[0]);
            assert!(!header.fragmented);
            assert_eq!(header.fragment_index, 0);
            assert_eq!(header.sequence_id, 5);
            assert_eq!(payload, data.as_slice());
        }
    }

    #[test]
    fn test_large_blob_fragments() {
        let data = blob(FRAME_CAPACITY * 6 + 11);
        let frames = encode(&data, 9);
        assert_eq!(frames.len(), 7);

        let indices: Vec<u8> = frames.iter().map(|f| f.header().fragment_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 0, 1, 2]);
        assert!(frames
            .iter()
            .all(|f| f.header().fragmented && f.header().sequence_id == 9));

        let joined: Vec<u8> = frames.iter().flat_map(|f| f.payload().to_vec()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn test_blob_one_over_capacity() {
        let frames = encode(&blob(FRAME_CAPACITY + 1), 0);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].payload().len(), 1);
    }

    #[test]
    fn test_400_byte_blob() {
        let data = blob(400);
        let frames = encode(&data, 12);

        let lens: Vec<usize> = frames.iter().map(|f| f.payload().len()).collect();
        assert_eq!(lens, vec![180, 180, 40]);
        let indices: Vec<u8> = frames.iter().map(|f| f.header().fragment_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(frames.iter().all(|f| f.header().sequence_id == 12));
    }

    #[test]
    fn test_sequence_counter_wraps() {
        let mut seq = SequenceCounter::new();
        for expected in 0..32u8 {
            assert_eq!(seq.advance(), expected);
        }
        assert_eq!(seq.current(), 0);
        assert_eq!(seq.advance(), 0);
        assert_eq!(seq.advance(), 1);
    }

    #[test]
    fn test_frame_wire_bytes() {
        let frame = encode(&[0xD3, 0x00, 0x04], 3).remove(0);
        let bytes = frame.to_bytes();
        assert_eq!(bytes, vec![3 << 3, 0xD3, 0x00, 0x04]);
        assert_eq!(Frame::from_bytes(&bytes), Ok(frame));
        assert_eq!(Frame::from_bytes(&[]), Err(CodecError::EmptyFrame));
    }

    #[test]
    fn test_frame_rejects_oversized_payload() {
        let err = Frame::new(FrameHeader::single(0), vec![0; FRAME_CAPACITY + 1]);
        assert!(matches!(err, Err(CodecError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_message_conversion_keeps_header() {
        let frame = encode(&blob(300), 30).remove(1);
        let msg = frame.to_message();
        assert_eq!(msg.flags, frame.header().pack());
        assert_eq!(msg.len as usize, 120);
        assert_eq!(Frame::from_message(&msg), Ok(frame));
    }

    #[test]
    fn test_message_with_bad_length() {
        let msg = GpsRtcmData {
            flags: 0,
            len: 200,
            data: [0; RTCM_DATA_LEN],
        };
        assert!(Frame::from_message(&msg).is_err());
    }
}
