// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound correction frame acceptance.

use crate::codec::Frame;
use crate::mavlink::{GpsRtcmData, MavPacket, MAV_COMP_ID_RTCM, MSG_ID_GPS_RTCM_DATA};

/// Filters packets arriving on the primary channel.
///
/// Only `GPS_RTCM_DATA` sent as the correction component is accepted; the
/// frame is handed back untouched (header byte included) for re-emission.
/// Sender system id is not checked. Counting is left to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct InboundRelay;

impl InboundRelay {
    /// Whether `packet` is a correction frame to relay.
    pub fn matches(packet: &MavPacket) -> bool {
        packet.message_id == MSG_ID_GPS_RTCM_DATA && packet.component_id == MAV_COMP_ID_RTCM
    }

    /// Extract the frame from an accepted packet.
    pub fn accept(packet: &MavPacket) -> Option<Frame> {
        if !Self::matches(packet) {
            return None;
        }

        let frame = packet
            .message::<GpsRtcmData>()
            .map_err(|e| e.to_string())
            .and_then(|msg| Frame::from_message(&msg).map_err(|e| e.to_string()));

        match frame {
            Ok(frame) => Some(frame),
            Err(err) => {
                tracing::trace!("Malformed inbound GPS_RTCM_DATA: {}", err);
                None
            }
        }
    }
}
