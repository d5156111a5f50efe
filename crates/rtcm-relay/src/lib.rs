// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RTCM Correction Relay
//!
//! Re-encodes GNSS correction blobs into MAVLink `GPS_RTCM_DATA` frames and
//! fans them out to every reachable vehicle, optionally mirroring them onto
//! a secondary UDP or serial bridge.
//!
//! # Features
//!
//! - **Fragmentation**: blobs larger than 180 bytes are split into sequenced
//!   fragments sharing one 5-bit sequence id
//! - **Fan-out**: one packet per (frame, vehicle), each on its own channel
//! - **Bridging**: UDP or serial mirror with a 1 Hz `HEARTBEAT`
//! - **Inbound relay**: re-emit correction frames received from another relay
//!
//! # Quick Start
//!
//! ```bash
//! # Relay blobs received on 127.0.0.1:14560 to one vehicle
//! rtcm-relay --vehicle alpha=192.168.1.10:14555
//!
//! # Also mirror to a telemetry radio
//! rtcm-relay --vehicle alpha=192.168.1.10:14555 --forward-serial /dev/ttyUSB0
//!
//! # Using config file
//! rtcm-relay --config relay.toml
//! ```
//!
//! # Configuration File
//!
//! ```toml
//! name = "field-base"
//!
//! [link]
//! bind = "0.0.0.0:14550"
//!
//! [[vehicles]]
//! name = "alpha"
//! address = "192.168.1.10:14555"
//! channel = 1
//!
//! [forward]
//! enabled = true
//! target = "network"
//! address = "10.0.0.9"
//! port = 14551
//! ```

pub mod bridge;
pub mod codec;
pub mod config;
pub mod destination;
pub mod error;
pub mod heartbeat;
pub mod inbound;
pub mod link;
pub mod mavlink;
pub mod rate;
pub mod relay;
pub mod service;

pub use bridge::{BridgeTarget, BridgeTransport};
pub use codec::{Frame, FrameHeader, FRAME_CAPACITY};
pub use config::{ConfigError, ForwardConfig, RelayConfig, VehicleConfig};
pub use destination::{Destination, DestinationRegistry, DestinationRouter, SharedRegistry};
pub use error::{RelayError, Result};
pub use relay::{RelayEvent, RelayHandle, RelayStatsSnapshot, RtcmRelay};
pub use service::RelayService;
