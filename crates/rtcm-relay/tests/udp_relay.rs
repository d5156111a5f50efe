// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test readability
#![allow(clippy::cast_possible_truncation)] // Test data conversions

//! UDP loopback tests for the relay service.
//!
//! A vehicle and a bridge receiver are plain local sockets; blobs enter
//! through the service's source socket.

use rtcm_relay::codec;
use rtcm_relay::mavlink::{
    GpsRtcmData, MavPacket, PacketParser, MAV_COMP_ID_RTCM, MSG_ID_GPS_RTCM_DATA,
    MSG_ID_HEARTBEAT,
};
use rtcm_relay::{ForwardConfig, RelayConfig, RelayService, VehicleConfig};
use std::time::Duration;
use tokio::net::UdpSocket;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Helper: deterministic blob of `size` bytes.
fn make_blob(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

async fn recv_packet(socket: &UdpSocket) -> MavPacket {
    let mut buf = [0u8; 512];
    let (len, _) = tokio::time::timeout(RECV_TIMEOUT, socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for packet")
        .expect("recv");
    PacketParser::new().push(&buf[..len]).remove(0)
}

async fn local_socket() -> UdpSocket {
    UdpSocket::bind("127.0.0.1:0").await.expect("bind")
}

fn base_config(vehicle: &UdpSocket) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.link.bind = "127.0.0.1:0".into();
    config.source.bind = "127.0.0.1:0".into();
    config.add_vehicle(VehicleConfig::new(
        "alpha",
        vehicle.local_addr().expect("addr").to_string(),
        1,
    ));
    config
}

#[tokio::test]
async fn test_blob_fans_out_and_bridges() {
    let vehicle = local_socket().await;
    let bridge = local_socket().await;
    let source = local_socket().await;

    let mut config = base_config(&vehicle);
    let bridge_port = bridge.local_addr().expect("addr").port();
    config.forward = ForwardConfig::network("127.0.0.1", bridge_port);

    let service = RelayService::start(&config).await.expect("start");
    let blob = make_blob(400);
    source
        .send_to(&blob, service.source_addr())
        .await
        .expect("send blob");

    let mut received = Vec::new();
    for expected_len in [180u8, 180, 40] {
        let packet = recv_packet(&vehicle).await;
        assert_eq!(packet.system_id, 255);
        assert_eq!(packet.component_id, 190);
        let msg: GpsRtcmData = packet.message().expect("rtcm");
        assert_eq!(msg.len, expected_len);
        received.extend_from_slice(msg.bytes());
    }
    assert_eq!(received, blob);

    let heartbeat = recv_packet(&bridge).await;
    assert_eq!(heartbeat.message_id, MSG_ID_HEARTBEAT);
    assert_eq!(heartbeat.component_id, MAV_COMP_ID_RTCM);
    for _ in 0..3 {
        let packet = recv_packet(&bridge).await;
        assert_eq!(packet.message_id, MSG_ID_GPS_RTCM_DATA);
        assert_eq!(packet.component_id, MAV_COMP_ID_RTCM);
    }

    let stats = service.handle().stats();
    assert_eq!(stats.blobs, 1);
    assert_eq!(stats.frames_sent, 3);
    service.shutdown().await;
}

#[tokio::test]
async fn test_inbound_frame_relayed_when_listening() {
    let vehicle = local_socket().await;
    let upstream = local_socket().await;

    let mut config = base_config(&vehicle);
    config.listen.enabled = true;
    let service = RelayService::start(&config).await.expect("start");

    let frame = codec::encode(&[0x42; 12], 9).remove(0);
    let inbound = MavPacket::from_message(0, 1, MAV_COMP_ID_RTCM, &frame.to_message());
    upstream
        .send_to(&inbound.to_bytes().expect("serialize"), service.primary_addr())
        .await
        .expect("send inbound");

    let packet = recv_packet(&vehicle).await;
    let msg: GpsRtcmData = packet.message().expect("rtcm");
    assert_eq!(msg.flags, 9 << 3);
    assert_eq!(msg.bytes(), &[0x42; 12]);
    assert_eq!(packet.component_id, 190);

    service.shutdown().await;
}

#[tokio::test]
async fn test_unresolvable_bridge_disables_forwarding() {
    let vehicle = local_socket().await;
    let source = local_socket().await;

    let mut config = base_config(&vehicle);
    config.forward = ForwardConfig::network("no-such-host.invalid", 14551);
    let service = RelayService::start(&config).await.expect("start");

    source
        .send_to(&[1, 2, 3], service.source_addr())
        .await
        .expect("send blob");
    let packet = recv_packet(&vehicle).await;
    assert_eq!(packet.message_id, MSG_ID_GPS_RTCM_DATA);

    let stats = service.handle().stats();
    assert_eq!(stats.bridge_frames, 0);
    assert_eq!(stats.heartbeats, 0);
    service.shutdown().await;
}
