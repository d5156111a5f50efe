// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Socket wiring around the relay.
//!
//! Listener tasks only produce [`RelayEvent`]s; every send happens inside the
//! single task running [`RtcmRelay::run`].

use crate::config::{ConfigError, RelayConfig};
use crate::destination::{Destination, SharedRegistry};
use crate::error::Result;
use crate::link::UdpLink;
use crate::mavlink::PacketParser;
use crate::relay::{RelayEvent, RelayHandle, RtcmRelay};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Event channel depth.
pub const EVENT_QUEUE_DEPTH: usize = 256;

/// Largest datagram read from any socket.
const MAX_DATAGRAM: usize = 65_536;

fn parse_addr(value: &str) -> Result<SocketAddr> {
    value
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("Bad address '{}': {}", value, e)).into())
}

/// Bind the shared non-blocking primary socket.
pub fn open_primary_socket(bind: &str) -> Result<Arc<UdpSocket>> {
    let addr = parse_addr(bind)?;
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;

    let socket: UdpSocket = socket.into();
    tracing::debug!("Primary socket bound to {}", socket.local_addr()?);
    Ok(Arc::new(socket))
}

impl SharedRegistry {
    /// One [`UdpLink`] per configured vehicle, all over `socket`.
    pub fn from_config(config: &RelayConfig, socket: &Arc<UdpSocket>) -> Result<Self> {
        let registry = Self::new();
        for vehicle in &config.vehicles {
            let peer = parse_addr(&vehicle.address)?;
            registry.insert(Destination::new(
                vehicle.name.clone(),
                vehicle.channel,
                Arc::new(UdpLink::new(socket.clone(), peer)),
            ));
            tracing::info!(
                "Vehicle '{}' at {} (channel {})",
                vehicle.name,
                peer,
                vehicle.channel
            );
        }
        Ok(registry)
    }
}

/// Read the primary socket and forward every parsed packet.
///
/// Parser state is reset per datagram so a truncated datagram cannot
/// corrupt the next one.
pub fn spawn_inbound_listener(
    socket: &UdpSocket,
    events: mpsc::Sender<RelayEvent>,
) -> Result<JoinHandle<()>> {
    let socket = tokio::net::UdpSocket::from_std(socket.try_clone()?)?;

    Ok(tokio::spawn(async move {
        let mut parser = PacketParser::new();
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, from) = match socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::debug!("Primary socket receive error: {}", e);
                    continue;
                }
            };

            parser.reset();
            for packet in parser.push(&buf[..len]) {
                tracing::trace!("Inbound msg {} from {}", packet.message_id, from);
                if events.send(RelayEvent::Inbound(packet)).await.is_err() {
                    return;
                }
            }
        }
    }))
}

/// Receive correction blobs, one per datagram, on `bind`.
///
/// Returns the bound address alongside the task.
pub async fn spawn_blob_source(
    bind: &str,
    events: mpsc::Sender<RelayEvent>,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let socket = tokio::net::UdpSocket::bind(parse_addr(bind)?).await?;
    let local = socket.local_addr()?;
    tracing::info!("Listening for RTCM blobs on {}", local);

    let task = tokio::spawn(async move {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, _)) => {
                    if events.send(RelayEvent::Blob(buf[..len].to_vec())).await.is_err() {
                        return;
                    }
                }
                Err(e) => tracing::debug!("Blob source receive error: {}", e),
            }
        }
    });
    Ok((local, task))
}

/// A started relay with its socket tasks.
pub struct RelayService {
    handle: RelayHandle,
    relay_task: JoinHandle<()>,
    listeners: Vec<JoinHandle<()>>,
    primary_addr: SocketAddr,
    source_addr: SocketAddr,
}

impl RelayService {
    /// Bind sockets, open the bridge and start the dispatch loop.
    pub async fn start(config: &RelayConfig) -> Result<Self> {
        config.validate()?;

        let primary = open_primary_socket(&config.link.bind)?;
        let registry = Arc::new(SharedRegistry::from_config(config, &primary)?);
        let relay = RtcmRelay::new(config, registry);
        let handle = relay.handle();

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let mut listeners = Vec::new();

        if config.listen.enabled {
            listeners.push(spawn_inbound_listener(&primary, tx.clone())?);
        }

        let (source_addr, source_task) = spawn_blob_source(&config.source.bind, tx).await?;
        listeners.push(source_task);

        let primary_addr = primary.local_addr()?;
        let relay_task = tokio::spawn(relay.run(rx));

        Ok(Self {
            handle,
            relay_task,
            listeners,
            primary_addr,
            source_addr,
        })
    }

    pub fn handle(&self) -> RelayHandle {
        self.handle.clone()
    }

    /// Address of the primary socket.
    pub fn primary_addr(&self) -> SocketAddr {
        self.primary_addr
    }

    /// Address blobs are accepted on.
    pub fn source_addr(&self) -> SocketAddr {
        self.source_addr
    }

    /// Stop the relay and its listeners.
    pub async fn shutdown(self) {
        self.handle.stop();
        for listener in &self.listeners {
            listener.abort();
        }
        if let Err(e) = self.relay_task.await {
            tracing::warn!("Relay task ended abnormally: {}", e);
        }
    }
}
