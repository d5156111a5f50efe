// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay configuration.
//!
//! Supports both programmatic and file-based configuration.

use crate::bridge::BridgeTarget;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Relay name (for identification).
    #[serde(default = "default_relay_name")]
    pub name: String,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Statistics reporting interval (seconds, 0 disables).
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// MAVLink identity used toward destinations.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Primary channel socket.
    #[serde(default)]
    pub link: LinkConfig,

    /// Receiving devices.
    #[serde(default)]
    pub vehicles: Vec<VehicleConfig>,

    /// Local correction blob input.
    #[serde(default)]
    pub source: SourceConfig,

    /// Secondary bridge.
    #[serde(default)]
    pub forward: ForwardConfig,

    /// Accept correction frames arriving on the primary channel.
    #[serde(default)]
    pub listen: ListenConfig,
}

fn default_relay_name() -> String {
    "rtcm-relay".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_stats_interval() -> u64 {
    10
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: default_relay_name(),
            log_level: default_log_level(),
            stats_interval_secs: default_stats_interval(),
            identity: IdentityConfig::default(),
            link: LinkConfig::default(),
            vehicles: Vec::new(),
            source: SourceConfig::default(),
            forward: ForwardConfig::default(),
            listen: ListenConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Add a vehicle.
    pub fn add_vehicle(&mut self, vehicle: VehicleConfig) {
        self.vehicles.push(vehicle);
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_addr("link.bind", &self.link.bind)?;
        parse_addr("source.bind", &self.source.bind)?;

        let mut names = HashSet::new();
        let mut channels = HashSet::new();
        for vehicle in &self.vehicles {
            if vehicle.name.is_empty() {
                return Err(ConfigError::Invalid("Vehicle with empty name".into()));
            }
            parse_addr(&format!("vehicle {}", vehicle.name), &vehicle.address)?;

            if !names.insert(vehicle.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate vehicle name {}",
                    vehicle.name
                )));
            }
            if !channels.insert(vehicle.channel) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate vehicle channel {}",
                    vehicle.channel
                )));
            }
        }

        Ok(())
    }
}

fn parse_addr(what: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .parse()
        .map_err(|e| ConfigError::Invalid(format!("Bad {} address '{}': {}", what, value, e)))
}

/// MAVLink identity toward destinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_system_id")]
    pub system_id: u8,

    #[serde(default = "default_component_id")]
    pub component_id: u8,
}

fn default_system_id() -> u8 {
    255
}

fn default_component_id() -> u8 {
    190
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            system_id: default_system_id(),
            component_id: default_component_id(),
        }
    }
}

/// Primary channel socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_link_bind")]
    pub bind: String,
}

fn default_link_bind() -> String {
    "0.0.0.0:14550".to_string()
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bind: default_link_bind(),
        }
    }
}

/// One receiving device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleConfig {
    pub name: String,

    /// `host:port` of the vehicle.
    pub address: String,

    /// MAVLink channel; owns the packet sequence toward this vehicle.
    pub channel: u8,
}

impl VehicleConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>, channel: u8) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            channel,
        }
    }
}

/// Local blob input. Each datagram received is one correction blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_bind")]
    pub bind: String,
}

fn default_source_bind() -> String {
    "127.0.0.1:14560".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            bind: default_source_bind(),
        }
    }
}

/// Bridge transport kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForwardTarget {
    #[default]
    Network,
    SerialUri,
}

/// Secondary bridge settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForwardConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub target: ForwardTarget,

    /// Network host.
    #[serde(default)]
    pub address: String,

    /// Network port.
    #[serde(default)]
    pub port: u16,

    /// Serial device path.
    #[serde(default)]
    pub serial_uri: String,
}

impl ForwardConfig {
    /// Forward over UDP to `address:port`.
    pub fn network(address: impl Into<String>, port: u16) -> Self {
        Self {
            enabled: true,
            target: ForwardTarget::Network,
            address: address.into(),
            port,
            serial_uri: String::new(),
        }
    }

    /// Forward over a serial line.
    pub fn serial(path: impl Into<String>) -> Self {
        Self {
            enabled: true,
            target: ForwardTarget::SerialUri,
            serial_uri: path.into(),
            ..Default::default()
        }
    }

    /// Resolve the bridge target.
    ///
    /// `None` when disabled or misconfigured; a misconfigured bridge is
    /// logged and the relay runs without it.
    pub fn bridge_target(&self) -> Option<BridgeTarget> {
        if !self.enabled {
            return None;
        }
        match self.target {
            ForwardTarget::Network if !self.address.is_empty() && self.port != 0 => {
                Some(BridgeTarget::network(self.address.clone(), self.port))
            }
            ForwardTarget::SerialUri if !self.serial_uri.is_empty() => {
                Some(BridgeTarget::serial(self.serial_uri.clone()))
            }
            target => {
                tracing::warn!("RTCM forwarding enabled but {:?} target is incomplete", target);
                None
            }
        }
    }
}

/// Inbound frame acceptance.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ListenConfig {
    #[serde(default)]
    pub enabled: bool,
}
