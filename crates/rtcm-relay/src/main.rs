// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RTCM Correction Relay CLI
//!
//! # Usage
//!
//! ```bash
//! # Relay to two vehicles
//! rtcm-relay --vehicle alpha=192.168.1.10:14555 --vehicle bravo=192.168.1.11:14555
//!
//! # Mirror over UDP and accept frames from an upstream relay
//! rtcm-relay --vehicle alpha=192.168.1.10:14555 --forward-udp 10.0.0.9:14551 --listen
//!
//! # Using configuration file
//! rtcm-relay --config relay.toml
//! ```

use clap::{Parser, Subcommand};
use rtcm_relay::{
    ConfigError, ForwardConfig, RelayConfig, RelayError, RelayService, RelayStatsSnapshot,
    VehicleConfig,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// RTCM Correction Relay
#[derive(Parser, Debug)]
#[command(name = "rtcm-relay")]
#[command(about = "RTCM correction relay - MAVLink fan-out with UDP/serial bridging")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Primary socket bind address
    #[arg(long, conflicts_with = "config")]
    bind: Option<String>,

    /// Blob source bind address
    #[arg(long, conflicts_with = "config")]
    source: Option<String>,

    /// Vehicle (format: "name=host:port", can repeat)
    #[arg(short, long, conflicts_with = "config")]
    vehicle: Vec<String>,

    /// Mirror frames over UDP (format: "host:port")
    #[arg(long, conflicts_with_all = ["config", "forward_serial"])]
    forward_udp: Option<String>,

    /// Mirror frames over a serial line
    #[arg(long, conflicts_with = "config")]
    forward_serial: Option<String>,

    /// Re-emit correction frames received on the primary socket
    #[arg(short, long, conflicts_with = "config")]
    listen: bool,

    /// Statistics reporting interval (seconds, 0 to disable)
    #[arg(long, default_value = "10")]
    stats_interval: u64,

    /// Log level (trace, debug, info, warn, error); overrides the file's `log_level`
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "relay.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if let Some(cmd) = args.command {
        init_logging(args.log_level.as_deref().unwrap_or("info"));
        return match cmd {
            Commands::GenConfig { output } => cmd_gen_config(output),
            Commands::Validate { config } => cmd_validate(config),
        };
    }

    let config = build_config(&args);
    init_logging(log_level(&args, config.as_ref().ok()));
    let config = config?;
    let stats_interval = if args.config.is_some() {
        config.stats_interval_secs
    } else {
        args.stats_interval
    };

    println!("RTCM Correction Relay v{}", env!("CARGO_PKG_VERSION"));
    println!("=====================================");
    println!();
    for vehicle in &config.vehicles {
        println!(
            "Vehicle: {} -> {} (channel {})",
            vehicle.name, vehicle.address, vehicle.channel
        );
    }
    println!();
    println!("Press Ctrl+C to stop...");
    println!();

    let service = RelayService::start(&config).await?;
    let handle = service.handle();

    if stats_interval > 0 {
        let stats_handle = handle.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                if !stats_handle.is_running() {
                    break;
                }
                print_stats(&stats_handle.stats());
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    println!("\nShutting down...");
    service.shutdown().await;

    println!("\nFinal Statistics:");
    print_stats(&handle.stats());

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// `--log-level` wins, then the configuration's `log_level`.
fn log_level<'a>(args: &'a Args, config: Option<&'a RelayConfig>) -> &'a str {
    args.log_level
        .as_deref()
        .or_else(|| config.map(|c| c.log_level.as_str()))
        .unwrap_or("info")
}

fn invalid(msg: impl Into<String>) -> RelayError {
    RelayError::Config(ConfigError::Invalid(msg.into()))
}

fn build_config(args: &Args) -> Result<RelayConfig, RelayError> {
    if let Some(ref config_path) = args.config {
        return RelayConfig::from_file(config_path).map_err(RelayError::Config);
    }

    let mut config = RelayConfig::default();
    if let Some(ref bind) = args.bind {
        config.link.bind = bind.clone();
    }
    if let Some(ref source) = args.source {
        config.source.bind = source.clone();
    }

    for (i, entry) in args.vehicle.iter().enumerate() {
        let (name, address) = entry.split_once('=').ok_or_else(|| {
            invalid(format!("Invalid vehicle {} (expected name=host:port)", entry))
        })?;
        let channel = u8::try_from(i + 1).map_err(|_| invalid("Too many vehicles"))?;
        config.add_vehicle(VehicleConfig::new(name, address, channel));
    }

    if let Some(ref target) = args.forward_udp {
        let (host, port) = target.rsplit_once(':').ok_or_else(|| {
            invalid(format!("Invalid forward target {} (expected host:port)", target))
        })?;
        let port: u16 = port
            .parse()
            .map_err(|_| invalid(format!("Invalid forward port in {}", target)))?;
        config.forward = ForwardConfig::network(host, port);
    } else if let Some(ref path) = args.forward_serial {
        config.forward = ForwardConfig::serial(path.clone());
    }

    config.listen.enabled = args.listen;
    config.stats_interval_secs = args.stats_interval;
    if let Some(ref level) = args.log_level {
        config.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn cmd_gen_config(output: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = RelayConfig {
        name: "example-relay".into(),
        ..Default::default()
    };
    config.add_vehicle(VehicleConfig::new("alpha", "192.168.1.10:14555", 1));
    config.add_vehicle(VehicleConfig::new("bravo", "192.168.1.11:14555", 2));
    config.forward = ForwardConfig::serial("/dev/ttyUSB0");
    config.forward.enabled = false;

    let toml_str = toml::to_string_pretty(&config)?;

    let content = format!(
        r#"# RTCM Relay Configuration
# Generated by rtcm-relay gen-config

{}
"#,
        toml_str
    );

    std::fs::write(&output, content)?;
    println!("Generated configuration file: {}", output.display());
    Ok(())
}

fn cmd_validate(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match RelayConfig::from_file(&config_path) {
        Ok(config) => {
            println!("Configuration valid!");
            println!();
            println!("Relay: {}", config.name);
            println!("Vehicles: {}", config.vehicles.len());
            for vehicle in &config.vehicles {
                println!(
                    "  [{}] {} -> {}",
                    vehicle.channel, vehicle.name, vehicle.address
                );
            }
            match config.forward.bridge_target() {
                Some(target) => println!("Bridge: {}", target),
                None => println!("Bridge: disabled"),
            }
            println!(
                "Inbound relay: {}",
                if config.listen.enabled {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_stats(stats: &RelayStatsSnapshot) {
    println!("--- Relay Statistics ---");
    println!(
        "  Input: {} blobs, {} ({}/s)",
        stats.blobs,
        format_bytes(stats.bytes_in),
        format_bytes(stats.bytes_per_second() as u64)
    );
    println!(
        "  Vehicles: {} packets, {} errors",
        stats.frames_sent, stats.send_errors
    );
    println!(
        "  Bridge: {} frames, {} heartbeats",
        stats.bridge_frames, stats.heartbeats
    );
    println!(
        "  Inbound: {} relayed, {} ignored",
        stats.inbound_relayed, stats.inbound_ignored
    );
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config_file(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(body.as_bytes()).expect("write");
        file
    }

    #[test]
    fn test_log_level_from_config_file() {
        let file = config_file("log_level = \"debug\"\n");
        let path = file.path().to_string_lossy().to_string();
        let args = Args::parse_from(["rtcm-relay", "--config", path.as_str()]);

        let config = build_config(&args).expect("config");
        assert_eq!(log_level(&args, Some(&config)), "debug");
    }

    #[test]
    fn test_log_level_flag_overrides_file() {
        let file = config_file("log_level = \"debug\"\n");
        let path = file.path().to_string_lossy().to_string();
        let args = Args::parse_from([
            "rtcm-relay",
            "--config",
            path.as_str(),
            "--log-level",
            "warn",
        ]);

        let config = build_config(&args).expect("config");
        assert_eq!(log_level(&args, Some(&config)), "warn");
    }

    #[test]
    fn test_log_level_defaults_to_info() {
        let args = Args::parse_from(["rtcm-relay"]);
        let config = build_config(&args).expect("config");
        assert_eq!(config.log_level, "info");
        assert_eq!(log_level(&args, None), "info");
    }

    #[test]
    fn test_vehicle_flags_get_channels() {
        let args = Args::parse_from([
            "rtcm-relay",
            "--vehicle",
            "alpha=10.0.0.1:14555",
            "--vehicle",
            "bravo=10.0.0.2:14555",
            "--forward-udp",
            "10.0.0.9:14551",
        ]);
        let config = build_config(&args).expect("config");

        let channels: Vec<u8> = config.vehicles.iter().map(|v| v.channel).collect();
        assert_eq!(channels, vec![1, 2]);
        assert_eq!(config.forward.port, 14551);
        assert!(build_config(&Args::parse_from(["rtcm-relay", "--vehicle", "bad"])).is_err());
    }
}
