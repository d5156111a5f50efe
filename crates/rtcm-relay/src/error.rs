// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Relay error types.

use thiserror::Error;

/// Errors raised while packing or unpacking correction frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Frame payload too large: {len} bytes (max {max})")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Empty frame: missing header byte")]
    EmptyFrame,
}

/// Errors raised by the MAVLink wire layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("Unexpected message id {actual} (expected {expected})")]
    UnexpectedMessage { expected: u32, actual: u32 },

    #[error("Payload too long: {len} bytes (max 255)")]
    PayloadTooLong { len: usize },

    #[error("Unknown message id {0}")]
    UnknownMessage(u32),
}

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
