// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Error taxonomy shared by the device, config and engine layers

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Serial device failures
#[derive(Debug, Error)]
pub enum DeviceError {
    /// No enumerated port carried the requested vendor/product pair
    #[error("no serial device with vendor id {vendor_id} and product id {product_id}")]
    NotFound { vendor_id: u16, product_id: u16 },

    /// The platform refused to list serial ports
    #[error("failed to enumerate serial ports: {0}")]
    Enumeration(String),

    /// Discovery succeeded but the port could not be opened
    #[error("failed to open {port}: {reason}")]
    ConnectionFailure { port: String, reason: String },

    /// I/O error while writing to an open port
    #[error("write to {port} failed: {reason}")]
    WriteFailure { port: String, reason: String },

    /// Write attempted without a connected handle
    #[error("device is not connected")]
    NotConnected,
}

/// Frame acquisition failures. Both are fatal to the current run.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The source has no more frames
    #[error("frame source reached end of stream")]
    EndOfStream,

    /// Capture or decoding failure
    #[error("frame acquisition failed: {0}")]
    Acquisition(String),
}

/// Rule configuration persistence failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Expected on first run; the caller bootstraps defaults
    #[error("config file {0} does not exist")]
    Missing(PathBuf),

    /// Malformed line in the flat file
    #[error("config parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Value of the wrong kind for a declared field
    #[error("field `{field}` expects {expected}, found {found}")]
    UnsupportedValueType {
        field: String,
        expected: &'static str,
        found: String,
    },

    /// Name not in the field table
    #[error("unknown config field `{0}`")]
    UnknownField(String),

    /// File access failed
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed JSON
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Detection run failures
#[derive(Debug, Error)]
pub enum EngineError {
    /// Start requested before a model was loaded
    #[error("no detection model loaded")]
    ModelNotLoaded,

    /// Start requested without a connected device
    #[error("device must be connected before detection starts")]
    DeviceNotConnected,

    /// Start requested during a run
    #[error("a detection run is already active")]
    AlreadyRunning,

    /// The model could not be loaded
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// The worker thread could not be spawned
    #[error("failed to start detection worker: {0}")]
    Worker(String),

    /// Frame source failure
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Device failure
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Top-level error
#[derive(Debug, Error)]
pub enum Error {
    /// Device failure
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Frame source failure
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Rule configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Detection run failure
    #[error(transparent)]
    Engine(#[from] EngineError),
}
